//! Deletion rules.
//!
//! Each rule looks at one message envelope and votes delete/keep. A
//! [`RuleSet`] ORs the votes of its rules in file order, stopping at the
//! first rule that votes delete. Rules are built from a JSON rule file by a
//! [`RuleRegistry`] that maps the record's `type` to a factory.

pub mod address;
pub mod ai;
pub mod config;
pub mod domain;
pub mod registry;
pub mod subject;

pub use address::AddressRule;
pub use ai::{AiAction, AiRule};
pub use config::RuleConfig;
pub use domain::DomainRule;
pub use registry::{RuleFactory, RuleRegistry};
pub use subject::SubjectRule;

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::mailbox::Message;

/// A single delete/keep predicate over a message envelope.
///
/// `Display` gives a one-line description used in logs.
#[async_trait]
pub trait Rule: Send + Sync + fmt::Display {
    async fn should_delete(&self, message: &Message) -> bool;
}

/// Ordered rules combined with OR.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// A set with no rules; it never matches.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule descriptions in evaluation order.
    pub fn describe(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.to_string()).collect()
    }

    /// `true` as soon as one rule votes delete; later rules are not consulted.
    pub async fn evaluate(&self, message: &Message) -> bool {
        for rule in &self.rules {
            if rule.should_delete(message).await {
                debug!(uid = %message.uid, rule = %rule, "Rule matched");
                return true;
            }
        }
        false
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.describe()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::mailbox::Sender;

    /// Rule with a fixed verdict that counts how often it was asked.
    struct CountingRule {
        verdict: bool,
        calls: Arc<AtomicUsize>,
    }

    impl fmt::Display for CountingRule {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "CountingRule{{verdict: {}}}", self.verdict)
        }
    }

    #[async_trait]
    impl Rule for CountingRule {
        async fn should_delete(&self, _message: &Message) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    fn counting(verdict: bool) -> (Box<dyn Rule>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let rule = CountingRule {
            verdict,
            calls: Arc::clone(&calls),
        };
        (Box::new(rule), calls)
    }

    fn make_message() -> Message {
        Message::new(1, vec![Sender::new("a", "x.com")], "Hello")
    }

    #[tokio::test]
    async fn empty_set_never_matches() {
        assert!(!RuleSet::empty().evaluate(&make_message()).await);
    }

    #[tokio::test]
    async fn first_match_short_circuits() {
        let (r1, c1) = counting(false);
        let (r2, c2) = counting(true);
        let (r3, c3) = counting(true);
        let set = RuleSet::new(vec![r1, r2, r3]);

        assert!(set.evaluate(&make_message()).await);
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
        assert_eq!(c3.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_match_consults_every_rule() {
        let (r1, c1) = counting(false);
        let (r2, c2) = counting(false);
        let set = RuleSet::new(vec![r1, r2]);

        assert!(!set.evaluate(&make_message()).await);
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn describe_preserves_order() {
        let (r1, _) = counting(false);
        let (r2, _) = counting(true);
        let set = RuleSet::new(vec![r1, r2]);
        assert_eq!(
            set.describe(),
            vec!["CountingRule{verdict: false}", "CountingRule{verdict: true}"]
        );
    }
}
