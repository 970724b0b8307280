//! Delete mail whose subject contains a configured text (`theme_rule`).

use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::error::RuleError;
use crate::mailbox::Message;
use crate::rules::{Rule, RuleRegistry};

pub const RULE_TYPE: &str = "theme_rule";

#[derive(Debug, Clone)]
pub struct SubjectRule {
    text: String,
}

impl SubjectRule {
    pub fn new(text: impl Into<String>) -> Result<Self, RuleError> {
        let text = text.into();
        if text.is_empty() {
            return Err(RuleError::InvalidField {
                rule_type: RULE_TYPE.into(),
                field: "text".into(),
                reason: "text cannot be empty".into(),
            });
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Case-insensitive substring containment of `text` in `subject`.
pub fn apply(subject: &str, text: &str) -> bool {
    !subject.is_empty() && subject.to_lowercase().contains(&text.to_lowercase())
}

pub(crate) fn register(registry: &mut RuleRegistry) {
    registry.register(RULE_TYPE, |config| {
        let text = config.require_str("text")?;
        Ok(Box::new(SubjectRule::new(text)?))
    });
}

impl fmt::Display for SubjectRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubjectRule{{text: {}}}", self.text)
    }
}

#[async_trait]
impl Rule for SubjectRule {
    async fn should_delete(&self, message: &Message) -> bool {
        if message.from.is_empty() {
            return false;
        }
        let matched = apply(&message.subject, &self.text);
        if matched {
            info!(uid = %message.uid, text = %self.text, "Deleting email with subject containing text");
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::Sender;

    #[test]
    fn apply_is_case_insensitive_substring() {
        assert!(apply("You WON the Lottery!", "lottery"));
        assert!(apply("lottery", "LOTTERY"));
        assert!(!apply("Meeting tomorrow", "lottery"));
    }

    #[test]
    fn empty_subject_never_matches() {
        assert!(!apply("", "lottery"));
        assert!(!apply("", ""));
    }

    #[test]
    fn empty_text_rejected() {
        assert!(SubjectRule::new("").is_err());
        assert_eq!(SubjectRule::new("sale").unwrap().text(), "sale");
    }

    #[tokio::test]
    async fn matches_subject() {
        let rule = SubjectRule::new("unsubscribe").unwrap();
        let msg = Message::new(1, vec![Sender::new("a", "x.com")], "Weekly deals - Unsubscribe");
        assert!(rule.should_delete(&msg).await);
    }

    #[tokio::test]
    async fn message_without_senders_kept() {
        let rule = SubjectRule::new("unsubscribe").unwrap();
        let msg = Message::new(1, vec![], "Weekly deals - Unsubscribe");
        assert!(!rule.should_delete(&msg).await);
    }
}
