//! Delete (or just log) mail that a remote model classifies as spam.
//!
//! Senders on the exclusion lists never reach the classifier. A classifier
//! failure keeps the message. Every positive classification is written to
//! the audit log; only `action: "delete"` turns it into a delete vote.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::classifier::{Classifier, OllamaClient};
use crate::config::ClassifierConfig;
use crate::error::RuleError;
use crate::mailbox::{Message, Sender};
use crate::rules::{Rule, RuleConfig, RuleRegistry};

/// Both names select the same rule.
pub const RULE_TYPES: &[&str] = &["ai_rule", "ai_local_rule"];

/// Instruction appended to the classifier prompt when the rule sets none.
pub const DEFAULT_PROMPT: &str = "Is this email spam? answer only one word:(spam or ham).";

/// What to do with a message classified as spam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiAction {
    /// Record in the audit log, keep the message.
    Log,
    /// Record in the audit log and delete the message.
    Delete,
}

impl AiAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for AiAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log" => Ok(Self::Log),
            "delete" => Ok(Self::Delete),
            other => Err(format!("action must be 'log' or 'delete', got: {other}")),
        }
    }
}

impl fmt::Display for AiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct AiRule {
    enabled: bool,
    action: AiAction,
    prompt: String,
    classifier: Arc<dyn Classifier>,
    excluded_domains: Vec<String>,
    excluded_addresses: Vec<String>,
    audit: Arc<AuditLog>,
}

impl AiRule {
    pub fn new(action: AiAction, classifier: Arc<dyn Classifier>, audit: Arc<AuditLog>) -> Self {
        Self {
            enabled: true,
            action,
            prompt: DEFAULT_PROMPT.to_string(),
            classifier,
            excluded_domains: Vec::new(),
            excluded_addresses: Vec::new(),
            audit,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_exclusions(mut self, domains: Vec<String>, addresses: Vec<String>) -> Self {
        self.excluded_domains = domains;
        self.excluded_addresses = addresses;
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn action(&self) -> AiAction {
        self.action
    }

    /// Build from a rule record.
    ///
    /// `enabled` defaults to false and `action` to `log`. An enabled rule
    /// must list `exclude_domains` and `exclude_addresses` (either may be empty).
    /// `audit` is only called for enabled rules.
    pub fn from_config(
        config: &RuleConfig,
        audit: impl FnOnce() -> Arc<AuditLog>,
    ) -> Result<Self, RuleError> {
        let enabled = config.opt_bool("enabled").unwrap_or(false);
        let action = match config.opt_str("action") {
            Some(raw) => raw
                .parse::<AiAction>()
                .map_err(|reason| config.invalid("action", reason))?,
            None => AiAction::Log,
        };
        let prompt = config.opt_str("prompt").unwrap_or(DEFAULT_PROMPT);

        let excluded_domains = config.string_list("exclude_domains")?;
        let excluded_addresses = config.string_list("exclude_addresses")?;
        if enabled {
            for (field, list) in [
                ("exclude_domains", &excluded_domains),
                ("exclude_addresses", &excluded_addresses),
            ] {
                if list.is_none() {
                    return Err(RuleError::MissingField {
                        rule_type: config.rule_type().unwrap_or(RULE_TYPES[0]).to_string(),
                        field: field.to_string(),
                    });
                }
            }
        }

        let classifier_config =
            ClassifierConfig::with_overrides(config.opt_str("host_url"), config.opt_str("model"));
        let classifier = OllamaClient::new(classifier_config)
            .map_err(|e| config.invalid("host_url", e.to_string()))?;

        let audit = if enabled {
            audit()
        } else {
            Arc::new(AuditLog::stdout())
        };

        Ok(Self::new(action, Arc::new(classifier), audit)
            .with_enabled(enabled)
            .with_prompt(prompt)
            .with_exclusions(
                excluded_domains.unwrap_or_default(),
                excluded_addresses.unwrap_or_default(),
            ))
    }

    /// Exact, case-sensitive match on the address or the host.
    fn is_excluded(&self, sender: &Sender, address: &str) -> bool {
        self.excluded_addresses.iter().any(|a| a == address)
            || self.excluded_domains.iter().any(|d| *d == sender.host)
    }

    /// Classify one sender/subject pair and turn the answer into a vote.
    async fn apply(&self, address: &str, subject: &str) -> bool {
        match self.classifier.is_spam(address, subject, &self.prompt).await {
            Ok(true) => {
                self.audit.record_spam(address, subject);
                if self.action == AiAction::Delete {
                    info!(address, subject, "AI classified as spam, deleting");
                    true
                } else {
                    info!(address, subject, "AI classified as spam, log only");
                    false
                }
            }
            Ok(false) => false,
            Err(e) => {
                warn!(address, error = %e, "Error classifying email, keeping it");
                false
            }
        }
    }
}

pub(crate) fn register(registry: &mut RuleRegistry, audit_path: PathBuf) {
    // One audit file per process, shared by every AI rule.
    let shared: Arc<OnceLock<Arc<AuditLog>>> = Arc::new(OnceLock::new());

    for &name in RULE_TYPES {
        let shared = Arc::clone(&shared);
        let path = audit_path.clone();
        registry.register(name, move |config| {
            let audit = || Arc::clone(shared.get_or_init(|| Arc::new(AuditLog::open(&path))));
            Ok(Box::new(AiRule::from_config(config, audit)?))
        });
    }
}

impl fmt::Display for AiRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AIRule{{enabled: {}, action: {}}}",
            self.enabled, self.action
        )
    }
}

#[async_trait]
impl Rule for AiRule {
    async fn should_delete(&self, message: &Message) -> bool {
        if !self.enabled {
            return false;
        }
        for sender in &message.from {
            let address = sender.address();
            if self.is_excluded(sender, &address) {
                debug!(address = %address, "Sender excluded from AI classification");
                continue;
            }
            if self.apply(&address, &message.subject).await {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::error::ClassifierError;

    #[derive(Clone, Copy)]
    enum Verdict {
        Spam,
        Ham,
        Fail,
    }

    struct MockClassifier {
        verdict: Verdict,
        calls: AtomicUsize,
    }

    impl MockClassifier {
        fn new(verdict: Verdict) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Classifier for MockClassifier {
        async fn is_spam(
            &self,
            _address: &str,
            _subject: &str,
            _instruction: &str,
        ) -> Result<bool, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.verdict {
                Verdict::Spam => Ok(true),
                Verdict::Ham => Ok(false),
                Verdict::Fail => Err(ClassifierError::Request("mock error".into())),
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        log_path: PathBuf,
        audit: Arc<AuditLog>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let log_path = dir.path().join("spam_classification.log");
            let audit = Arc::new(AuditLog::open(&log_path));
            Self {
                _dir: dir,
                log_path,
                audit,
            }
        }

        fn rule(&self, action: AiAction, classifier: Arc<MockClassifier>) -> AiRule {
            AiRule::new(action, classifier, Arc::clone(&self.audit))
        }

        fn audit_lines(&self) -> Vec<String> {
            std::fs::read_to_string(&self.log_path)
                .unwrap_or_default()
                .lines()
                .map(String::from)
                .collect()
        }
    }

    fn spam_message() -> Message {
        Message::new(1, vec![Sender::new("spam", "example.com")], "Get rich quick!")
    }

    #[tokio::test]
    async fn spam_in_log_mode_is_recorded_but_kept() {
        let fx = Fixture::new();
        let rule = fx.rule(AiAction::Log, MockClassifier::new(Verdict::Spam));

        assert!(!rule.should_delete(&spam_message()).await);
        assert_eq!(
            fx.audit_lines(),
            vec!["Classified as spam: spam@example.com - Get rich quick!"]
        );
    }

    #[tokio::test]
    async fn spam_in_delete_mode_is_deleted() {
        let fx = Fixture::new();
        let rule = fx.rule(AiAction::Delete, MockClassifier::new(Verdict::Spam));

        assert!(rule.should_delete(&spam_message()).await);
        assert_eq!(fx.audit_lines().len(), 1);
    }

    #[tokio::test]
    async fn ham_is_kept_without_audit() {
        let fx = Fixture::new();
        let rule = fx.rule(AiAction::Delete, MockClassifier::new(Verdict::Ham));

        assert!(!rule.should_delete(&spam_message()).await);
        assert!(fx.audit_lines().is_empty());
    }

    #[tokio::test]
    async fn classifier_error_fails_open() {
        let fx = Fixture::new();
        let classifier = MockClassifier::new(Verdict::Fail);
        let rule = fx.rule(AiAction::Delete, Arc::clone(&classifier));

        assert!(!rule.should_delete(&spam_message()).await);
        assert_eq!(classifier.calls(), 1);
        assert!(fx.audit_lines().is_empty());
    }

    #[tokio::test]
    async fn disabled_rule_never_classifies() {
        let fx = Fixture::new();
        let classifier = MockClassifier::new(Verdict::Spam);
        let rule = fx
            .rule(AiAction::Delete, Arc::clone(&classifier))
            .with_enabled(false);

        assert!(!rule.should_delete(&spam_message()).await);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn no_senders_never_classifies() {
        let fx = Fixture::new();
        let classifier = MockClassifier::new(Verdict::Spam);
        let rule = fx.rule(AiAction::Delete, Arc::clone(&classifier));

        assert!(!rule.should_delete(&Message::new(1, vec![], "Test")).await);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn excluded_address_never_reaches_classifier() {
        let fx = Fixture::new();
        let classifier = MockClassifier::new(Verdict::Spam);
        let rule = fx
            .rule(AiAction::Delete, Arc::clone(&classifier))
            .with_exclusions(vec![], vec!["spam@example.com".into()]);

        assert!(!rule.should_delete(&spam_message()).await);
        assert_eq!(classifier.calls(), 0);
        assert!(fx.audit_lines().is_empty());
    }

    #[tokio::test]
    async fn excluded_domain_never_reaches_classifier() {
        let fx = Fixture::new();
        let classifier = MockClassifier::new(Verdict::Spam);
        let rule = fx
            .rule(AiAction::Delete, Arc::clone(&classifier))
            .with_exclusions(vec!["example.com".into()], vec![]);

        assert!(!rule.should_delete(&spam_message()).await);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn exclusions_compare_exactly() {
        let fx = Fixture::new();
        let classifier = MockClassifier::new(Verdict::Spam);
        let rule = fx
            .rule(AiAction::Delete, Arc::clone(&classifier))
            .with_exclusions(vec!["Example.COM".into()], vec!["Spam@example.com".into()]);

        assert!(rule.should_delete(&spam_message()).await);
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn excluded_sender_skipped_but_next_sender_classified() {
        let fx = Fixture::new();
        let classifier = MockClassifier::new(Verdict::Spam);
        let rule = fx
            .rule(AiAction::Delete, Arc::clone(&classifier))
            .with_exclusions(vec!["trusted.org".into()], vec![]);
        let msg = Message::new(
            1,
            vec![Sender::new("boss", "trusted.org"), Sender::new("spam", "example.com")],
            "Offer",
        );

        assert!(rule.should_delete(&msg).await);
        assert_eq!(classifier.calls(), 1);
    }

    #[test]
    fn action_parsing() {
        assert_eq!("log".parse::<AiAction>().unwrap(), AiAction::Log);
        assert_eq!("delete".parse::<AiAction>().unwrap(), AiAction::Delete);
        assert!("purge".parse::<AiAction>().is_err());
    }

    fn config(value: serde_json::Value) -> RuleConfig {
        RuleConfig::from_value(value).unwrap()
    }

    #[test]
    fn from_config_defaults_to_disabled_log() {
        let rule = AiRule::from_config(&config(json!({"type": "ai_rule"})), || {
            panic!("audit log must not be opened for a disabled rule")
        })
        .unwrap();
        assert!(!rule.enabled());
        assert_eq!(rule.action(), AiAction::Log);
        assert_eq!(rule.to_string(), "AIRule{enabled: false, action: log}");
    }

    #[test]
    fn from_config_rejects_unknown_action() {
        let err = AiRule::from_config(
            &config(json!({"type": "ai_rule", "action": "purge"})),
            || Arc::new(AuditLog::stdout()),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("action must be 'log' or 'delete'"));
    }

    #[test]
    fn enabled_rule_requires_exclusion_lists() {
        let missing_domains = config(json!({
            "type": "ai_rule", "enabled": true, "action": "delete",
            "exclude_addresses": []
        }));
        let err = AiRule::from_config(&missing_domains, || Arc::new(AuditLog::stdout()))
            .err()
            .unwrap();
        assert!(matches!(err, RuleError::MissingField { ref field, .. } if field == "exclude_domains"));

        let missing_addresses = config(json!({
            "type": "ai_rule", "enabled": true, "action": "delete",
            "exclude_domains": ["example.com"]
        }));
        assert!(AiRule::from_config(&missing_addresses, || Arc::new(AuditLog::stdout())).is_err());
    }

    #[test]
    fn from_config_enabled_with_lists() {
        let fx = Fixture::new();
        let rule = AiRule::from_config(
            &config(json!({
                "type": "ai_local_rule",
                "enabled": true,
                "action": "delete",
                "prompt": "custom",
                "host_url": "http://127.0.0.1:1",
                "model": "llama3",
                "exclude_domains": ["example.com"],
                "exclude_addresses": ["boss@corp.com"]
            })),
            || Arc::clone(&fx.audit),
        )
        .unwrap();
        assert!(rule.enabled());
        assert_eq!(rule.action(), AiAction::Delete);
        assert_eq!(rule.prompt, "custom");
        assert_eq!(rule.excluded_domains, vec!["example.com"]);
        assert_eq!(rule.excluded_addresses, vec!["boss@corp.com"]);
    }
}
