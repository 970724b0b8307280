//! Delete mail whose sender host contains a configured domain.

use std::fmt;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::RuleError;
use crate::mailbox::Message;
use crate::rules::{Rule, RuleRegistry};

pub const RULE_TYPE: &str = "domain_rule";

/// Domains shorter than this match suspiciously many hosts.
const MIN_SPECIFIC_DOMAIN_LEN: usize = 4;

/// Matches when any sender host contains the configured domain as a
/// substring, ignoring case. `example.com` also matches `promo.example.com`
/// (and `notexample.com`).
#[derive(Debug, Clone)]
pub struct DomainRule {
    domain: String,
}

impl DomainRule {
    pub fn new(domain: impl Into<String>) -> Result<Self, RuleError> {
        let domain = domain.into();
        if domain.is_empty() {
            return Err(RuleError::InvalidField {
                rule_type: RULE_TYPE.into(),
                field: "domain".into(),
                reason: "domain cannot be empty".into(),
            });
        }
        if is_broad(&domain) {
            warn!(
                domain = %domain,
                "Domain rule is very unspecific and will match many unrelated hosts"
            );
        }
        Ok(Self { domain })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

/// Case-insensitive substring containment. An empty rule domain matches
/// every host; construction refuses it.
pub fn apply(email_domain: &str, rule_domain: &str) -> bool {
    email_domain
        .to_lowercase()
        .contains(&rule_domain.to_lowercase())
}

fn is_broad(domain: &str) -> bool {
    domain.chars().count() < MIN_SPECIFIC_DOMAIN_LEN || !domain.contains('.')
}

pub(crate) fn register(registry: &mut RuleRegistry) {
    registry.register(RULE_TYPE, |config| {
        let domain = config.require_str("domain")?;
        Ok(Box::new(DomainRule::new(domain)?))
    });
}

impl fmt::Display for DomainRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainRule{{domain: {}}}", self.domain)
    }
}

#[async_trait]
impl Rule for DomainRule {
    async fn should_delete(&self, message: &Message) -> bool {
        let matched = message
            .from
            .iter()
            .any(|sender| apply(&sender.host, &self.domain));
        if matched {
            info!(uid = %message.uid, domain = %self.domain, "Deleting email from domain");
        }
        matched
    }
}
