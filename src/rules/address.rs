//! Delete mail from one exact sender address.

use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::error::RuleError;
use crate::mailbox::Message;
use crate::rules::{Rule, RuleRegistry};

pub const RULE_TYPE: &str = "address_rule";

/// Matches when any sender equals the configured address, ignoring case.
#[derive(Debug, Clone)]
pub struct AddressRule {
    address: String,
}

impl AddressRule {
    pub fn new(address: impl Into<String>) -> Result<Self, RuleError> {
        let address = address.into();
        if address.is_empty() {
            return Err(RuleError::InvalidField {
                rule_type: RULE_TYPE.into(),
                field: "address".into(),
                reason: "address cannot be empty".into(),
            });
        }
        Ok(Self { address })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Case-insensitive address equality.
pub fn apply(email_address: &str, rule_address: &str) -> bool {
    email_address.to_lowercase() == rule_address.to_lowercase()
}

pub(crate) fn register(registry: &mut RuleRegistry) {
    registry.register(RULE_TYPE, |config| {
        let address = config.require_str("address")?;
        Ok(Box::new(AddressRule::new(address)?))
    });
}

impl fmt::Display for AddressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddressRule{{address: {}}}", self.address)
    }
}

#[async_trait]
impl Rule for AddressRule {
    async fn should_delete(&self, message: &Message) -> bool {
        let matched = message
            .from
            .iter()
            .any(|sender| apply(&sender.address(), &self.address));
        if matched {
            info!(uid = %message.uid, address = %self.address, "Deleting email from address");
        }
        matched
    }
}
