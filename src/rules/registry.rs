//! Rule registry: rule-type name → factory, and rule-file loading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RuleError;
use crate::rules::config::RuleConfig;
use crate::rules::{Rule, RuleSet, address, ai, domain, subject};

/// Builds a rule from its configuration record.
pub type RuleFactory = Box<dyn Fn(&RuleConfig) -> Result<Box<dyn Rule>, RuleError> + Send + Sync>;

/// Registry of rule factories, keyed by the `type` used in rule files.
pub struct RuleRegistry {
    factories: HashMap<String, RuleFactory>,
}

impl RuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in rule type registered.
    ///
    /// AI rules append positive classifications to `audit_log`; the file is
    /// opened the first time an enabled AI rule is built.
    pub fn with_builtin_rules(audit_log: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new();
        address::register(&mut registry);
        domain::register(&mut registry);
        subject::register(&mut registry);
        ai::register(&mut registry, audit_log.into());
        registry
    }

    /// Register a factory. A later registration under the same name wins.
    pub fn register<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&RuleConfig) -> Result<Box<dyn Rule>, RuleError> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(type_name.to_string(), Box::new(factory))
            .is_some()
        {
            debug!(rule_type = type_name, "Replaced rule factory");
        } else {
            debug!(rule_type = type_name, "Registered rule factory");
        }
    }

    /// Check if a rule type is registered.
    pub fn has(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered rule types, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build one rule from its record.
    pub fn build(&self, config: &RuleConfig) -> Result<Box<dyn Rule>, RuleError> {
        let rule_type = config.rule_type().ok_or(RuleError::MissingType)?;
        let factory = self
            .factories
            .get(rule_type)
            .ok_or_else(|| RuleError::UnknownType(rule_type.to_string()))?;
        factory(config)
    }

    /// Build a rule set from parsed records, skipping (and logging) every
    /// record that cannot be turned into a rule.
    pub fn build_all(&self, records: Vec<Value>) -> RuleSet {
        let mut set = RuleSet::empty();

        for (index, record) in records.into_iter().enumerate() {
            let Some(config) = RuleConfig::from_value(record) else {
                warn!(index, "Skipping rule record: not an object");
                continue;
            };
            match self.build(&config) {
                Ok(rule) => {
                    info!(index, rule = %rule, "Loaded rule");
                    set.push(rule);
                }
                Err(e @ (RuleError::MissingType | RuleError::UnknownType(_))) => {
                    warn!(index, error = %e, "Skipping rule record");
                }
                Err(e) => {
                    warn!(
                        index,
                        rule_type = config.rule_type().unwrap_or_default(),
                        error = %e,
                        "Error creating rule"
                    );
                }
            }
        }

        if set.is_empty() {
            warn!("No valid rules found; nothing will be deleted");
        }
        set
    }

    /// Parse a JSON array of rule records and build the rule set.
    pub fn build_from_str(&self, json: &str, origin: &Path) -> Result<RuleSet, RuleError> {
        let records: Vec<Value> =
            serde_json::from_str(json).map_err(|source| RuleError::ParseFile {
                path: origin.to_path_buf(),
                source,
            })?;
        Ok(self.build_all(records))
    }

    /// Read and build a rule file. Unreadable or unparsable files are errors;
    /// bad records inside a valid file are skipped.
    pub fn build_from_file(&self, path: impl AsRef<Path>) -> Result<RuleSet, RuleError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RuleError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let set = self.build_from_str(&json, path)?;
        info!(path = %path.display(), rules = set.len(), "Rule set built");
        Ok(set)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
