//! Error types for the mail cleaner.

use std::path::PathBuf;
use std::time::Duration;

use crate::mailbox::Uid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while building rules from a rule file.
///
/// `ReadFile` and `ParseFile` abort the load; the rest are per-record and
/// only cause the offending record to be skipped.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Failed to read rules file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rules file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Rule record has no string 'type' field")]
    MissingType,

    #[error("No factory registered for rule type: {0}")]
    UnknownType(String),

    #[error("Invalid or missing '{field}' field in {rule_type}")]
    MissingField { rule_type: String, field: String },

    #[error("Invalid '{field}' field in {rule_type}: {reason}")]
    InvalidField {
        rule_type: String,
        field: String,
        reason: String,
    },
}

/// Spam classifier errors. Always non-fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Failed to send request: {0}")]
    Request(String),

    #[error("Classifier API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Classification timed out after {0:?}")]
    Timeout(Duration),
}

/// Mailbox collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {server}: {reason}")]
    Connect { server: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Login failed for {user}: {reason}")]
    Login { user: String, reason: String },

    #[error("{command} failed: {response}")]
    Command { command: String, response: String },

    #[error("Malformed server response: {0}")]
    Protocol(String),

    #[error("No active mailbox session")]
    NotConnected,

    #[error("Message consumer stopped before the stream finished")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a cleaning run, tagged with the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to connect to mailbox: {0}")]
    Connect(#[source] MailboxError),

    #[error("Failed while scanning messages: {0}")]
    Scan(#[source] MailboxError),

    #[error("Failed to mark UID {uid}: {source}")]
    Mark {
        uid: Uid,
        #[source]
        source: MailboxError,
    },

    #[error("Failed to expunge marked messages: {0}")]
    Expunge(#[source] MailboxError),
}

/// Result type alias for the mail cleaner.
pub type Result<T> = std::result::Result<T, Error>;
