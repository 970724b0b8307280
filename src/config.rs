//! Configuration types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default classifier endpoint (a local Ollama server).
pub const DEFAULT_CLASSIFIER_URL: &str = "http://localhost:11434";

/// Default classifier model.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "mistral";

/// Default audit log file, relative to the working directory.
pub const DEFAULT_AUDIT_LOG: &str = "spam_classification.log";

/// Mailbox credentials for one service.
#[derive(Clone)]
pub struct MailboxConfig {
    pub server: String,
    pub port: u16,
    pub email: String,
    pub password: SecretString,
}

impl MailboxConfig {
    /// Build config from environment variables namespaced by `service`.
    ///
    /// For service `work` the keys are `WORK_IMAP_SERVER`, `WORK_IMAP_PORT`,
    /// `WORK_EMAIL` and `WORK_PASSWORD`. All four are required.
    pub fn from_env(service: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(service, |key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup<F>(service: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |suffix: &str| {
            let key = env_key(service, suffix);
            lookup(&key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnvVar(key))
        };

        let server = require("IMAP_SERVER")?;
        let port_raw = require("IMAP_PORT")?;
        let port = port_raw
            .trim()
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue {
                key: env_key(service, "IMAP_PORT"),
                message: format!("{port_raw:?}: {e}"),
            })?;
        let email = require("EMAIL")?;
        let password = SecretString::from(require("PASSWORD")?);

        Ok(Self {
            server,
            port,
            email,
            password,
        })
    }
}

impl fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for MailboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}:{}", self.email, self.server, self.port)
    }
}

fn env_key(service: &str, suffix: &str) -> String {
    let service = service.trim();
    if service.is_empty() {
        suffix.to_string()
    } else {
        format!("{}_{suffix}", service.to_uppercase())
    }
}

/// Remote classifier settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub model: String,
    /// Timeout of the HTTP client itself.
    pub http_timeout: Duration,
    /// Outer deadline around a whole classification call.
    pub call_timeout: Duration,
}

impl ClassifierConfig {
    /// Defaults, overridden by the non-empty values given.
    pub fn with_overrides(base_url: Option<&str>, model: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(url) = base_url.filter(|u| !u.is_empty()) {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            config.model = model.to_string();
        }
        config
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CLASSIFIER_URL.to_string(),
            model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            http_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(25),
        }
    }
}

/// Location of the spam audit log, `MAIL_CLEANER_AUDIT_LOG` or the default.
pub fn audit_log_path() -> PathBuf {
    std::env::var("MAIL_CLEANER_AUDIT_LOG")
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_AUDIT_LOG))
}
