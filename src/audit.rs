//! Append-only record of positive spam classifications.
//!
//! One line per classification: `Classified as spam: <address> - <subject>`.
//! The `analyze` binary reads this format back.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{error, warn};

/// Marker that starts every audit line.
pub const SPAM_MARKER: &str = "Classified as spam:";

/// Audit line for one classification.
pub fn format_entry(address: &str, subject: &str) -> String {
    format!("{SPAM_MARKER} {address} - {subject}")
}

/// Audit sink. Falls back to stdout when the file could not be opened.
pub struct AuditLog {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl AuditLog {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open audit log, writing to stdout");
                None
            }
        };
        Self {
            path: Some(path.to_path_buf()),
            file: Mutex::new(file),
        }
    }

    /// Sink that always writes to stdout.
    pub fn stdout() -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
        }
    }

    /// Path of the backing file, if one was requested.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record_spam(&self, address: &str, subject: &str) {
        let line = format_entry(address, subject);
        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_mut() {
            Some(file) => {
                if let Err(e) = writeln!(file, "{line}") {
                    error!(error = %e, "Failed to write audit log entry");
                    println!("{line}");
                }
            }
            None => println!("{line}"),
        }
    }
}
