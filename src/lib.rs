//! Mail Cleaner: rule-driven mailbox cleanup with an optional AI spam classifier.

pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod pipeline;
pub mod rules;
pub mod stats;

pub use error::{Error, Result};
