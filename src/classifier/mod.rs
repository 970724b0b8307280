//! Spam classification via a remote text-generation model.

pub mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;

use crate::error::ClassifierError;

/// Decides spam/ham for one sender address and subject.
///
/// `instruction` is appended verbatim to the prompt the implementation builds.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn is_spam(
        &self,
        address: &str,
        subject: &str,
        instruction: &str,
    ) -> Result<bool, ClassifierError>;
}
