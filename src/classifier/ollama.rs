//! Client for an Ollama-compatible `/api/generate` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::Classifier;
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

/// Stateless spam classifier backed by a local or remote model server.
pub struct OllamaClient {
    config: ClassifierConfig,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ClassifierError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn generate(&self, prompt: &str) -> Result<GenerateResponse, ClassifierError> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        let resp = self
            .client
            .post(format!("{}/api/generate", self.config.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        resp.json()
            .await
            .map_err(|e| ClassifierError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Classifier for OllamaClient {
    async fn is_spam(
        &self,
        address: &str,
        subject: &str,
        instruction: &str,
    ) -> Result<bool, ClassifierError> {
        let prompt = build_prompt(address, subject, instruction);
        let deadline = self.config.call_timeout;

        let response = tokio::time::timeout(deadline, self.generate(&prompt))
            .await
            .map_err(|_| ClassifierError::Timeout(deadline))??;

        debug!(
            address,
            model = %self.config.model,
            response = %response.response.trim(),
            done = response.done,
            "Classifier answered"
        );
        Ok(is_spam_response(&response.response))
    }
}

/// Prompt sent to the model for one message.
pub fn build_prompt(address: &str, subject: &str, instruction: &str) -> String {
    format!(
        "You are a spam email classifier. Analyze the following email and determine if it's spam.\n\
         From: {address}\n\
         Subject: {subject}\n\
         Answer with ONLY \"SPAM\" if it's spam or \"HAM\" if it's not spam. No explanations. {instruction}"
    )
}

/// Any occurrence of "spam" in the answer counts as spam, whatever else it says.
pub fn is_spam_response(response: &str) -> bool {
    response.trim().to_lowercase().contains("spam")
}
