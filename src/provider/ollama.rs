//! Ollama local adapter (OpenAI-compatible endpoint, keyless).

use async_trait::async_trait;

use crate::error::TychoError;

use super::openai::OpenAiModel;
use super::{GenerateRequest, GenerateResponse, LanguageModel, TextStream};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaModel {
    inner: OpenAiModel,
}

impl OllamaModel {
    pub fn new(model_id: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            inner: OpenAiModel::new(
                model_id,
                String::new(), // no API key for local
                Some(format!("{}/v1", base_url.trim_end_matches('/'))),
            ),
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, TychoError> {
        self.inner.generate(request).await
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream, TychoError> {
        self.inner.stream(request).await
    }
}
