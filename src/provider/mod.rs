//! The callable model contract and backend adapters.

pub mod http;

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::TychoError;
use crate::types::{GenerationSettings, ModelMessage, TextStreamDelta};
use crate::types::{FinishReason, Usage};

/// An incremental sequence of deltas, terminated by a single `Done` delta.
pub type TextStream = BoxStream<'static, Result<TextStreamDelta, TychoError>>;

/// A request sent to a model.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub messages: Vec<ModelMessage>,
    pub settings: GenerationSettings,
}

impl GenerateRequest {
    /// Build a request from messages with default settings.
    pub fn new(messages: Vec<ModelMessage>) -> Self {
        Self {
            messages,
            settings: GenerationSettings::default(),
        }
    }
}

/// A complete single-shot response.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateResponse {
    pub text: String,
    pub usage: Usage,
    pub finish_reason: Option<FinishReason>,
}

/// The two-operation contract every backend adapter and every wrapped handle
/// satisfies. Application code programs against this trait only; it cannot
/// tell a wrapped handle from a bare one.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider family name (e.g. "openai", "anthropic").
    fn provider_name(&self) -> &str;

    /// The backend-specific model ID this instance serves.
    fn model_id(&self) -> &str;

    /// Generate a complete response in one call.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, TychoError>;

    /// Generate a streaming response.
    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream, TychoError>;
}
