//! Convenience re-exports for common use.

pub use crate::config::TychoConfig;
pub use crate::error::{Result, TychoError};
pub use crate::factory::ModelFactory;
pub use crate::middleware::{Middleware, wrap};
pub use crate::provider::{GenerateRequest, GenerateResponse, LanguageModel, TextStream};
pub use crate::registry::{ProviderRegistry, ProviderTag, Resolution};
pub use crate::types::{
    ContentPart, FinishReason, GenerationSettings, ModelMessage, Role, StreamEventType,
    TextStreamDelta, Usage,
};
