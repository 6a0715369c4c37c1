//! Middleware composition around callable models.
//!
//! A stage may rewrite outgoing parameters, wrap the generate call, and wrap
//! the stream call. Stages compose as an ordered pipeline: parameter
//! transformation runs in list order, and call wrapping folds back-to-front so
//! the first stage in the list is the outermost wrapper for both operations.
//! A stage that overrides nothing is fully transparent.

pub mod builtin;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::TychoError;
use crate::provider::{GenerateRequest, GenerateResponse, LanguageModel, TextStream};

/// Continuation for the generate path: the rest of the chain plus the real
/// provider call.
pub type GenerateFn =
    dyn Fn(GenerateRequest) -> BoxFuture<'static, Result<GenerateResponse, TychoError>>
        + Send
        + Sync;

/// Continuation for the stream path.
pub type StreamFn =
    dyn Fn(GenerateRequest) -> BoxFuture<'static, Result<TextStream, TychoError>> + Send + Sync;

/// A unit of cross-cutting behavior injected around every model call.
///
/// All hooks default to pass-through, so implementors override only what they
/// need. A `wrap_generate`/`wrap_stream` override receives `next` and returns
/// a new continuation; it must invoke `next` (or deliberately substitute a
/// result) and must forward errors it does not explicitly handle.
pub trait Middleware: Send + Sync {
    /// Rewrite call parameters before they reach the model.
    fn transform_params(&self, request: GenerateRequest) -> GenerateRequest {
        request
    }

    /// Wrap the single-shot generate operation.
    fn wrap_generate(&self, next: Arc<GenerateFn>) -> Arc<GenerateFn> {
        next
    }

    /// Wrap the stream operation. A wrapping stage must forward the terminal
    /// delta exactly once, never later than the underlying stream terminates.
    fn wrap_stream(&self, next: Arc<StreamFn>) -> Arc<StreamFn> {
        next
    }
}

/// Wrap a model in an ordered middleware chain.
///
/// An empty chain returns the model unchanged. The wrapped handle exposes the
/// same two-operation surface as the bare model; callers cannot tell them
/// apart except by side effects the stages add.
pub fn wrap(
    model: Arc<dyn LanguageModel>,
    stages: Vec<Arc<dyn Middleware>>,
) -> Arc<dyn LanguageModel> {
    if stages.is_empty() {
        return model;
    }

    // Compose both call chains up front. Folding in reverse makes the first
    // stage in the list the outermost wrapper.
    let generate_chain = {
        let model = model.clone();
        let mut chain: Arc<GenerateFn> = Arc::new(move |request: GenerateRequest| {
            let model = model.clone();
            Box::pin(async move { model.generate(&request).await })
        });
        for stage in stages.iter().rev() {
            chain = stage.wrap_generate(chain);
        }
        chain
    };

    let stream_chain = {
        let model = model.clone();
        let mut chain: Arc<StreamFn> = Arc::new(move |request: GenerateRequest| {
            let model = model.clone();
            Box::pin(async move { model.stream(&request).await })
        });
        for stage in stages.iter().rev() {
            chain = stage.wrap_stream(chain);
        }
        chain
    };

    Arc::new(WrappedModel {
        inner: model,
        stages,
        generate_chain,
        stream_chain,
    })
}

/// A model handle with a middleware chain composed around it.
struct WrappedModel {
    inner: Arc<dyn LanguageModel>,
    stages: Vec<Arc<dyn Middleware>>,
    generate_chain: Arc<GenerateFn>,
    stream_chain: Arc<StreamFn>,
}

impl WrappedModel {
    /// Apply `transform_params` across stages in list order.
    fn transform(&self, request: &GenerateRequest) -> GenerateRequest {
        let mut request = request.clone();
        for stage in &self.stages {
            request = stage.transform_params(request);
        }
        request
    }
}

#[async_trait]
impl LanguageModel for WrappedModel {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, TychoError> {
        let request = self.transform(request);
        (self.generate_chain)(request).await
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream, TychoError> {
        let request = self.transform(request);
        (self.stream_chain)(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AppendUserTag(&'static str);

    impl Middleware for AppendUserTag {
        fn transform_params(&self, mut request: GenerateRequest) -> GenerateRequest {
            let user = request.settings.user.take().unwrap_or_default();
            request.settings.user = Some(format!("{user}{}", self.0));
            request
        }
    }

    #[test]
    fn transform_chain_applies_in_list_order() {
        let stages: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(AppendUserTag("-a")), Arc::new(AppendUserTag("-b"))];
        let mut request = GenerateRequest::new(vec![]);
        for stage in &stages {
            request = stage.transform_params(request);
        }
        assert_eq!(request.settings.user.as_deref(), Some("-a-b"));
    }
}
