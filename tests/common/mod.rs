//! Shared test helpers: mock models with canned responses and scripts.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;

use tycho::error::TychoError;
use tycho::provider::{GenerateRequest, GenerateResponse, LanguageModel, TextStream};
use tycho::types::*;

/// One scripted stream item.
#[derive(Clone)]
pub enum ScriptItem {
    Delta(TextStreamDelta),
    Error(String),
}

impl ScriptItem {
    pub fn text(text: &str) -> Self {
        Self::Delta(TextStreamDelta::text(text))
    }

    pub fn done() -> Self {
        Self::Delta(TextStreamDelta::done(FinishReason::Stop, None))
    }
}

/// A mock model with queued generate responses and a scripted stream.
pub struct MockModel {
    model_id: String,
    responses: Mutex<Vec<GenerateResponse>>,
    script: Mutex<Vec<ScriptItem>>,
    generate_error: Mutex<Option<String>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockModel {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            responses: Mutex::new(Vec::new()),
            script: Mutex::new(vec![
                ScriptItem::text("a"),
                ScriptItem::text("b"),
                ScriptItem::done(),
            ]),
            generate_error: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a text response for `generate` (FIFO).
    pub fn queue_response(&self, text: &str) {
        self.responses.lock().unwrap().push(GenerateResponse {
            text: text.to_string(),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
                total_tokens: 30,
            },
            finish_reason: Some(FinishReason::Stop),
        });
    }

    /// Replace the stream script.
    pub fn set_script(&self, script: Vec<ScriptItem>) {
        *self.script.lock().unwrap() = script;
    }

    /// Make every `generate` call fail with an API error.
    pub fn fail_generate(&self, message: &str) {
        *self.generate_error.lock().unwrap() = Some(message.to_string());
    }

    /// The last request this model received, after middleware transformation.
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, TychoError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(message) = self.generate_error.lock().unwrap().clone() {
            return Err(TychoError::api(500, message));
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(GenerateResponse {
                text: "Mock response".to_string(),
                usage: Usage::default(),
                finish_reason: Some(FinishReason::Stop),
            });
        }
        Ok(responses.remove(0))
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream, TychoError> {
        self.requests.lock().unwrap().push(request.clone());

        let script = self.script.lock().unwrap().clone();
        let items: Vec<Result<TextStreamDelta, TychoError>> = script
            .into_iter()
            .map(|item| match item {
                ScriptItem::Delta(delta) => Ok(delta),
                ScriptItem::Error(message) => Err(TychoError::Stream(message)),
            })
            .collect();
        Ok(Box::pin(tokio_stream::iter(items)))
    }
}
