//! OpenAI Chat Completions adapter.
//!
//! Also serves OpenAI-compatible endpoints via a base-URL override, which is
//! how the registry uses it as the catch-all default family.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::TychoError;
use crate::types::*;

use super::http::{bearer_headers, request_timeout, shared_client};
use super::{GenerateRequest, GenerateResponse, LanguageModel, TextStream};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiModel {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl OpenAiModel {
    pub fn new(model_id: impl Into<String>, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_request_body(&self, request: &GenerateRequest, stream: bool) -> serde_json::Value {
        let messages = request
            .messages
            .iter()
            .map(message_to_openai)
            .collect::<Vec<_>>();

        let mut body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "stream": stream,
        });

        let obj = body.as_object_mut().expect("body is an object");

        if let Some(max) = request.settings.max_tokens {
            obj.insert("max_tokens".into(), max.into());
        }
        if let Some(temp) = request.settings.temperature {
            obj.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            obj.insert("top_p".into(), top_p.into());
        }
        if let Some(ref stops) = request.settings.stop_sequences {
            obj.insert("stop".into(), serde_json::json!(stops));
        }
        if let Some(seed) = request.settings.seed {
            obj.insert("seed".into(), seed.into());
        }
        if let Some(ref user) = request.settings.user {
            obj.insert("user".into(), user.clone().into());
        }

        body
    }

    fn request_builder(&self, body: &serde_json::Value, timeout_ms: Option<u64>) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(body);
        if let Some(timeout) = request_timeout(timeout_ms) {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, TychoError> {
        let body = self.build_request_body(request, false);

        debug!(model = %self.model_id, "OpenAI generate");

        let resp = self
            .request_builder(&body, request.settings.timeout_ms)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(super::http::status_to_error(status, &body_text));
        }

        let data: OpenAiChatResponse = resp.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TychoError::api(200, "No choices in OpenAI response"))?;

        let finish_reason = choice.finish_reason.as_deref().and_then(parse_finish_reason);

        Ok(GenerateResponse {
            text: choice.message.content.unwrap_or_default(),
            usage: data.usage.map(usage_from_openai).unwrap_or_default(),
            finish_reason,
        })
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream, TychoError> {
        let body = self.build_request_body(request, true);

        debug!(model = %self.model_id, "OpenAI stream");

        let resp = self
            .request_builder(&body, request.settings.timeout_ms)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(super::http::status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            let mut finished = false;
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(TychoError::Network(e));
                        finished = true;
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = super::http::parse_sse_data(&line) {
                        match serde_json::from_str::<OpenAiStreamChunk>(data) {
                            Ok(chunk) => {
                                if let Some(choice) = chunk.choices.into_iter().next() {
                                    let text = choice.delta.content.unwrap_or_default();
                                    let finish =
                                        choice.finish_reason.as_deref().and_then(parse_finish_reason);
                                    if let Some(reason) = finish {
                                        // The final chunk may carry trailing
                                        // content; keep it separate from the
                                        // terminal marker.
                                        if !text.is_empty() {
                                            yield Ok(TextStreamDelta::text(text));
                                        }
                                        yield Ok(TextStreamDelta::done(
                                            reason,
                                            chunk.usage.map(usage_from_openai),
                                        ));
                                        finished = true;
                                    } else if !text.is_empty() {
                                        yield Ok(TextStreamDelta::text(text));
                                    }
                                }
                            }
                            Err(_) => {} // skip unparseable chunks
                        }
                    }
                }
            }

            // Some compatible servers close with [DONE] and never send a
            // finish_reason; the stream contract still requires exactly one
            // terminal delta.
            if !finished {
                yield Ok(TextStreamDelta::done(FinishReason::Stop, None));
            }
        };

        Ok(Box::pin(stream))
    }
}

fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

fn usage_from_openai(u: OpenAiUsage) -> Usage {
    Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    }
}

fn message_to_openai(msg: &ModelMessage) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    // Simple single-text message
    if msg.content.len() == 1 {
        if let ContentPart::Text { ref text } = msg.content[0] {
            return serde_json::json!({ "role": role, "content": text });
        }
    }

    // Multi-part content
    let parts: Vec<serde_json::Value> = msg
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => serde_json::json!({
                "type": "text",
                "text": text,
            }),
            ContentPart::Image(img) => serde_json::json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", img.mime_type, img.data) }
            }),
        })
        .collect();

    serde_json::json!({ "role": role, "content": parts })
}

// OpenAI API response types (internal)

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}
