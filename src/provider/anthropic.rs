//! Anthropic Messages API adapter.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::TychoError;
use crate::types::*;

use super::http::{anthropic_headers, request_timeout, shared_client};
use super::{GenerateRequest, GenerateResponse, LanguageModel, TextStream};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicModel {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl AnthropicModel {
    pub fn new(model_id: impl Into<String>, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_request_body(&self, request: &GenerateRequest, stream: bool) -> serde_json::Value {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => {
                    system_parts.push(msg.text());
                }
                Role::User => {
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": build_anthropic_content(&msg.content),
                    }));
                }
                Role::Assistant => {
                    messages.push(serde_json::json!({
                        "role": "assistant",
                        "content": msg.text(),
                    }));
                }
            }
        }

        // The Messages API requires max_tokens.
        let max_tokens = request.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "max_tokens": max_tokens,
            "stream": stream,
        });

        let obj = body.as_object_mut().expect("body is an object");

        if !system_parts.is_empty() {
            obj.insert("system".into(), system_parts.join("\n").into());
        }
        if let Some(temp) = request.settings.temperature {
            obj.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            obj.insert("top_p".into(), top_p.into());
        }
        if let Some(top_k) = request.settings.top_k {
            obj.insert("top_k".into(), top_k.into());
        }
        if let Some(ref stops) = request.settings.stop_sequences {
            obj.insert("stop_sequences".into(), serde_json::json!(stops));
        }

        body
    }

    fn request_builder(&self, body: &serde_json::Value, timeout_ms: Option<u64>) -> reqwest::RequestBuilder {
        let url = format!("{}/messages", self.base_url);
        let mut builder = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(body);
        if let Some(timeout) = request_timeout(timeout_ms) {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, TychoError> {
        let body = self.build_request_body(request, false);

        debug!(model = %self.model_id, "Anthropic generate");

        let resp = self
            .request_builder(&body, request.settings.timeout_ms)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(super::http::status_to_error(status, &body_text));
        }

        let data: AnthropicResponse = resp.json().await?;

        let text = data
            .content
            .iter()
            .filter_map(|block| {
                if block.block_type == "text" {
                    block.text.as_deref()
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(GenerateResponse {
            text,
            usage: Usage {
                input_tokens: data.usage.input_tokens,
                output_tokens: data.usage.output_tokens,
                total_tokens: data.usage.input_tokens + data.usage.output_tokens,
            },
            finish_reason: parse_stop_reason(data.stop_reason.as_deref()),
        })
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream, TychoError> {
        let body = self.build_request_body(request, true);

        debug!(model = %self.model_id, "Anthropic stream");

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
            let mut finish: Option<FinishReason> = None;
            let mut input_tokens: u32 = 0;
            let mut usage: Option<Usage> = None;
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(TychoError::Network(e));
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

                    let Some(data) = super::http::parse_sse_data(&line) else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
                        continue;
                    };

                    match event.get("type").and_then(|t| t.as_str()).unwrap_or("") {
                        "message_start" => {
                            // Input usage arrives up front; output usage and
                            // the stop reason come later in message_delta.
                            if let Some(inp) = event
                                .get("message")
                                .and_then(|m| m.get("usage"))
                                .and_then(|u| u.get("input_tokens"))
                                .and_then(|v| v.as_u64())
                            {
                                input_tokens = inp as u32;
                            }
                        }
                        "content_block_delta" => {
                            let text = event
                                .get("delta")
                                .filter(|d| d.get("type").and_then(|t| t.as_str()) == Some("text_delta"))
                                .and_then(|d| d.get("text"))
                                .and_then(|t| t.as_str());
                            if let Some(text) = text {
                                yield Ok(TextStreamDelta::text(text));
                            }
                        }
                        "message_delta" => {
                            // Stop reason and output usage arrive here; the
                            // terminal delta is emitted on message_stop.
                            let stop = event
                                .get("delta")
                                .and_then(|d| d.get("stop_reason"))
                                .and_then(|s| s.as_str());
                            if let Some(reason) = parse_stop_reason(stop) {
                                finish = Some(reason);
                            }
                            if let Some(out) = event
                                .get("usage")
                                .and_then(|u| u.get("output_tokens"))
                                .and_then(|v| v.as_u64())
                            {
                                let out = out as u32;
                                usage = Some(Usage {
                                    input_tokens,
                                    output_tokens: out,
                                    total_tokens: input_tokens + out,
                                });
                            }
                        }
                        "message_stop" => {
                            yield Ok(TextStreamDelta::done(
                                finish.take().unwrap_or(FinishReason::Stop),
                                usage.take(),
                            ));
                        }
                        "error" => {
                            let message = event
                                .get("error")
                                .and_then(|e| e.get("message"))
                                .and_then(|m| m.as_str())
                                .unwrap_or("Anthropic stream error");
                            yield Err(TychoError::Stream(message.to_string()));
                        }
                        _ => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn parse_stop_reason(s: Option<&str>) -> Option<FinishReason> {
    match s {
        Some("end_turn") | Some("stop_sequence") => Some(FinishReason::Stop),
        Some("max_tokens") => Some(FinishReason::Length),
        _ => None,
    }
}

fn build_anthropic_content(content: &[ContentPart]) -> serde_json::Value {
    // Single text part collapses to a plain string.
    if content.len() == 1 {
        if let ContentPart::Text { ref text } = content[0] {
            return serde_json::json!(text);
        }
    }

    let parts: Vec<serde_json::Value> = content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => serde_json::json!({"type": "text", "text": text}),
            ContentPart::Image(img) => serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": img.mime_type,
                    "data": img.data,
                }
            }),
        })
        .collect();

    serde_json::json!(parts)
}

// Anthropic API response types (internal)

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
