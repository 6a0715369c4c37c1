//! Google Gemini API adapter.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::TychoError;
use crate::types::*;

use super::http::{request_timeout, shared_client};
use super::{GenerateRequest, GenerateResponse, LanguageModel, TextStream};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleModel {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl GoogleModel {
    pub fn new(model_id: impl Into<String>, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_request_body(&self, request: &GenerateRequest) -> serde_json::Value {
        let mut system_instruction = None;
        let mut contents = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => {
                    system_instruction = Some(serde_json::json!({
                        "parts": [{"text": msg.text()}]
                    }));
                }
                Role::User => {
                    contents.push(serde_json::json!({
                        "role": "user",
                        "parts": build_gemini_parts(&msg.content),
                    }));
                }
                Role::Assistant => {
                    contents.push(serde_json::json!({
                        "role": "model",
                        "parts": [{"text": msg.text()}],
                    }));
                }
            }
        }

        let mut body = serde_json::json!({ "contents": contents });
        let obj = body.as_object_mut().expect("body is an object");

        if let Some(sys) = system_instruction {
            obj.insert("systemInstruction".into(), sys);
        }

        let mut gen_config = serde_json::Map::new();
        if let Some(max) = request.settings.max_tokens {
            gen_config.insert("maxOutputTokens".into(), max.into());
        }
        if let Some(temp) = request.settings.temperature {
            gen_config.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            gen_config.insert("topP".into(), top_p.into());
        }
        if let Some(top_k) = request.settings.top_k {
            gen_config.insert("topK".into(), top_k.into());
        }
        if let Some(ref stops) = request.settings.stop_sequences {
            gen_config.insert("stopSequences".into(), serde_json::json!(stops));
        }
        if !gen_config.is_empty() {
            obj.insert(
                "generationConfig".into(),
                serde_json::Value::Object(gen_config),
            );
        }

        body
    }

    fn send_request(
        &self,
        url: String,
        body: &serde_json::Value,
        timeout_ms: Option<u64>,
    ) -> reqwest::RequestBuilder {
        let mut builder = shared_client().post(&url).json(body);
        if let Some(timeout) = request_timeout(timeout_ms) {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

#[async_trait]
impl LanguageModel for GoogleModel {
    fn provider_name(&self) -> &str {
        "google"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, TychoError> {
        let body = self.build_request_body(request);

        debug!(model = %self.model_id, "Google generate");

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model_id, self.api_key
        );
        let resp = self
            .send_request(url, &body, request.settings.timeout_ms)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(super::http::status_to_error(status, &body_text));
        }

        let data: GeminiResponse = resp.json().await?;
        let candidate = data
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| TychoError::api(200, "No candidates in Gemini response"))?;

        let text = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(GenerateResponse {
            text,
            usage: data.usage_metadata.map(usage_from_gemini).unwrap_or_default(),
            finish_reason: parse_finish_reason(candidate.finish_reason.as_deref()),
        })
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream, TychoError> {
        let body = self.build_request_body(request);

        debug!(model = %self.model_id, "Google stream");

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.model_id, self.api_key
        );
        let resp = self
            .send_request(url, &body, request.settings.timeout_ms)
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

                    let Some(data) = super::http::parse_sse_data(&line) else {
                        continue;
                    };
                    let Ok(resp) = serde_json::from_str::<GeminiResponse>(data) else {
                        continue;
                    };

                    if let Some(candidate) = resp.candidates.into_iter().next() {
                        let text = candidate
                            .content
                            .parts
                            .into_iter()
                            .filter_map(|p| p.text)
                            .collect::<Vec<_>>()
                            .join("");
                        // Gemini sends the finish reason on its last chunk
                        // rather than in a separate terminal event.
                        if let Some(finish) = parse_finish_reason(candidate.finish_reason.as_deref()) {
                            if !text.is_empty() {
                                yield Ok(TextStreamDelta::text(text));
                            }
                            yield Ok(TextStreamDelta::done(
                                finish,
                                resp.usage_metadata.map(usage_from_gemini),
                            ));
                        } else if !text.is_empty() {
                            yield Ok(TextStreamDelta::text(text));
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn parse_finish_reason(s: Option<&str>) -> Option<FinishReason> {
    match s {
        Some("STOP") => Some(FinishReason::Stop),
        Some("MAX_TOKENS") => Some(FinishReason::Length),
        Some("SAFETY") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => {
            Some(FinishReason::ContentFilter)
        }
        Some(_) => Some(FinishReason::Error),
        None => None,
    }
}

fn usage_from_gemini(u: GeminiUsage) -> Usage {
    Usage {
        input_tokens: u.prompt_token_count,
        output_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
    }
}

fn build_gemini_parts(content: &[ContentPart]) -> Vec<serde_json::Value> {
    content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => serde_json::json!({"text": text}),
            ContentPart::Image(img) => serde_json::json!({
                "inlineData": {
                    "mimeType": img.mime_type,
                    "data": img.data,
                }
            }),
        })
        .collect()
}

// Gemini API response types (internal)

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GeminiUsage {
    prompt_token_count: u32,
    candidates_token_count: u32,
    total_token_count: u32,
}
