//! Built-in middleware stages.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use regex::Regex;
use tracing::{debug, error, info};

use crate::provider::{GenerateRequest, GenerateResponse};
use crate::types::{ContentPart, GenerationSettings};

use super::{GenerateFn, Middleware, StreamFn};

/// Logs every call and its outcome through `tracing`.
///
/// Uses the logger strictly as a leveled capability: below the subscriber's
/// threshold these are no-ops.
#[derive(Clone, Copy, Default)]
pub struct LoggingStage;

impl Middleware for LoggingStage {
    fn wrap_generate(&self, next: Arc<GenerateFn>) -> Arc<GenerateFn> {
        Arc::new(move |request| {
            let next = next.clone();
            Box::pin(async move {
                debug!(messages = request.messages.len(), "generate: calling model");
                match next(request).await {
                    Ok(response) => {
                        info!(
                            chars = response.text.len(),
                            total_tokens = response.usage.total_tokens,
                            "generate: completed"
                        );
                        Ok(response)
                    }
                    Err(e) => {
                        error!(error = %e, "generate: failed");
                        Err(e)
                    }
                }
            })
        })
    }

    fn wrap_stream(&self, next: Arc<StreamFn>) -> Arc<StreamFn> {
        Arc::new(move |request| {
            let next = next.clone();
            Box::pin(async move {
                debug!(messages = request.messages.len(), "stream: calling model");
                let inner = next(request).await?;
                let logged = async_stream::stream! {
                    let mut deltas = 0u32;
                    let mut inner = std::pin::pin!(inner);
                    while let Some(item) = inner.next().await {
                        match item {
                            Ok(delta) => {
                                deltas += 1;
                                if delta.is_done() {
                                    info!(deltas, "stream: completed");
                                }
                                yield Ok(delta);
                            }
                            Err(e) => {
                                error!(error = %e, "stream: failed");
                                yield Err(e);
                            }
                        }
                    }
                };
                let logged: crate::provider::TextStream = Box::pin(logged);
                Ok(logged)
            })
        })
    }
}

/// Fills unset sampling parameters with configured defaults.
#[derive(Clone, Default)]
pub struct DefaultSettingsStage {
    pub defaults: GenerationSettings,
}

impl DefaultSettingsStage {
    pub fn new(defaults: GenerationSettings) -> Self {
        Self { defaults }
    }
}

impl Middleware for DefaultSettingsStage {
    fn transform_params(&self, mut request: GenerateRequest) -> GenerateRequest {
        let settings = &mut request.settings;
        settings.max_tokens = settings.max_tokens.or(self.defaults.max_tokens);
        settings.temperature = settings.temperature.or(self.defaults.temperature);
        settings.top_p = settings.top_p.or(self.defaults.top_p);
        settings.top_k = settings.top_k.or(self.defaults.top_k);
        request
    }
}

/// Guardrail scrubbing configured patterns from outgoing message text.
pub struct RedactionStage {
    patterns: Vec<Regex>,
    replacement: String,
}

impl RedactionStage {
    pub fn new(patterns: Vec<Regex>, replacement: impl Into<String>) -> Self {
        Self {
            patterns,
            replacement: replacement.into(),
        }
    }
}

impl Middleware for RedactionStage {
    fn transform_params(&self, mut request: GenerateRequest) -> GenerateRequest {
        for message in &mut request.messages {
            for part in &mut message.content {
                if let ContentPart::Text { text } = part {
                    for pattern in &self.patterns {
                        if pattern.is_match(text) {
                            *text = pattern
                                .replace_all(text, self.replacement.as_str())
                                .into_owned();
                        }
                    }
                }
            }
        }
        request
    }
}

const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Bounded in-memory cache for identical generate requests. Least recently
/// used entries are evicted past capacity. Streams are never cached.
pub struct GenerateCacheStage {
    inner: Arc<Mutex<CacheInner>>,
}

struct CacheInner {
    map: HashMap<String, GenerateResponse>,
    order: VecDeque<String>,
    capacity: usize,
}

impl CacheInner {
    fn get(&mut self, key: &str) -> Option<GenerateResponse> {
        let hit = self.map.get(key).cloned()?;
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
        Some(hit)
    }

    fn insert(&mut self, key: String, response: GenerateResponse) {
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            }
        }
        if self.map.insert(key.clone(), response).is_none() {
            self.order.push_back(key);
        }
    }
}

impl Default for GenerateCacheStage {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl GenerateCacheStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` responses.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            })),
        }
    }

    /// Number of cached responses.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache key from message roles/text and settings. Timestamps are
    /// deliberately excluded so identical prompts hit the same entry.
    fn cache_key(request: &GenerateRequest) -> String {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role, "text": m.text()}))
            .collect();
        serde_json::json!({
            "messages": messages,
            "settings": request.settings,
        })
        .to_string()
    }
}

impl Middleware for GenerateCacheStage {
    fn wrap_generate(&self, next: Arc<GenerateFn>) -> Arc<GenerateFn> {
        let inner = self.inner.clone();
        Arc::new(move |request| {
            let next = next.clone();
            let inner = inner.clone();
            Box::pin(async move {
                let key = Self::cache_key(&request);
                if let Some(hit) = inner.lock().expect("cache lock poisoned").get(&key) {
                    debug!("generate: cache hit");
                    return Ok(hit);
                }
                let response = next(request).await?;
                inner
                    .lock()
                    .expect("cache lock poisoned")
                    .insert(key, response.clone());
                Ok(response)
            })
        })
    }
}
