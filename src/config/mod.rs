//! Configuration for provider credentials and endpoints.
//!
//! `TychoConfig` is plain data handed to the registry at construction time.
//! Nothing in the resolution path reads ambient process state; `from_env` is
//! the one place environment variables are consulted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Per-provider API keys and base-URL overrides.
#[derive(Debug, Clone, Default)]
pub struct TychoConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
}

impl TychoConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables, reading a `.env` file if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let config = Self::new();

        let key_mappings = [
            ("OPENAI_API_KEY", "openai"),
            ("ANTHROPIC_API_KEY", "anthropic"),
            ("GOOGLE_API_KEY", "google"),
            ("GEMINI_API_KEY", "google"),
        ];
        for (env_var, provider) in &key_mappings {
            if let Ok(key) = std::env::var(env_var) {
                config.set_api_key(provider, key);
            }
        }

        let url_mappings = [
            ("OPENAI_BASE_URL", "openai"),
            ("ANTHROPIC_BASE_URL", "anthropic"),
            ("GOOGLE_BASE_URL", "google"),
            ("OLLAMA_BASE_URL", "ollama"),
        ];
        for (env_var, provider) in &url_mappings {
            if let Ok(url) = std::env::var(env_var) {
                config.set_base_url(provider, url);
            }
        }

        config
    }

    /// Set an API key for a provider.
    pub fn set_api_key(&self, provider: &str, key: String) {
        self.api_keys
            .write()
            .expect("api_keys lock poisoned")
            .insert(provider.to_string(), key);
    }

    /// Get the API key for a provider.
    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys
            .read()
            .expect("api_keys lock poisoned")
            .get(provider)
            .cloned()
    }

    /// Set a base-URL override for a provider.
    pub fn set_base_url(&self, provider: &str, url: String) {
        self.base_urls
            .write()
            .expect("base_urls lock poisoned")
            .insert(provider.to_string(), url);
    }

    /// Get the base-URL override for a provider.
    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls
            .read()
            .expect("base_urls lock poisoned")
            .get(provider)
            .cloned()
    }
}
