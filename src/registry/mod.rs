//! Provider registry and identifier resolution.
//!
//! An identifier is either `tag:backend-model-id` or a bare backend model ID.
//! Tags form a closed set (`ProviderTag`); matching is a prefix test against
//! `tag:` evaluated in registration order, first match wins. Anything that
//! matches no tag goes whole to the designated default entry. Resolution does
//! no network I/O; it only runs the selected entry's constructor.

use std::sync::Arc;

use strum::{Display, EnumString};

use crate::config::TychoConfig;
use crate::error::{Result, TychoError};
use crate::provider::anthropic::AnthropicModel;
use crate::provider::google::GoogleModel;
use crate::provider::ollama::OllamaModel;
use crate::provider::openai::OpenAiModel;
use crate::provider::LanguageModel;

/// Separator between a namespace tag and the backend-specific model ID.
pub const TAG_DELIMITER: char = ':';

/// Closed set of provider namespace tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderTag {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
}

impl ProviderTag {
    /// Tag string as it appears in identifiers.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Ollama => "ollama",
        }
    }

    /// Strip `tag:` from the identifier if it matches this tag.
    fn strip(&self, identifier: &str) -> Option<usize> {
        let tag = self.as_str();
        let rest = identifier.strip_prefix(tag)?;
        if rest.starts_with(TAG_DELIMITER) {
            Some(tag.len() + TAG_DELIMITER.len_utf8())
        } else {
            None
        }
    }
}

/// Outcome of matching an identifier against the registered tags.
///
/// The no-match case is an explicit variant, not a fallthrough: every
/// resolution lands in exactly one of these two arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// A registered tag matched; `model_id` is the identifier with the
    /// `tag:` prefix removed.
    Tagged {
        tag: ProviderTag,
        model_id: &'a str,
    },
    /// No tag matched; the whole identifier goes to the default entry.
    Default { model_id: &'a str },
}

/// Constructor producing a callable model from a backend-specific model ID.
pub type ConstructorFn = dyn Fn(&str) -> Result<Arc<dyn LanguageModel>> + Send + Sync;

struct ProviderEntry {
    tag: ProviderTag,
    construct: Arc<ConstructorFn>,
}

/// Ordered provider entries plus a designated default.
///
/// Entry order is match priority order. The registry is assembled once at
/// startup and never mutated afterwards.
pub struct ProviderRegistry {
    entries: Vec<ProviderEntry>,
    default: Arc<ConstructorFn>,
}

impl ProviderRegistry {
    /// Create a registry with only a default (catch-all) constructor.
    pub fn new<F>(default: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn LanguageModel>> + Send + Sync + 'static,
    {
        Self {
            entries: Vec::new(),
            default: Arc::new(default),
        }
    }

    /// Register a tagged entry. Entries match in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the tag is already registered; tags are unique by invariant.
    pub fn register<F>(mut self, tag: ProviderTag, construct: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn LanguageModel>> + Send + Sync + 'static,
    {
        assert!(
            !self.entries.iter().any(|e| e.tag == tag),
            "duplicate provider tag: {tag}"
        );
        self.entries.push(ProviderEntry {
            tag,
            construct: Arc::new(construct),
        });
        self
    }

    /// Registered tags in match priority order.
    pub fn tags(&self) -> Vec<ProviderTag> {
        self.entries.iter().map(|e| e.tag).collect()
    }

    /// Match an identifier against the registered tags.
    ///
    /// Pure function of the identifier and the registry: first registered tag
    /// whose `tag:` prefixes the identifier wins.
    pub fn resolution<'a>(&self, identifier: &'a str) -> Resolution<'a> {
        for entry in &self.entries {
            if let Some(offset) = entry.tag.strip(identifier) {
                return Resolution::Tagged {
                    tag: entry.tag,
                    model_id: &identifier[offset..],
                };
            }
        }
        Resolution::Default {
            model_id: identifier,
        }
    }

    /// Resolve an identifier to a bare callable model.
    ///
    /// Constructor errors (e.g. missing credentials) propagate unmodified.
    pub fn resolve(&self, identifier: &str) -> Result<Arc<dyn LanguageModel>> {
        if identifier.is_empty() {
            return Err(TychoError::InvalidArgument(
                "model identifier must be non-empty".into(),
            ));
        }

        for entry in &self.entries {
            if let Some(offset) = entry.tag.strip(identifier) {
                return (entry.construct)(&identifier[offset..]);
            }
        }
        (self.default)(identifier)
    }

    /// The built-in registry: openai, anthropic, google, and ollama entries,
    /// with the openai family as the catch-all default.
    pub fn builtin(config: &TychoConfig) -> Self {
        let openai_from = |config: TychoConfig| {
            move |model_id: &str| -> Result<Arc<dyn LanguageModel>> {
                let api_key = config.get_api_key("openai").ok_or_else(|| {
                    TychoError::Authentication("Missing OPENAI_API_KEY".into())
                })?;
                Ok(Arc::new(OpenAiModel::new(
                    model_id,
                    api_key,
                    config.get_base_url("openai"),
                )))
            }
        };

        let anthropic = {
            let config = config.clone();
            move |model_id: &str| -> Result<Arc<dyn LanguageModel>> {
                let api_key = config.get_api_key("anthropic").ok_or_else(|| {
                    TychoError::Authentication("Missing ANTHROPIC_API_KEY".into())
                })?;
                Ok(Arc::new(AnthropicModel::new(
                    model_id,
                    api_key,
                    config.get_base_url("anthropic"),
                )))
            }
        };

        let google = {
            let config = config.clone();
            move |model_id: &str| -> Result<Arc<dyn LanguageModel>> {
                let api_key = config.get_api_key("google").ok_or_else(|| {
                    TychoError::Authentication("Missing GOOGLE_API_KEY".into())
                })?;
                Ok(Arc::new(GoogleModel::new(
                    model_id,
                    api_key,
                    config.get_base_url("google"),
                )))
            }
        };

        let ollama = {
            let config = config.clone();
            move |model_id: &str| -> Result<Arc<dyn LanguageModel>> {
                Ok(Arc::new(OllamaModel::new(
                    model_id,
                    config.get_base_url("ollama"),
                )))
            }
        };

        Self::new(openai_from(config.clone()))
            .register(ProviderTag::OpenAi, openai_from(config.clone()))
            .register(ProviderTag::Anthropic, anthropic)
            .register(ProviderTag::Google, google)
            .register(ProviderTag::Ollama, ollama)
    }
}
