//! Generation settings and related enums.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Settings controlling text generation.
///
/// All fields are optional; providers omit unset fields from their request
/// bodies. `timeout_ms` is forwarded to the provider HTTP call and is not
/// enforced by the dispatch layer itself.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub seed: Option<u64>,
    pub user: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}
