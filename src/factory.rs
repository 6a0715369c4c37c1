//! The model handle factory: the public entry point of the crate.

use std::sync::Arc;

use crate::config::TychoConfig;
use crate::error::Result;
use crate::middleware::{self, Middleware};
use crate::provider::LanguageModel;
use crate::registry::ProviderRegistry;

/// Turns model identifiers into ready-to-call, middleware-wrapped handles.
///
/// Holds the registry and the ordered stage list it was constructed with and
/// nothing else; two calls with the same identifier produce functionally
/// equivalent fresh handles.
pub struct ModelFactory {
    registry: ProviderRegistry,
    stages: Vec<Arc<dyn Middleware>>,
}

impl ModelFactory {
    /// Create a factory over an explicit registry with an empty chain.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            stages: Vec::new(),
        }
    }

    /// Built-in registry configured from the environment, empty chain.
    pub fn from_env() -> Self {
        Self::new(ProviderRegistry::builtin(&TychoConfig::from_env()))
    }

    /// Append a middleware stage. Earlier stages wrap outside later ones.
    pub fn with_stage(mut self, stage: Arc<dyn Middleware>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append several middleware stages in order.
    pub fn with_stages(mut self, stages: impl IntoIterator<Item = Arc<dyn Middleware>>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Resolve an identifier and wrap the result in the configured chain.
    ///
    /// Resolution and wrapping failures surface here, synchronously; network
    /// I/O happens only when the returned handle is invoked.
    pub fn get_model(&self, identifier: &str) -> Result<Arc<dyn LanguageModel>> {
        let model = self.registry.resolve(identifier)?;
        Ok(middleware::wrap(model, self.stages.clone()))
    }
}
