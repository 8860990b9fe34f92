//! Provider registry: builds the fixed provider pair from configuration.

use std::sync::Arc;

use crate::adapters::providers::http::{HttpProviderConfig, HttpResearchProvider};
use crate::adapters::providers::mock::MockProvider;
use crate::domain::models::{ProviderKind, ProvidersConfig};
use crate::domain::ports::ResearchProvider;

/// Registry of the two configured providers.
pub struct ProviderRegistry {
    config: ProvidersConfig,
}

impl ProviderRegistry {
    pub fn new(config: ProvidersConfig) -> Self {
        Self { config }
    }

    /// Build the adapter for one provider. An empty base URL selects the
    /// in-process mock, which keeps local development working without
    /// upstream credentials.
    pub fn create(&self, kind: ProviderKind) -> Arc<dyn ResearchProvider> {
        let (name, config) = match kind {
            ProviderKind::Primary => ("primary", &self.config.primary),
            ProviderKind::Secondary => ("secondary", &self.config.secondary),
        };

        if config.base_url.trim().is_empty() {
            return Arc::new(MockProvider::new(name));
        }

        match HttpResearchProvider::new(name, HttpProviderConfig::from_provider_config(config)) {
            Ok(provider) => Arc::new(provider),
            Err(err) => {
                tracing::warn!(provider = name, error = %err, "falling back to mock provider");
                Arc::new(MockProvider::new(name))
            }
        }
    }

    /// Both adapters, primary first.
    pub fn pair(&self) -> (Arc<dyn ResearchProvider>, Arc<dyn ResearchProvider>) {
        (self.create(ProviderKind::Primary), self.create(ProviderKind::Secondary))
    }
}
