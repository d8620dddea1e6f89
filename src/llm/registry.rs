use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::errors::{VirtuosError, VirtuosResult};
use crate::llm::provider::DecisionOracle;
use crate::llm::providers::openai_compatible::OpenAiCompatibleOracle;

/// Registry of configured decision oracles, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn DecisionOracle>>,
    active: String,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn DecisionOracle>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> VirtuosResult<Arc<dyn DecisionOracle>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            VirtuosError::Config(format!(
                "Active provider '{}' not found in registry",
                self.active
            ))
        })
    }

    pub fn set_active(&mut self, name: String) -> VirtuosResult<()> {
        if self.providers.contains_key(&name) {
            self.active = name;
            Ok(())
        } else {
            Err(VirtuosError::Config(format!("Provider '{name}' not registered")))
        }
    }

    pub fn active_name(&self) -> &str {
        &self.active
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a registry from the loaded app config.
    /// API keys come from `VIRTUOS_<ID>_API_KEY`, falling back to config.toml.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new(config.llm.active_provider.clone());
        let timeout = Duration::from_secs(config.llm.request_timeout_secs.max(1));
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(api_key_var(id))
                .ok()
                .filter(|k| !k.is_empty())
                .or_else(|| entry.api_key.clone())
                .unwrap_or_default();
            if api_key.is_empty() {
                tracing::warn!(provider = %id, "no API key configured");
            }
            let provider = OpenAiCompatibleOracle::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
                entry.model.clone(),
                entry.temperature,
                timeout,
            );
            tracing::debug!(provider = %id, model = %entry.model, "oracle registered");
            registry.register(Arc::new(provider));
        }
        registry
    }
}

fn api_key_var(id: &str) -> String {
    let id: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("VIRTUOS_{id}_API_KEY")
}
