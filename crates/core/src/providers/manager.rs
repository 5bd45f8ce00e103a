//! Provider manager for routing model ids to providers.
//!
//! The `ProviderManager` is responsible for:
//! - Registering provider instances by name
//! - Routing a model id to a provider (exact id, then longest prefix)
//! - Falling back to another provider when the routed one is unavailable

use crate::providers::base::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Manages all registered providers and implements model routing.
///
/// The manager is itself a [`ModelProvider`], so the engine never needs to
/// know how many backends exist.
#[derive(Default, Clone)]
pub struct ProviderManager {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    models: HashMap<String, String>,
    prefixes: Vec<(String, String)>,
    fallback_provider_name: Option<String>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under a name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn ModelProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Route one exact model id to a provider.
    pub fn route_model(&mut self, model: impl Into<String>, provider_name: impl Into<String>) {
        self.models.insert(model.into().to_lowercase(), provider_name.into());
    }

    /// Route every model id starting with `prefix` (case-insensitive) to a provider.
    pub fn route_prefix(&mut self, prefix: impl Into<String>, provider_name: impl Into<String>) {
        self.prefixes
            .push((prefix.into().to_lowercase(), provider_name.into()));
    }

    /// Set the provider to use when the routed one is missing or unavailable.
    ///
    /// # Arguments
    ///
    /// * `provider_name` - The name of a registered provider
    pub fn with_fallback(mut self, provider_name: impl Into<String>) -> Self {
        self.fallback_provider_name = Some(provider_name.into());
        self
    }

    pub fn get_provider(&self, name: &str) -> Option<Arc<dyn ModelProvider>> {
        self.providers.get(name).cloned()
    }

    /// Name of the provider a model id routes to, ignoring availability.
    pub fn route(&self, model: &str) -> Option<&str> {
        let model = model.to_lowercase();

        if let Some(name) = self.models.get(&model) {
            return Some(name.as_str());
        }

        self.prefixes
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, name)| name.as_str())
    }

    /// List all registered provider names.
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    async fn try_fallback(
        &self,
        routed: Option<&str>,
        request: &ModelRequest,
    ) -> Option<Result<ModelResponse, ModelError>> {
        let fallback_name = self.fallback_provider_name.as_deref()?;
        if Some(fallback_name) == routed {
            return None;
        }

        let fallback = self.get_provider(fallback_name)?;
        if !fallback.check_availability().await {
            return None;
        }

        warn!(model = %request.model, fallback = fallback_name, "using fallback provider");
        Some(fallback.invoke(request).await)
    }
}

#[async_trait]
impl ModelProvider for ProviderManager {
    async fn check_availability(&self) -> bool {
        for provider in self.providers.values() {
            if provider.check_availability().await {
                return true;
            }
        }
        false
    }

    /// # Behavior
    ///
    /// 1. Route the model id to a provider
    /// 2. Check that it is available
    /// 3. If not (or nothing matched) and a fallback is configured, use the fallback
    /// 4. Invoke the selected provider
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let routed = self.route(&request.model);

        if let Some(name) = routed {
            if let Some(provider) = self.get_provider(name) {
                if provider.check_availability().await {
                    debug!(model = %request.model, provider = name, "routing model call");
                    return provider.invoke(request).await;
                }
            }
        }

        if let Some(result) = self.try_fallback(routed, request).await {
            return result;
        }

        match routed {
            Some(name) => Err(ModelError::NotAvailable(format!(
                "Provider '{name}' for model '{}' is not available and no fallback succeeded",
                request.model
            ))),
            None => Err(ModelError::NotAvailable(format!(
                "No provider configured for model '{}'",
                request.model
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::adapters::MockProvider;

    fn manager() -> ProviderManager {
        let mut manager = ProviderManager::new();
        manager.register("claude", Arc::new(MockProvider::fixed("from claude")));
        manager.register("local", Arc::new(MockProvider::fixed("from local")));
        manager.register("down", Arc::new(MockProvider::unavailable()));
        manager.route_prefix("claude", "claude");
        manager.route_prefix("claude-3-opus", "local");
        manager.route_model("special", "local");
        manager.route_prefix("offline", "down");
        manager
    }

    #[test]
    fn test_route_exact_then_longest_prefix() {
        let manager = manager();

        assert_eq!(manager.route("Special"), Some("local"));
        assert_eq!(manager.route("claude-3-haiku"), Some("claude"));
        assert_eq!(manager.route("claude-3-opus-2024"), Some("local"));
        assert_eq!(manager.route("gpt-4"), None);
    }

    #[test]
    fn test_list_providers() {
        let manager = manager();
        assert_eq!(manager.list_providers(), vec!["claude", "down", "local"]);
        assert!(manager.has_provider("claude"));
        assert!(!manager.has_provider("gemini"));
    }

    #[tokio::test]
    async fn test_invoke_routes_to_provider() {
        let manager = manager();
        let response = manager
            .invoke(&ModelRequest::new("claude-3-haiku", "hi"))
            .await
            .unwrap();
        assert_eq!(response.text, "from claude");
    }

    #[tokio::test]
    async fn test_invoke_unrouted_model_fails() {
        let manager = manager();
        let result = manager.invoke(&ModelRequest::new("gpt-4", "hi")).await;
        assert!(matches!(result, Err(ModelError::NotAvailable(msg)) if msg.contains("No provider")));
    }

    #[tokio::test]
    async fn test_invoke_unavailable_without_fallback() {
        let manager = manager();
        let result = manager.invoke(&ModelRequest::new("offline-1", "hi")).await;
        assert!(matches!(result, Err(ModelError::NotAvailable(_))));
    }

    #[tokio::test]
    async fn test_invoke_uses_fallback() {
        let manager = manager().with_fallback("local");

        let response = manager
            .invoke(&ModelRequest::new("offline-1", "hi"))
            .await
            .unwrap();
        assert_eq!(response.text, "from local");

        let response = manager.invoke(&ModelRequest::new("gpt-4", "hi")).await.unwrap();
        assert_eq!(response.text, "from local");
    }
}
