//! Provider factory for creating provider instances from configuration.

use crate::providers::adapters::{CommandProvider, MockProvider};
use crate::providers::base::ModelProvider;
use crate::providers::manager::ProviderManager;
use crate::providers::provider_kind::{MockBehavior, ProviderKind};
use anyhow::{bail, Result};
use sk_protocol::config_models::{GlobalConfig, ProviderProfile};
use std::sync::Arc;

/// Name under which the built-in mock provider is always registered.
pub const MOCK_PROVIDER_NAME: &str = "mock";

/// Factory for creating provider instances based on configuration.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider instance from a profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile has no name or an empty command.
    ///
    /// # Examples
    ///
    /// ```
    /// use sk_core::providers::ProviderFactory;
    /// use sk_protocol::config_models::ProviderProfile;
    ///
    /// let profile = ProviderProfile {
    ///     name: "claude".to_string(),
    ///     command: "claude".to_string(),
    ///     args: vec!["--model".to_string(), "{model}".to_string(), "-p".to_string()],
    ///     model_prefixes: vec!["claude".to_string()],
    ///     timeout_secs: Some(120),
    /// };
    ///
    /// let provider = ProviderFactory::create(&profile).unwrap();
    /// ```
    pub fn create(profile: &ProviderProfile) -> Result<Arc<dyn ModelProvider>> {
        if profile.name.trim().is_empty() {
            bail!("provider profile has an empty name");
        }
        if profile.command.trim().is_empty() {
            bail!("provider profile '{}' has an empty command", profile.name);
        }

        let provider: Arc<dyn ModelProvider> = match ProviderKind::from_profile(profile) {
            ProviderKind::Command => Arc::new(CommandProvider::new(profile.clone())),
            ProviderKind::Mock(MockBehavior::Echo) => Arc::new(MockProvider::echo()),
            ProviderKind::Mock(MockBehavior::Fail) => Arc::new(MockProvider::failing()),
            ProviderKind::Mock(MockBehavior::Unavailable) => Arc::new(MockProvider::unavailable()),
        };

        Ok(provider)
    }

    /// Build a manager holding every configured profile.
    ///
    /// Each profile is routed by its `model_prefixes`. An echoing mock
    /// provider is always registered under [`MOCK_PROVIDER_NAME`] and routed
    /// by the `mock` prefix unless a profile takes that name.
    pub fn manager_from_config(config: &GlobalConfig) -> Result<ProviderManager> {
        let mut manager = ProviderManager::new();

        for profile in &config.providers {
            if manager.has_provider(&profile.name) {
                bail!("provider '{}' is defined more than once", profile.name);
            }
            manager.register(profile.name.clone(), Self::create(profile)?);
            for prefix in &profile.model_prefixes {
                manager.route_prefix(prefix.clone(), profile.name.clone());
            }
        }

        if !manager.has_provider(MOCK_PROVIDER_NAME) {
            manager.register(MOCK_PROVIDER_NAME, Arc::new(MockProvider::echo()));
            manager.route_prefix(MOCK_PROVIDER_NAME, MOCK_PROVIDER_NAME);
        }

        Ok(manager)
    }
}
