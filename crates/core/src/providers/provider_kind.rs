//! Provider kind enumeration for determining which adapter to use.

use sk_protocol::config_models::ProviderProfile;

/// Behaviour of a built-in mock provider selected from a profile command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MockBehavior {
    Echo,
    Fail,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Spawn the profile's command for every call.
    Command,
    /// In-process mock, selected with `command = "mock"` or `"mock:<behavior>"`.
    Mock(MockBehavior),
}

impl ProviderKind {
    /// Infer the provider kind from a profile.
    ///
    /// # Examples
    ///
    /// ```
    /// use sk_core::providers::{MockBehavior, ProviderKind};
    /// use sk_protocol::config_models::ProviderProfile;
    ///
    /// let profile = ProviderProfile {
    ///     name: "local".to_string(),
    ///     command: "mock:fail".to_string(),
    ///     args: vec![],
    ///     model_prefixes: vec![],
    ///     timeout_secs: None,
    /// };
    /// assert_eq!(ProviderKind::from_profile(&profile), ProviderKind::Mock(MockBehavior::Fail));
    /// ```
    pub fn from_profile(profile: &ProviderProfile) -> Self {
        let command = profile.command.trim().to_lowercase();

        match command.as_str() {
            "mock" | "mock:echo" => Self::Mock(MockBehavior::Echo),
            "mock:fail" => Self::Mock(MockBehavior::Fail),
            "mock:unavailable" => Self::Mock(MockBehavior::Unavailable),
            _ => Self::Command,
        }
    }

    /// Get a human-readable name for the provider kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Command => "Command",
            Self::Mock(_) => "Mock",
        }
    }
}
