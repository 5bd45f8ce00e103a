//! Model invocation capability.
//!
//! This module provides the `ModelProvider` trait (Adapter Pattern), the
//! command and mock adapters, and the `ProviderManager` that routes model
//! ids to providers.

pub mod adapters;
pub mod base;
pub mod command_executor;
pub mod factory;
pub mod manager;
pub mod provider_kind;

pub use adapters::{CommandProvider, MockProvider};
pub use base::{ModelError, ModelProvider, ModelRequest, ModelResponse};
pub use factory::ProviderFactory;
pub use manager::ProviderManager;
pub use provider_kind::{MockBehavior, ProviderKind};
