//! Common test utilities and helpers for integration tests.
//!
//! This module provides shared functionality across all integration tests:
//! - Test fixtures (sequences, blocks, projects on disk)
//! - Mock providers beyond the bundled `MockProvider`
//! - Custom assertions over events and runs

pub mod assertions;
pub mod fixtures;
pub mod mock_providers;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_providers::*;
