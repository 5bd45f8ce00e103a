//! Configuration loading and management.
//!
//! This module provides functionality to load and parse all configuration files
//! from the `.sequence-kit/` directory structure.

pub mod error;
pub mod loader;
pub mod models;

pub use error::{LoadError, LoadResult};
pub use loader::load_config;
pub use models::AppConfig;
