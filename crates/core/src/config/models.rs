//! Configuration models that aggregate all settings.
//!
//! This module provides the unified `AppConfig` structure that combines
//! global settings, sequence definitions and global lists into a single
//! configuration object.

use sk_protocol::config_models::GlobalConfig;
use sk_protocol::sequence_models::Sequence;
use sk_protocol::variable_models::GlobalList;
use uuid::Uuid;

/// Unified application configuration loaded from `.sequence-kit/` directory.
///
/// This structure aggregates all configuration sources:
/// - `config.toml`: Global settings
/// - `sequences/*.yaml`: Sequence definitions
/// - `lists/*.yaml`: Global lists
///
/// # Example
///
/// ```rust,no_run
/// use sk_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} sequences and {} lists",
///          config.sequences.len(),
///          config.lists.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Global settings from `config.toml`.
    pub global: GlobalConfig,

    /// All sequence definitions loaded from `sequences/*.yaml`.
    pub sequences: Vec<Sequence>,

    /// All global lists loaded from `lists/*.yaml`.
    pub lists: Vec<GlobalList>,
}

impl AppConfig {
    /// Find a sequence by name, or by id when `key` parses as one.
    pub fn sequence(&self, key: &str) -> Option<&Sequence> {
        let id = Uuid::parse_str(key).ok();
        self.sequences
            .iter()
            .find(|sequence| sequence.name == key || Some(sequence.id) == id)
    }
}
