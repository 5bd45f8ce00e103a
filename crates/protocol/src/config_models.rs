//! Global configuration models for `.sequence-kit/config.toml`.
//!
//! This module defines the structure of the global configuration file that
//! controls project-wide settings for sequence-kit.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

/// Represents global settings from `.sequence-kit/config.toml`.
///
/// # Example
///
/// ```toml
/// # .sequence-kit/config.toml
/// default_model = "claude-3-haiku"
/// max_concurrency = 4
///
/// [[providers]]
/// name = "claude"
/// command = "claude"
/// args = ["--model", "{model}", "-p", "{prompt}"]
/// model_prefixes = ["claude"]
/// timeout_secs = 120
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct GlobalConfig {
    /// Model used when neither the block, the run nor the sequence names one.
    #[serde(default)]
    pub default_model: Option<String>,

    /// Upper bound on concurrent model calls issued by one fan-out block.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Command-line model providers.
    #[serde(default)]
    pub providers: Vec<ProviderProfile>,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            max_concurrency: default_max_concurrency(),
            providers: Vec::new(),
        }
    }
}

/// A model provider reached by spawning a command.
///
/// `{model}` and `{prompt}` placeholders in `args` are replaced per call.
/// When no argument mentions `{prompt}`, the prompt is written to stdin.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ProviderProfile {
    pub name: String,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Model ids starting with any of these prefixes are routed here.
    #[serde(default)]
    pub model_prefixes: Vec<String>,

    #[serde(default)]
    #[ts(type = "number | null")]
    pub timeout_secs: Option<u64>,
}
