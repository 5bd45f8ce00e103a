//! # sk-protocol
//!
//! Core protocol definitions and data models for sequence-kit.
//!
//! This crate defines all shared data structures used for:
//! - Configuration file parsing (YAML sequences and lists, TOML config)
//! - Run and block-run records produced by the execution engine
//! - The event stream the engine reports progress through
//!
//! ## Modules
//!
//! - [`sequence_models`]: Sequence definitions and chunking settings
//! - [`block_models`]: Blocks, block types and per-type configuration
//! - [`variable_models`]: Variables, values (scalar/list/matrix) and global lists
//! - [`run_models`]: Runs, block runs and their status
//! - [`config_models`]: Global configuration from config.toml
//! - [`ipc`]: Events emitted by the engine while a run progresses
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, uuid and chrono
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other sequence-kit crates

pub mod block_models;
pub mod config_models;
pub mod ipc;
pub mod run_models;
pub mod sequence_models;
pub mod variable_models;

// Re-export all public types for convenience
pub use block_models::*;
pub use config_models::*;
pub use ipc::*;
pub use run_models::*;
pub use sequence_models::*;
pub use variable_models::*;
