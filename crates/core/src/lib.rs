//! # sk-core
//!
//! Sequence execution engine and run management for sequence-kit.
//!
//! This crate provides:
//! - Configuration loading from `.sequence-kit/` directory
//! - Model provider abstraction and command-line adapters
//! - Sequence execution engine (templates, fan-out, materialization)
//! - Run state management and persistence
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and management
//! - [`providers`]: Model provider trait and adapter implementations
//! - [`engine`]: Sequence execution engine
//! - [`state`]: Run lifecycle and the run manager
//! - [`store`]: Storage of runs, block runs, variables and global lists

pub mod config;
pub mod engine;
pub mod providers;
pub mod state;
pub mod store;
