//! Run state management.
//!
//! This module provides:
//! - The run state machine functions
//! - RunManager for coordinating concurrent runs

pub mod manager;
pub mod run;

pub use manager::RunManager;
