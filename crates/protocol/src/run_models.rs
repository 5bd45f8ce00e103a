//! Runtime run state models.
//!
//! This module defines the records the engine writes while executing a
//! sequence: one [`Run`] per execution and one [`BlockRun`] per model
//! invocation (plus one per block that fails before invoking anything).

use crate::block_models::BlockType;
use crate::variable_models::VariableValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::AddAssign;
use ts_rs::TS;
use uuid::Uuid;

/// Lifecycle status shared by runs and block runs.
///
/// The status progresses through these states during normal execution:
/// Pending -> Running -> Completed
///
/// `Completed` and `Failed` are terminal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but not started yet.
    Pending,

    /// Actively executing.
    Running,

    /// Finished successfully.
    Completed,

    /// Stopped because of an error or a cancellation.
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Classification of the error that failed a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Config,
    UnresolvedVariable,
    IndexOutOfRange,
    TypeMismatch,
    MalformedOutput,
    BlockExecutionFailed,
    Cancelled,
    Persistence,
}

/// Token counts reported by a model provider.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, TS)]
pub struct TokenUsage {
    #[ts(type = "number")]
    pub input: u64,
    #[ts(type = "number")]
    pub output: u64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input += other.input;
        self.output += other.output;
    }
}

/// One execution of a sequence from start to a terminal state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct Run {
    #[ts(type = "string")]
    pub id: Uuid,

    #[ts(type = "string")]
    pub sequence_id: Uuid,

    pub sequence_name: String,

    pub status: RunStatus,

    /// Number of blocks completed so far.
    pub current_block_index: usize,

    pub total_blocks: usize,

    /// `current_block_index / total_blocks`, in percent.
    pub progress_percentage: f64,

    pub error_message: Option<String>,

    pub failure_kind: Option<FailureKind>,

    /// The block that failed the run, when a block did.
    pub failed_block_id: Option<Uuid>,

    /// Model used by every block that does not name its own.
    pub model_override: Option<String>,

    /// Values supplied when the run was started.
    pub input_overrides: BTreeMap<String, VariableValue>,

    /// Outputs of every completed block, by variable name.
    pub results_summary: BTreeMap<String, VariableValue>,

    /// Accumulated log lines for this run.
    pub logs: Vec<String>,

    /// The run this one was re-run from, if any.
    pub rerun_of: Option<Uuid>,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,

    #[ts(type = "string | null")]
    pub started_at: Option<DateTime<Utc>>,

    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,

    #[ts(type = "number")]
    pub total_execution_time_ms: u64,

    pub total_token_usage: TokenUsage,

    pub total_cost_estimate: f64,
}

/// A reviewer's correction of a block run's output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct OutputEdit {
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

/// The record of one model invocation performed while executing a block.
///
/// Block runs are append-only audit records. `edited_output` is the only
/// field that changes after the record is written, and it never replaces
/// `output`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct BlockRun {
    #[ts(type = "string")]
    pub id: Uuid,

    #[ts(type = "string")]
    pub run_id: Uuid,

    #[ts(type = "string")]
    pub block_id: Uuid,

    pub block_name: String,

    pub block_type: BlockType,

    /// Fan-out position: the element index for single-list blocks, one index
    /// per axis for multi-list blocks, empty otherwise.
    pub combination: Vec<usize>,

    /// The fully resolved prompt sent to the model.
    pub input: String,

    /// Raw model response.
    pub output: Option<String>,

    pub edited_output: Option<String>,

    pub edit_history: Vec<OutputEdit>,

    pub status: RunStatus,

    pub error_message: Option<String>,

    #[ts(type = "number")]
    pub execution_time_ms: u64,

    pub token_usage: Option<TokenUsage>,

    pub cost_estimate: Option<f64>,

    #[ts(type = "string")]
    pub started_at: DateTime<Utc>,

    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BlockRun {
    /// The reviewer's edit if there is one, else the raw output.
    pub fn effective_output(&self) -> Option<&str> {
        self.edited_output.as_deref().or(self.output.as_deref())
    }
}
