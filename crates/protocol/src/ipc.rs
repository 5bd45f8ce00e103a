//! Engine event protocol.
//!
//! While a run executes, the engine reports every state change through a
//! channel of [`Event`]s so a caller (CLI, service, UI) can follow progress
//! without polling the store.
//!
//! Uses tagged enum serialization for TypeScript compatibility:
//! ```json
//! {
//!   "type": "runStatusUpdate",
//!   "payload": {
//!     "run_id": "uuid-here",
//!     "status": "running",
//!     "block_index": 2,
//!     "progress_percentage": 50.0
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::run_models::{FailureKind, RunStatus};

/// Events sent from the engine to its caller.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A new run has been created.
    RunStarted {
        #[ts(type = "string")]
        run_id: Uuid,
        sequence_name: String,
    },

    /// A run's status or progress has changed.
    RunStatusUpdate {
        #[ts(type = "string")]
        run_id: Uuid,
        status: RunStatus,
        block_index: usize,
        progress_percentage: f64,
    },

    /// A block is about to be dispatched.
    BlockStarted {
        #[ts(type = "string")]
        run_id: Uuid,
        #[ts(type = "string")]
        block_id: Uuid,
        block_name: String,
        block_index: usize,
    },

    /// A block run record has been persisted.
    BlockRunRecorded {
        #[ts(type = "string")]
        run_id: Uuid,
        #[ts(type = "string")]
        block_id: Uuid,
        #[ts(type = "string")]
        block_run_id: Uuid,
        status: RunStatus,
    },

    /// A run has produced new log output.
    RunLogChunk {
        #[ts(type = "string")]
        run_id: Uuid,
        content: String,
    },

    /// A run has completed successfully.
    RunCompleted {
        #[ts(type = "string")]
        run_id: Uuid,
    },

    /// A run has failed or was cancelled.
    RunError {
        #[ts(type = "string")]
        run_id: Uuid,
        kind: FailureKind,
        error: String,
    },
}

impl Event {
    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::RunStatusUpdate { run_id, .. }
            | Self::BlockStarted { run_id, .. }
            | Self::BlockRunRecorded { run_id, .. }
            | Self::RunLogChunk { run_id, .. }
            | Self::RunCompleted { run_id }
            | Self::RunError { run_id, .. } => *run_id,
        }
    }

    /// Whether this event ends a run's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. } | Self::RunError { .. })
    }
}
