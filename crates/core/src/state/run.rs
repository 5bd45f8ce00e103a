//! Run state machine.
//!
//! These functions are the only place a [`Run`]'s status changes. Each
//! transition is reported on the run's event channel.

use crate::engine::error::EngineError;
use chrono::Utc;
use sk_protocol::ipc::Event;
use sk_protocol::run_models::{Run, RunStatus, TokenUsage};
use std::collections::BTreeMap;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

/// Create a new Run with Pending status.
///
/// # Arguments
///
/// * `sequence_id` - The sequence being executed
/// * `sequence_name` - Its name, kept for display after the sequence changes
/// * `total_blocks` - Number of blocks the run will execute
pub fn create_run(sequence_id: Uuid, sequence_name: String, total_blocks: usize) -> Run {
    Run {
        id: Uuid::new_v4(),
        sequence_id,
        sequence_name,
        status: RunStatus::Pending,
        current_block_index: 0,
        total_blocks,
        progress_percentage: 0.0,
        error_message: None,
        failure_kind: None,
        failed_block_id: None,
        model_override: None,
        input_overrides: BTreeMap::new(),
        results_summary: BTreeMap::new(),
        logs: Vec::new(),
        rerun_of: None,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        total_execution_time_ms: 0,
        total_token_usage: TokenUsage::default(),
        total_cost_estimate: 0.0,
    }
}

async fn emit_status(run: &Run, events_tx: &Sender<Event>) {
    let _ = events_tx
        .send(Event::RunStatusUpdate {
            run_id: run.id,
            status: run.status,
            block_index: run.current_block_index,
            progress_percentage: run.progress_percentage,
        })
        .await;
}

fn progress(run: &Run) -> f64 {
    if run.total_blocks == 0 {
        100.0
    } else {
        run.current_block_index as f64 / run.total_blocks as f64 * 100.0
    }
}

/// Transition the run to Running and emit a status update.
pub async fn start_run(run: &mut Run, events_tx: &Sender<Event>) {
    run.status = RunStatus::Running;
    run.started_at = Some(Utc::now());
    if run.total_blocks > 0 {
        run.progress_percentage = progress(run);
    }
    emit_status(run, events_tx).await;
}

/// Record one more finished block and emit the new progress.
pub async fn advance_block(run: &mut Run, events_tx: &Sender<Event>) {
    run.current_block_index = (run.current_block_index + 1).min(run.total_blocks);
    run.progress_percentage = progress(run);
    emit_status(run, events_tx).await;
}

/// Mark the run as completed and emit events.
///
/// Progress is always 100 afterwards, including for a run with no blocks.
pub async fn complete_run(run: &mut Run, events_tx: &Sender<Event>) {
    run.status = RunStatus::Completed;
    run.current_block_index = run.total_blocks;
    run.progress_percentage = 100.0;
    run.completed_at = Some(Utc::now());
    emit_status(run, events_tx).await;
    let _ = events_tx.send(Event::RunCompleted { run_id: run.id }).await;
}

/// Mark the run as failed and emit error events.
///
/// # Arguments
///
/// * `run` - The run to fail
/// * `events_tx` - Channel to send error events
/// * `error` - The failure, whose kind is recorded on the run
/// * `block_id` - The block that failed, if the failure belongs to one
pub async fn fail_run(
    run: &mut Run,
    events_tx: &Sender<Event>,
    error: &EngineError,
    block_id: Option<Uuid>,
) {
    run.status = RunStatus::Failed;
    run.error_message = Some(error.to_string());
    run.failure_kind = Some(error.kind());
    run.failed_block_id = block_id;
    run.completed_at = Some(Utc::now());
    emit_status(run, events_tx).await;
    let _ = events_tx
        .send(Event::RunError {
            run_id: run.id,
            kind: error.kind(),
            error: error.to_string(),
        })
        .await;
}

/// Append a log message to the run logs and emit it.
pub async fn log_to_run(run: &mut Run, events_tx: &Sender<Event>, message: String) {
    run.logs.push(message.clone());
    let _ = events_tx
        .send(Event::RunLogChunk {
            run_id: run.id,
            content: message,
        })
        .await;
}
