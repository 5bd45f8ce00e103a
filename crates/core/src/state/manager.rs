//! Run manager for coordinating concurrent sequence runs.
//!
//! The RunManager starts runs in background tasks, keeps a registry of the
//! ones still in flight so they can be cancelled or awaited, and offers the
//! post-run operations: inspecting block runs, editing their outputs and
//! re-running a sequence from a given block.

use crate::engine::block::BlockVariant;
use crate::engine::error::{ConfigError, EngineError};
use crate::engine::materializer::parse_discretized;
use crate::engine::{cancellation_pair, CancellationHandle, RunRequest, SequenceEngine};
use anyhow::{anyhow, Result};
use chrono::Utc;
use sk_protocol::block_models::Block;
use sk_protocol::ipc::Event;
use sk_protocol::run_models::{BlockRun, OutputEdit, Run, RunStatus};
use sk_protocol::variable_models::{Matrix, VariableValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

struct ActiveRun {
    cancel: CancellationHandle,
    /// Taken by the first caller waiting on the run.
    task: Option<JoinHandle<Run>>,
}

impl ActiveRun {
    fn is_running(&self) -> bool {
        self.task.as_ref().map_or(true, |task| !task.is_finished())
    }
}

/// Manages all runs started through it.
pub struct RunManager {
    /// Runs whose task has not been awaited yet, indexed by run id.
    active: Arc<Mutex<HashMap<Uuid, ActiveRun>>>,

    engine: Arc<SequenceEngine>,

    /// Channel every run reports its events on.
    events_tx: mpsc::Sender<Event>,
}

impl RunManager {
    pub fn new(engine: Arc<SequenceEngine>, events_tx: mpsc::Sender<Event>) -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            engine,
            events_tx,
        }
    }

    pub fn engine(&self) -> &Arc<SequenceEngine> {
        &self.engine
    }

    /// Start a run in the background.
    ///
    /// The run is persisted as pending before its task is spawned, so the
    /// returned id can be looked up immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence or the start block does not exist.
    pub async fn start_run(&self, request: RunRequest) -> Result<Uuid> {
        let (run, sequence, span) = self.engine.prepare_run(&request).await?;
        let run_id = run.id;
        let (cancel, token) = cancellation_pair();

        let engine = Arc::clone(&self.engine);
        let events_tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            engine
                .execute(run, &sequence, span, &events_tx, token)
                .await
        });

        let mut active = self.active.lock().await;
        prune_finished(&mut active);
        active.insert(
            run_id,
            ActiveRun {
                cancel,
                task: Some(task),
            },
        );
        info!(%run_id, "run spawned");
        Ok(run_id)
    }

    /// Request cancellation of an active run.
    ///
    /// Model calls already in flight finish; nothing new is dispatched.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not active.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<()> {
        let mut active = self.active.lock().await;
        prune_finished(&mut active);
        match active.get(&run_id) {
            Some(entry) if entry.is_running() => {
                entry.cancel.cancel();
                debug!(%run_id, "cancellation requested");
                Ok(())
            }
            _ => Err(anyhow!("Run {} is not active", run_id)),
        }
    }

    /// Wait for a run to reach a terminal state and return it.
    ///
    /// The run stays cancellable while it is awaited. Runs that are no
    /// longer active, or already awaited elsewhere, are read from the store.
    pub async fn wait_for_run(&self, run_id: Uuid) -> Result<Run> {
        let task = self
            .active
            .lock()
            .await
            .get_mut(&run_id)
            .and_then(|entry| entry.task.take());
        match task {
            Some(task) => {
                let result = task.await;
                self.active.lock().await.remove(&run_id);
                result.map_err(|e| anyhow!("Run {} task failed: {}", run_id, e))
            }
            None => Ok(self.get_run(run_id).await?),
        }
    }

    /// Ids of runs whose task is still executing.
    pub async fn active_runs(&self) -> Vec<Uuid> {
        let mut active = self.active.lock().await;
        prune_finished(&mut active);
        active.keys().copied().collect()
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<Run, EngineError> {
        self.engine
            .store()
            .get_run(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))
    }

    pub async fn list_runs(&self, sequence_id: Option<Uuid>) -> Result<Vec<Run>, EngineError> {
        Ok(self.engine.store().list_runs(sequence_id).await?)
    }

    pub async fn get_block_run(&self, block_run_id: Uuid) -> Result<BlockRun, EngineError> {
        self.engine
            .store()
            .get_block_run(block_run_id)
            .await?
            .ok_or(EngineError::BlockRunNotFound(block_run_id))
    }

    /// Block runs of a run, in the order they were recorded.
    pub async fn list_block_runs(&self, run_id: Uuid) -> Result<Vec<BlockRun>, EngineError> {
        Ok(self.engine.store().list_block_runs(run_id).await?)
    }

    /// Replace the reviewed output of a block run.
    ///
    /// The original `output` is kept; the edit is appended to the history.
    pub async fn edit_block_run_output(
        &self,
        block_run_id: Uuid,
        content: String,
    ) -> Result<BlockRun, EngineError> {
        let mut block_run = self.get_block_run(block_run_id).await?;
        block_run.edited_output = Some(content.clone());
        block_run.edit_history.push(OutputEdit {
            timestamp: Utc::now(),
            content,
        });
        self.engine.store().upsert_block_run(&block_run).await?;
        Ok(block_run)
    }

    /// Start a new run that reuses a previous run's outputs up to `block_id`
    /// and executes from `block_id` on.
    ///
    /// Earlier blocks' outputs, edited ones preferred, become input
    /// overrides of the new run. `overrides` take precedence over both the
    /// previous run's overrides and the reused outputs. The previous run is
    /// left untouched.
    pub async fn rerun_from_block(
        &self,
        run_id: Uuid,
        block_id: Uuid,
        overrides: BTreeMap<String, VariableValue>,
    ) -> Result<Uuid> {
        let request = self.follow_up_request(run_id, block_id, overrides).await?;
        info!(prior = %run_id, %block_id, "re-running from block");
        self.start_run(request).await
    }

    /// Start a new run that executes only `block_id`, fed by a previous
    /// run's outputs the same way as [`RunManager::rerun_from_block`].
    ///
    /// The new run records block runs for that block alone.
    pub async fn run_single_block(
        &self,
        run_id: Uuid,
        block_id: Uuid,
        overrides: BTreeMap<String, VariableValue>,
    ) -> Result<Uuid> {
        let mut request = self.follow_up_request(run_id, block_id, overrides).await?;
        request.stop_after = Some(block_id);
        info!(prior = %run_id, %block_id, "running single block");
        self.start_run(request).await
    }

    async fn follow_up_request(
        &self,
        run_id: Uuid,
        block_id: Uuid,
        overrides: BTreeMap<String, VariableValue>,
    ) -> Result<RunRequest> {
        let prior = self.get_run(run_id).await?;
        let sequence = self
            .engine
            .store()
            .get_sequence(prior.sequence_id)
            .await?
            .ok_or(EngineError::SequenceNotFound(prior.sequence_id))?;

        let ordered = sequence.ordered_blocks();
        let position = ordered
            .iter()
            .position(|block| block.id == block_id)
            .ok_or(EngineError::from(ConfigError::UnknownBlock(block_id)))?;

        let block_runs = self.list_block_runs(prior.id).await?;
        let mut merged = prior.input_overrides.clone();
        for block in &ordered[..position] {
            merged.extend(reused_outputs(block, &block_runs, &prior.results_summary));
        }
        merged.extend(overrides);

        Ok(RunRequest {
            sequence_id: sequence.id,
            overrides: merged,
            model_override: prior.model_override.clone(),
            start_block: Some(block_id),
            stop_after: None,
            rerun_of: Some(prior.id),
        })
    }
}

/// Forget runs whose task finished without anyone awaiting it. Their final
/// state is already in the store.
fn prune_finished(active: &mut HashMap<Uuid, ActiveRun>) {
    active.retain(|_, entry| entry.is_running());
}

/// Outputs of `block` in a finished run, rebuilt from its block runs so that
/// reviewer edits are honoured. Falls back to the run's results summary.
fn reused_outputs(
    block: &Block,
    block_runs: &[BlockRun],
    summary: &BTreeMap<String, VariableValue>,
) -> Vec<(String, VariableValue)> {
    let mut completed: Vec<&BlockRun> = block_runs
        .iter()
        .filter(|run| run.block_id == block.id && run.status == RunStatus::Completed)
        .collect();
    completed.sort_by(|a, b| a.combination.cmp(&b.combination));
    let outputs: Vec<String> = completed
        .iter()
        .filter_map(|run| run.effective_output().map(str::to_string))
        .collect();

    let from_summary =
        |name: &str| summary.get(name).map(|value| (name.to_string(), value.clone()));

    let Ok(variant) = BlockVariant::from_block(block) else {
        return block
            .produced_names()
            .iter()
            .filter_map(|name| from_summary(name.as_str()))
            .collect();
    };

    let rebuilt = match &variant {
        BlockVariant::Standard { output_name } => outputs
            .last()
            .map(|text| vec![(output_name.clone(), VariableValue::Scalar(text.clone()))]),
        BlockVariant::Discretization {
            output_names,
            delimiter,
        } => outputs
            .last()
            .and_then(|text| parse_discretized(text, output_names, delimiter).ok())
            .map(|segments| {
                output_names
                    .iter()
                    .cloned()
                    .zip(segments.into_iter().map(VariableValue::Scalar))
                    .collect()
            }),
        BlockVariant::SingleList { output_name, .. } => match summary.get(output_name) {
            Some(VariableValue::List(items)) if items.len() == outputs.len() => {
                Some(vec![(output_name.clone(), VariableValue::List(outputs))])
            }
            _ => None,
        },
        BlockVariant::MultiList { output_name, .. } => match summary.get(output_name) {
            Some(VariableValue::Matrix(matrix)) => Matrix::new(matrix.shape.clone(), outputs)
                .map(|matrix| vec![(output_name.clone(), VariableValue::Matrix(matrix))]),
            _ => None,
        },
    };

    rebuilt.unwrap_or_else(|| {
        variant
            .output_names()
            .into_iter()
            .filter_map(|name| from_summary(name))
            .collect()
    })
}
