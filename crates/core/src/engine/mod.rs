//! Sequence execution engine.
//!
//! The SequenceEngine executes a sequence's blocks in order against a
//! per-run variable pool, delegating model calls to a [`ModelProvider`] and
//! persisting run state through a [`Store`]. Every state change is reported
//! on the run's event channel.

pub mod block;
pub mod cancel;
pub mod chunking;
pub mod error;
pub mod executor;
pub mod materializer;
pub mod pool;
pub mod preview;
pub mod template;
pub mod validation;

pub use block::BlockVariant;
pub use cancel::{cancellation_pair, CancellationHandle, CancellationToken};
pub use error::{ConfigError, EngineError, EngineResult};
pub use pool::{Provenance, VariablePool};
pub use preview::{available_variables, preview_block_prompt, PromptPreview, VariableInfo};
pub use validation::{reorder_blocks, validate_sequence, ValidationIssue, ValidationOptions};

use crate::engine::chunking::expose_chunks;
use crate::engine::executor::{execute_block, BlockContext, BlockOutcome};
use crate::engine::materializer::{global_list_append, variable_for};
use crate::providers::ModelProvider;
use crate::state::run::{
    advance_block, complete_run, create_run, fail_run, log_to_run, start_run,
};
use crate::store::{Store, StoreError};
use sk_protocol::block_models::Block;
use sk_protocol::config_models::GlobalConfig;
use sk_protocol::ipc::Event;
use sk_protocol::run_models::{BlockRun, Run, RunStatus};
use sk_protocol::sequence_models::Sequence;
use sk_protocol::variable_models::{GlobalList, VariableValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Seed the pool a run of `sequence` starts from, chunked inputs included.
pub fn seed_pool(
    sequence: &Sequence,
    global_lists: &[GlobalList],
    overrides: &BTreeMap<String, VariableValue>,
) -> VariablePool {
    let mut pool = VariablePool::seeded(global_lists, &sequence.variables, overrides);
    if let Some(settings) = sequence.chunking() {
        expose_chunks(&mut pool, &settings);
    }
    pool
}

/// Engine-wide knobs, usually taken from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Last-resort model for blocks, runs and sequences that name none.
    pub default_model: Option<String>,
    /// Upper bound on concurrent model calls of one fan-out block.
    pub max_concurrency: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        GlobalConfig::default().into()
    }
}

impl From<GlobalConfig> for EngineSettings {
    fn from(config: GlobalConfig) -> Self {
        Self {
            default_model: config.default_model,
            max_concurrency: config.max_concurrency.max(1),
        }
    }
}

/// Parameters of a new run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub sequence_id: Uuid,
    /// Values replacing sequence variables, or adding names, for this run.
    pub overrides: BTreeMap<String, VariableValue>,
    /// Model for every block that does not name its own.
    pub model_override: Option<String>,
    /// Skip every block before this one.
    pub start_block: Option<Uuid>,
    /// Stop after this block instead of running to the end.
    pub stop_after: Option<Uuid>,
    pub rerun_of: Option<Uuid>,
}

impl RunRequest {
    pub fn new(sequence_id: Uuid) -> Self {
        Self {
            sequence_id,
            overrides: BTreeMap::new(),
            model_override: None,
            start_block: None,
            stop_after: None,
            rerun_of: None,
        }
    }

    /// A request executing only `block_id`. Outputs of earlier blocks it
    /// references must be supplied as overrides.
    pub fn single_block(sequence_id: Uuid, block_id: Uuid) -> Self {
        Self {
            start_block: Some(block_id),
            stop_after: Some(block_id),
            ..Self::new(sequence_id)
        }
    }

    pub fn with_override(mut self, name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}

/// Positions, in execution order, of the blocks a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
}

/// Why block execution stopped, and which block stopped it.
struct Halt {
    error: EngineError,
    block_id: Option<Uuid>,
}

impl Halt {
    fn at<E: Into<EngineError>>(block_id: Uuid) -> impl FnOnce(E) -> Self {
        move |error| Self {
            error: error.into(),
            block_id: Some(block_id),
        }
    }
}

impl From<EngineError> for Halt {
    fn from(error: EngineError) -> Self {
        Self {
            error,
            block_id: None,
        }
    }
}

impl From<StoreError> for Halt {
    fn from(error: StoreError) -> Self {
        EngineError::from(error).into()
    }
}

/// The main sequence execution engine.
///
/// The engine holds no per-run state, so one instance can execute any
/// number of runs concurrently.
pub struct SequenceEngine {
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn Store>,
    settings: EngineSettings,
}

impl SequenceEngine {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn Store>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            provider,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Create and persist a pending run for `request`.
    ///
    /// Returns the run with the sequence it runs and the span of blocks it
    /// executes.
    pub async fn prepare_run(&self, request: &RunRequest) -> EngineResult<(Run, Sequence, BlockSpan)> {
        let sequence = self
            .store
            .get_sequence(request.sequence_id)
            .await?
            .ok_or(EngineError::SequenceNotFound(request.sequence_id))?;

        let ordered = sequence.ordered_blocks();
        let position = |block_id: Uuid| {
            ordered
                .iter()
                .position(|block| block.id == block_id)
                .ok_or(ConfigError::UnknownBlock(block_id))
        };
        let start = request.start_block.map(&position).transpose()?.unwrap_or(0);
        let end = match request.stop_after {
            Some(block_id) => {
                let stop = position(block_id)?;
                if stop < start {
                    return Err(ConfigError::EmptyBlockRange {
                        start: ordered[start].name.clone(),
                        stop: ordered[stop].name.clone(),
                    }
                    .into());
                }
                stop + 1
            }
            None => ordered.len(),
        };

        let mut run = create_run(sequence.id, sequence.name.clone(), ordered.len());
        run.model_override = request.model_override.clone();
        run.input_overrides = request.overrides.clone();
        run.rerun_of = request.rerun_of;
        run.current_block_index = start;
        self.store.upsert_run(&run).await?;

        Ok((run, sequence, BlockSpan { start, end }))
    }

    /// Give a stored sequence's blocks a new execution order and save it.
    pub async fn reorder_sequence(
        &self,
        sequence_id: Uuid,
        ordered_ids: &[Uuid],
    ) -> EngineResult<Sequence> {
        let mut sequence = self
            .store
            .get_sequence(sequence_id)
            .await?
            .ok_or(EngineError::SequenceNotFound(sequence_id))?;
        reorder_blocks(&mut sequence, ordered_ids)?;
        self.store.save_sequence(sequence.clone()).await?;
        Ok(sequence)
    }

    /// Execute a run to completion.
    ///
    /// An error is returned only when the run cannot be created. Failures
    /// during execution are recorded on the returned run.
    pub async fn run(&self, request: RunRequest, events_tx: Sender<Event>) -> EngineResult<Run> {
        let (run, sequence, span) = self.prepare_run(&request).await?;
        Ok(self
            .execute(run, &sequence, span, &events_tx, CancellationToken::never())
            .await)
    }

    /// Drive a prepared run until it completes or fails.
    #[tracing::instrument(skip_all, fields(run_id = %run.id, sequence = %sequence.name))]
    pub async fn execute(
        &self,
        mut run: Run,
        sequence: &Sequence,
        span: BlockSpan,
        events_tx: &Sender<Event>,
        cancel: CancellationToken,
    ) -> Run {
        let _ = events_tx
            .send(Event::RunStarted {
                run_id: run.id,
                sequence_name: run.sequence_name.clone(),
            })
            .await;
        start_run(&mut run, events_tx).await;
        info!(blocks = run.total_blocks, start = span.start, end = span.end, "run started");

        let outcome = match self.store.upsert_run(&run).await {
            Ok(()) => {
                self.execute_blocks(&mut run, sequence, span, events_tx, &cancel)
                    .await
            }
            Err(error) => Err(Halt::from(error)),
        };

        match outcome {
            Ok(()) => {
                complete_run(&mut run, events_tx).await;
                info!(
                    elapsed_ms = run.total_execution_time_ms,
                    "run completed"
                );
            }
            Err(Halt { error, block_id }) => {
                warn!(%error, kind = ?error.kind(), "run failed");
                log_to_run(&mut run, events_tx, format!("Run failed: {error}")).await;
                fail_run(&mut run, events_tx, &error, block_id).await;
            }
        }

        if let Err(store_error) = self.store.upsert_run(&run).await {
            error!(%store_error, "failed to persist final run state");
            if run.status != RunStatus::Failed {
                fail_run(&mut run, events_tx, &EngineError::Store(store_error), None).await;
                let _ = self.store.upsert_run(&run).await;
            }
        }

        run
    }

    async fn execute_blocks(
        &self,
        run: &mut Run,
        sequence: &Sequence,
        span: BlockSpan,
        events_tx: &Sender<Event>,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        let global_lists = self.store.list_global_lists().await?;
        let mut pool = seed_pool(sequence, &global_lists, &run.input_overrides);
        let fallback_model = run
            .model_override
            .clone()
            .or_else(|| sequence.default_model.clone())
            .or_else(|| self.settings.default_model.clone());

        let ordered = sequence.ordered_blocks();

        let issues = validate_sequence(
            sequence,
            &pool,
            ValidationOptions {
                start_index: span.start,
                end_index: Some(span.end),
                fallback_model: fallback_model.as_deref(),
            },
        );
        if let Some(issue) = issues.into_iter().next() {
            if let Some(block) = issue.block_id.and_then(|id| sequence.block(id)) {
                let outcome = BlockOutcome {
                    records: Vec::new(),
                    result: Err(issue.error.clone()),
                };
                self.record_block_runs(run, events_tx, &outcome.to_block_runs(run.id, block))
                    .await?;
            }
            return Err(Halt {
                error: issue.error,
                block_id: issue.block_id,
            });
        }

        let executed = span.end.saturating_sub(span.start);
        for (index, block) in ordered.into_iter().enumerate().skip(span.start).take(executed) {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled.into());
            }

            let _ = events_tx
                .send(Event::BlockStarted {
                    run_id: run.id,
                    block_id: block.id,
                    block_name: block.name.clone(),
                    block_index: index,
                })
                .await;
            log_to_run(run, events_tx, format!("Executing block: {}", block.name)).await;

            let bindings = self
                .execute_one(run, sequence, block, &pool, fallback_model.as_deref(), events_tx, cancel)
                .await
                .map_err(Halt::at(block.id))?;

            let provenance = Provenance::Block {
                block_id: block.id,
                block_name: block.name.clone(),
                order: block.order,
            };
            for (name, value) in &bindings {
                pool.bind(name.clone(), value.clone(), provenance.clone())
                    .map_err(|error| {
                        let pool::PoolError::AlreadyBound { name, existing } = error;
                        EngineError::from(ConfigError::DuplicateProducer {
                            name,
                            first: existing,
                            second: provenance.describe(),
                        })
                    })
                    .map_err(Halt::at(block.id))?;
            }
            for (name, value) in &bindings {
                self.store
                    .upsert_variable(variable_for(sequence.id, block.id, name, value))
                    .await
                    .map_err(Halt::at(block.id))?;
            }
            run.results_summary.extend(bindings.iter().cloned());

            if let Some(target) = block.global_list_target() {
                let list = self
                    .store
                    .append_to_global_list(target, global_list_append(block.id, &bindings))
                    .await
                    .map_err(Halt::at(block.id))?;
                log_to_run(
                    run,
                    events_tx,
                    format!("Stored output in global list '{}' ({} values)", list.name, list.values.len()),
                )
                .await;
            }

            log_to_run(run, events_tx, format!("Block {} completed", block.name)).await;
            advance_block(run, events_tx).await;
            self.store
                .upsert_run(run)
                .await
                .map_err(Halt::at(block.id))?;
        }

        Ok(())
    }

    /// Run one block and persist its block runs. Returns its bindings.
    #[allow(clippy::too_many_arguments)]
    async fn execute_one(
        &self,
        run: &mut Run,
        sequence: &Sequence,
        block: &Block,
        pool: &VariablePool,
        fallback_model: Option<&str>,
        events_tx: &Sender<Event>,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<(String, VariableValue)>> {
        let variant = BlockVariant::from_block(block)?;
        let model = block
            .model
            .as_deref()
            .or(fallback_model)
            .ok_or_else(|| ConfigError::NoModel {
                block: block.name.clone(),
            })?;

        let outcome = execute_block(
            self.provider.as_ref(),
            BlockContext {
                block,
                variant: &variant,
                model,
                pool,
                chunking: sequence.chunking(),
                max_concurrency: self.settings.max_concurrency,
                cancel,
            },
        )
        .await;

        for record in &outcome.records {
            run.total_execution_time_ms += record.elapsed_ms;
            if let Ok(response) = &record.result {
                if let Some(usage) = response.token_usage {
                    run.total_token_usage += usage;
                }
                run.total_cost_estimate += response.cost_estimate.unwrap_or(0.0);
            }
        }

        self.record_block_runs(run, events_tx, &outcome.to_block_runs(run.id, block))
            .await?;
        outcome.result
    }

    async fn record_block_runs(
        &self,
        run: &Run,
        events_tx: &Sender<Event>,
        block_runs: &[BlockRun],
    ) -> EngineResult<()> {
        for block_run in block_runs {
            self.store.upsert_block_run(block_run).await?;
            let _ = events_tx
                .send(Event::BlockRunRecorded {
                    run_id: run.id,
                    block_id: block_run.block_id,
                    block_run_id: block_run.id,
                    status: block_run.status,
                })
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;
    use crate::store::InMemoryStore;
    use sk_protocol::block_models::{BlockConfig, BlockType};
    use sk_protocol::run_models::FailureKind;
    use tokio::sync::mpsc;

    fn block(name: &str, order: i64, prompt: &str, output: &str) -> Block {
        Block {
            id: Uuid::new_v4(),
            sequence_id: Uuid::nil(),
            name: name.to_string(),
            block_type: BlockType::Standard,
            order,
            model: None,
            prompt: prompt.to_string(),
            output_name: output.to_string(),
            config: BlockConfig::default(),
        }
    }

    fn sequence(blocks: Vec<Block>) -> Sequence {
        Sequence {
            id: Uuid::new_v4(),
            name: "test-sequence".to_string(),
            description: None,
            default_model: Some("mock".to_string()),
            chunk_size: None,
            preserve_sentences: false,
            loop_enabled: false,
            blocks,
            variables: Vec::new(),
        }
    }

    fn engine(provider: MockProvider, sequence: &Sequence) -> (SequenceEngine, InMemoryStore) {
        let store = InMemoryStore::seeded(vec![sequence.clone()], Vec::new());
        let engine = SequenceEngine::new(
            Arc::new(provider),
            Arc::new(store.clone()),
            EngineSettings::default(),
        );
        (engine, store)
    }

    #[tokio::test]
    async fn test_sequence_engine_simple_execution() {
        let seq = sequence(vec![
            block("first", 0, "Say {{word}}", "a"),
            block("second", 1, "Repeat {{a}}", "b"),
        ]);
        let (engine, store) = engine(MockProvider::echo(), &seq);
        let (tx, mut rx) = mpsc::channel(100);

        let run = engine
            .run(RunRequest::new(seq.id).with_override("word", "hi"), tx)
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.progress_percentage, 100.0);
        assert_eq!(run.results_summary["b"], VariableValue::from("Repeat Say hi"));
        assert_eq!(store.list_block_runs(run.id).await.unwrap().len(), 2);
        assert_eq!(store.get_run(run.id).await.unwrap().unwrap().status, RunStatus::Completed);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(Event::RunStarted { .. })));
        assert!(matches!(events.last(), Some(Event::RunCompleted { .. })));
    }

    #[tokio::test]
    async fn test_sequence_engine_unknown_sequence() {
        let seq = sequence(Vec::new());
        let (engine, _) = engine(MockProvider::echo(), &seq);
        let (tx, _rx) = mpsc::channel(100);

        let missing = Uuid::new_v4();
        let result = engine.run(RunRequest::new(missing), tx).await;
        assert_eq!(result.unwrap_err(), EngineError::SequenceNotFound(missing));
    }

    #[tokio::test]
    async fn test_sequence_engine_empty_sequence_completes() {
        let seq = sequence(Vec::new());
        let (engine, _) = engine(MockProvider::echo(), &seq);
        let (tx, _rx) = mpsc::channel(100);

        let run = engine.run(RunRequest::new(seq.id), tx).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.progress_percentage, 100.0);
    }

    #[tokio::test]
    async fn test_sequence_engine_provider_failure() {
        let seq = sequence(vec![block("only", 0, "hi", "out")]);
        let (engine, store) = engine(MockProvider::failing(), &seq);
        let (tx, _rx) = mpsc::channel(100);

        let run = engine.run(RunRequest::new(seq.id), tx).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.failure_kind, Some(FailureKind::BlockExecutionFailed));
        assert_eq!(run.failed_block_id, Some(seq.blocks[0].id));
        let block_runs = store.list_block_runs(run.id).await.unwrap();
        assert_eq!(block_runs.len(), 1);
        assert_eq!(block_runs[0].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_sequence_engine_start_block_skips_earlier_blocks() {
        let seq = sequence(vec![
            block("first", 0, "one", "a"),
            block("second", 1, "two {{a}}", "b"),
        ]);
        let provider = MockProvider::echo();
        let (engine, _) = engine(provider.clone(), &seq);
        let (tx, _rx) = mpsc::channel(100);

        let mut request = RunRequest::new(seq.id).with_override("a", "given");
        request.start_block = Some(seq.blocks[1].id);
        let run = engine.run(request, tx).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(run.results_summary.get("a"), None);
        assert_eq!(run.results_summary["b"], VariableValue::from("two given"));
    }

    #[tokio::test]
    async fn test_single_block_request_runs_one_block() {
        let seq = sequence(vec![
            block("first", 0, "one", "a"),
            block("second", 1, "two {{a}}", "b"),
            block("third", 2, "three {{b}}", "c"),
        ]);
        let provider = MockProvider::echo();
        let (engine, store) = engine(provider.clone(), &seq);
        let (tx, _rx) = mpsc::channel(100);

        let request = RunRequest::single_block(seq.id, seq.blocks[1].id).with_override("a", "given");
        let run = engine.run(request, tx).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(run.results_summary.len(), 1);
        assert_eq!(run.results_summary["b"], VariableValue::from("two given"));
        let block_runs = store.list_block_runs(run.id).await.unwrap();
        assert_eq!(block_runs.len(), 1);
        assert_eq!(block_runs[0].block_id, seq.blocks[1].id);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_rejected() {
        let seq = sequence(vec![
            block("first", 0, "one", "a"),
            block("second", 1, "two", "b"),
        ]);
        let (engine, _) = engine(MockProvider::echo(), &seq);
        let (tx, _rx) = mpsc::channel(100);

        let mut request = RunRequest::new(seq.id);
        request.start_block = Some(seq.blocks[1].id);
        request.stop_after = Some(seq.blocks[0].id);
        let result = engine.run(request, tx).await;

        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::EmptyBlockRange { .. }))
        ));
    }

    /// Delegates to an [`InMemoryStore`] but refuses to store one variable.
    struct RejectingStore {
        inner: InMemoryStore,
        rejected: &'static str,
    }

    #[async_trait::async_trait]
    impl Store for RejectingStore {
        async fn get_sequence(&self, id: Uuid) -> crate::store::StoreResult<Option<Sequence>> {
            self.inner.get_sequence(id).await
        }
        async fn save_sequence(&self, sequence: Sequence) -> crate::store::StoreResult<()> {
            self.inner.save_sequence(sequence).await
        }
        async fn list_sequences(&self) -> crate::store::StoreResult<Vec<Sequence>> {
            self.inner.list_sequences().await
        }
        async fn list_global_lists(&self) -> crate::store::StoreResult<Vec<GlobalList>> {
            self.inner.list_global_lists().await
        }
        async fn get_global_list(&self, name: &str) -> crate::store::StoreResult<Option<GlobalList>> {
            self.inner.get_global_list(name).await
        }
        async fn save_global_list(&self, list: GlobalList) -> crate::store::StoreResult<()> {
            self.inner.save_global_list(list).await
        }
        async fn append_to_global_list(
            &self,
            name: &str,
            append: sk_protocol::variable_models::GlobalListAppend,
        ) -> crate::store::StoreResult<GlobalList> {
            self.inner.append_to_global_list(name, append).await
        }
        async fn upsert_variable(
            &self,
            variable: sk_protocol::variable_models::Variable,
        ) -> crate::store::StoreResult<()> {
            if variable.name == self.rejected {
                return Err(StoreError::Backend("disk full".to_string()));
            }
            self.inner.upsert_variable(variable).await
        }
        async fn list_variables(
            &self,
            sequence_id: Uuid,
        ) -> crate::store::StoreResult<Vec<sk_protocol::variable_models::Variable>> {
            self.inner.list_variables(sequence_id).await
        }
        async fn upsert_run(&self, run: &Run) -> crate::store::StoreResult<()> {
            self.inner.upsert_run(run).await
        }
        async fn get_run(&self, id: Uuid) -> crate::store::StoreResult<Option<Run>> {
            self.inner.get_run(id).await
        }
        async fn list_runs(&self, sequence_id: Option<Uuid>) -> crate::store::StoreResult<Vec<Run>> {
            self.inner.list_runs(sequence_id).await
        }
        async fn upsert_block_run(&self, block_run: &BlockRun) -> crate::store::StoreResult<()> {
            self.inner.upsert_block_run(block_run).await
        }
        async fn get_block_run(&self, id: Uuid) -> crate::store::StoreResult<Option<BlockRun>> {
            self.inner.get_block_run(id).await
        }
        async fn list_block_runs(&self, run_id: Uuid) -> crate::store::StoreResult<Vec<BlockRun>> {
            self.inner.list_block_runs(run_id).await
        }
    }

    #[tokio::test]
    async fn test_store_failure_leaves_results_summary_untouched() {
        let mut split = block("split", 0, "Split", "");
        split.block_type = BlockType::Discretization;
        split.config.number_of_outputs = Some(2);
        split.config.output_variable_names = vec!["head".to_string(), "tail".to_string()];
        let seq = sequence(vec![split]);

        let store = RejectingStore {
            inner: InMemoryStore::seeded(vec![seq.clone()], Vec::new()),
            rejected: "tail",
        };
        let engine = SequenceEngine::new(
            Arc::new(MockProvider::fixed("alpha\nbeta")),
            Arc::new(store),
            EngineSettings::default(),
        );
        let (tx, _rx) = mpsc::channel(100);

        let run = engine.run(RunRequest::new(seq.id), tx).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.failure_kind, Some(FailureKind::Persistence));
        assert!(run.results_summary.is_empty());
    }

    #[tokio::test]
    async fn test_reorder_sequence_persists() {
        let seq = sequence(vec![
            block("first", 0, "one", "a"),
            block("second", 1, "two", "b"),
        ]);
        let (engine, store) = engine(MockProvider::echo(), &seq);
        let (a, b) = (seq.blocks[0].id, seq.blocks[1].id);

        engine.reorder_sequence(seq.id, &[b, a]).await.unwrap();

        let stored = store.get_sequence(seq.id).await.unwrap().unwrap();
        let order: Vec<_> = stored.ordered_blocks().iter().map(|block| block.id).collect();
        assert_eq!(order, vec![b, a]);

        let result = engine.reorder_sequence(seq.id, &[a]).await;
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::InvalidReorder(_)))
        ));
    }

    #[test]
    fn test_engine_settings_from_config() {
        let settings = EngineSettings::from(GlobalConfig {
            default_model: Some("m".to_string()),
            max_concurrency: 0,
            providers: Vec::new(),
        });
        assert_eq!(settings.max_concurrency, 1);
        assert_eq!(settings.default_model.as_deref(), Some("m"));
    }
}
