//! Executes a single block: plans its model calls, resolves every prompt,
//! dispatches the calls and materializes the responses.

use crate::engine::block::BlockVariant;
use crate::engine::cancel::CancellationToken;
use crate::engine::chunking::chunk_text;
use crate::engine::error::{ConfigError, EngineError};
use crate::engine::materializer::{materialize, RawOutput};
use crate::engine::pool::VariablePool;
use crate::engine::template::{resolve_with, ReferenceFailure, ResolveError};
use crate::providers::base::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use sk_protocol::block_models::Block;
use sk_protocol::run_models::{BlockRun, RunStatus};
use sk_protocol::sequence_models::ChunkingSettings;
use sk_protocol::variable_models::{ValueShape, VariableValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Everything a block needs to run once.
pub struct BlockContext<'a> {
    pub block: &'a Block,
    pub variant: &'a BlockVariant,
    pub model: &'a str,
    pub pool: &'a VariablePool,
    pub chunking: Option<ChunkingSettings>,
    /// Upper bound on concurrent model calls for fan-out blocks.
    pub max_concurrency: usize,
    pub cancel: &'a CancellationToken,
}

/// One issued model call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub combination: Vec<usize>,
    pub input: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub result: Result<ModelResponse, ModelError>,
}

#[derive(Debug, Clone)]
pub struct BlockOutcome {
    /// Calls that were actually issued, in combination order.
    pub records: Vec<CallRecord>,
    pub result: Result<Vec<(String, VariableValue)>, EngineError>,
}

impl BlockOutcome {
    fn failed(error: EngineError) -> Self {
        Self {
            records: Vec::new(),
            result: Err(error),
        }
    }

    /// Block run records for this outcome.
    ///
    /// Every issued call gets one. A failure not attributable to any call
    /// gets a record of its own holding the unresolved prompt template.
    pub fn to_block_runs(&self, run_id: Uuid, block: &Block) -> Vec<BlockRun> {
        let mut block_runs: Vec<BlockRun> = self
            .records
            .iter()
            .map(|record| {
                let (output, status, error_message, token_usage, cost_estimate) = match &record.result {
                    Ok(response) => (
                        Some(response.text.clone()),
                        RunStatus::Completed,
                        None,
                        response.token_usage,
                        response.cost_estimate,
                    ),
                    Err(error) => (None, RunStatus::Failed, Some(error.to_string()), None, None),
                };
                BlockRun {
                    id: Uuid::new_v4(),
                    run_id,
                    block_id: block.id,
                    block_name: block.name.clone(),
                    block_type: block.block_type,
                    combination: record.combination.clone(),
                    input: record.input.clone(),
                    output,
                    edited_output: None,
                    edit_history: Vec::new(),
                    status,
                    error_message,
                    execution_time_ms: record.elapsed_ms,
                    token_usage,
                    cost_estimate,
                    started_at: record.started_at,
                    completed_at: Some(Utc::now()),
                }
            })
            .collect();

        let Err(error) = &self.result else {
            return block_runs;
        };
        if block_runs.iter().any(|run| run.status == RunStatus::Failed) {
            return block_runs;
        }

        if matches!(error, EngineError::MalformedOutput { .. }) && !block_runs.is_empty() {
            for block_run in &mut block_runs {
                block_run.status = RunStatus::Failed;
                block_run.error_message = Some(error.to_string());
            }
        } else {
            let now = Utc::now();
            block_runs.push(BlockRun {
                id: Uuid::new_v4(),
                run_id,
                block_id: block.id,
                block_name: block.name.clone(),
                block_type: block.block_type,
                combination: Vec::new(),
                input: block.prompt.clone(),
                output: None,
                edited_output: None,
                edit_history: Vec::new(),
                status: RunStatus::Failed,
                error_message: Some(error.to_string()),
                execution_time_ms: 0,
                token_usage: None,
                cost_estimate: None,
                started_at: now,
                completed_at: Some(now),
            });
        }
        block_runs
    }
}

/// A model call before its prompt is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCall {
    pub combination: Vec<usize>,
    /// Per-call names shadowing the pool, such as `item`.
    pub bindings: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPlan {
    pub calls: Vec<PlannedCall>,
    /// Axis lengths of a fan-out block, `None` for single-call blocks.
    pub shape: Option<Vec<usize>>,
}

/// Work out the calls a block will make against the current pool.
pub fn plan_calls(
    variant: &BlockVariant,
    block_name: &str,
    pool: &VariablePool,
    chunking: Option<ChunkingSettings>,
) -> Result<CallPlan, EngineError> {
    match variant {
        BlockVariant::Standard { .. } | BlockVariant::Discretization { .. } => Ok(CallPlan {
            calls: vec![PlannedCall {
                combination: Vec::new(),
                bindings: Vec::new(),
            }],
            shape: None,
        }),
        BlockVariant::SingleList { input_list, .. } => {
            let items = single_list_items(input_list, pool, chunking)?;
            let calls = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| PlannedCall {
                    combination: vec![i],
                    bindings: vec![
                        ("item".to_string(), item),
                        ("item_index".to_string(), i.to_string()),
                    ],
                })
                .collect::<Vec<_>>();
            Ok(CallPlan {
                shape: Some(vec![calls.len()]),
                calls,
            })
        }
        BlockVariant::MultiList { lists, .. } => {
            let mut axes: Vec<&[String]> = Vec::with_capacity(lists.len());
            for axis in lists {
                match pool.get(&axis.list_name) {
                    Some(VariableValue::List(items)) => axes.push(items),
                    Some(other) => {
                        return Err(ConfigError::NotAList {
                            block: block_name.to_string(),
                            list: axis.list_name.clone(),
                            found: other.shape(),
                        }
                        .into())
                    }
                    None => {
                        return Err(ConfigError::UnknownList {
                            block: block_name.to_string(),
                            list: axis.list_name.clone(),
                        }
                        .into())
                    }
                }
            }

            let shape: Vec<usize> = axes.iter().map(|items| items.len()).collect();
            let calls = combinations(&shape)
                .into_iter()
                .map(|combination| {
                    let bindings = lists
                        .iter()
                        .zip(&combination)
                        .zip(&axes)
                        .flat_map(|((axis, &index), items)| {
                            let n = axis.declared_position;
                            [
                                (format!("item{n}"), items[index].clone()),
                                (format!("item{n}_index"), index.to_string()),
                                (format!("item{n}_name"), axis.list_name.clone()),
                            ]
                        })
                        .collect();
                    PlannedCall {
                        combination,
                        bindings,
                    }
                })
                .collect();
            Ok(CallPlan {
                calls,
                shape: Some(shape),
            })
        }
    }
}

fn single_list_items(
    input_list: &str,
    pool: &VariablePool,
    chunking: Option<ChunkingSettings>,
) -> Result<Vec<String>, EngineError> {
    match pool.get(input_list) {
        Some(VariableValue::List(items)) => Ok(items.clone()),
        Some(VariableValue::Scalar(text)) => match chunking {
            Some(settings) if settings.loop_enabled => Ok(chunk_text(text, &settings)),
            _ => Err(EngineError::TypeMismatch {
                name: input_list.to_string(),
                found: ValueShape::Scalar,
            }),
        },
        Some(other) => Err(EngineError::TypeMismatch {
            name: input_list.to_string(),
            found: other.shape(),
        }),
        None => Err(ResolveError {
            failures: vec![ReferenceFailure::unresolved(input_list)],
        }
        .into()),
    }
}

/// Row-major index tuples over `shape`; the last axis varies fastest.
pub fn combinations(shape: &[usize]) -> Vec<Vec<usize>> {
    let total: usize = shape.iter().product();
    (0..total)
        .map(|flat| {
            let mut rest = flat;
            let mut index = vec![0; shape.len()];
            for (axis, len) in shape.iter().enumerate().rev() {
                index[axis] = rest % len;
                rest /= len;
            }
            index
        })
        .collect()
}

/// Run one block to completion, failure or cancellation.
///
/// No model call is made unless every prompt of the block resolves.
#[tracing::instrument(skip_all, fields(block = %ctx.block.name, block_type = ctx.block.block_type.as_str()))]
pub async fn execute_block(provider: &dyn ModelProvider, ctx: BlockContext<'_>) -> BlockOutcome {
    let plan = match plan_calls(ctx.variant, &ctx.block.name, ctx.pool, ctx.chunking) {
        Ok(plan) => plan,
        Err(error) => return BlockOutcome::failed(error),
    };

    let mut prompts = Vec::with_capacity(plan.calls.len());
    let mut failures: Vec<ReferenceFailure> = Vec::new();
    for call in &plan.calls {
        match resolve_with(&ctx.block.prompt, ctx.pool, &call.bindings) {
            Ok(prompt) => prompts.push(prompt),
            Err(error) => {
                for failure in error.failures {
                    if !failures.contains(&failure) {
                        failures.push(failure);
                    }
                }
            }
        }
    }
    if !failures.is_empty() {
        return BlockOutcome::failed(ResolveError { failures }.into());
    }

    let planned = plan.calls.len();
    debug!(calls = planned, model = ctx.model, "dispatching block");

    let aborted = AtomicBool::new(false);
    let requests = plan.calls.into_iter().zip(prompts).map(|(call, prompt)| {
        let request = ModelRequest::new(ctx.model, prompt).with_block_settings(&ctx.block.config);
        let aborted = &aborted;
        let cancel = ctx.cancel;
        async move {
            if cancel.is_cancelled() || aborted.load(Ordering::SeqCst) {
                return None;
            }
            let started_at = Utc::now();
            let start = Instant::now();
            let result = provider.invoke(&request).await;
            if let Err(error) = &result {
                warn!(combination = ?call.combination, %error, "model call failed");
                aborted.store(true, Ordering::SeqCst);
            }
            Some(CallRecord {
                combination: call.combination,
                input: request.prompt,
                started_at,
                elapsed_ms: start.elapsed().as_millis() as u64,
                result,
            })
        }
    });

    let records: Vec<CallRecord> = stream::iter(requests)
        .buffered(ctx.max_concurrency.max(1))
        .filter_map(|record| async move { record })
        .collect()
        .await;

    if let Some(cause) = records.iter().find_map(|record| record.result.as_ref().err()) {
        let error = EngineError::BlockExecutionFailed {
            block_id: ctx.block.id,
            block_name: ctx.block.name.clone(),
            cause: cause.clone(),
        };
        return BlockOutcome {
            records,
            result: Err(error),
        };
    }
    if records.len() < planned {
        return BlockOutcome {
            records,
            result: Err(EngineError::Cancelled),
        };
    }

    let texts: Vec<String> = records
        .iter()
        .filter_map(|record| record.result.as_ref().ok())
        .map(|response| response.text.clone())
        .collect();
    let raw = match plan.shape {
        Some(shape) => RawOutput::Fanned {
            shape,
            outputs: texts,
        },
        None => RawOutput::Single(texts.into_iter().next().unwrap_or_default()),
    };

    BlockOutcome {
        result: materialize(&ctx.block.name, ctx.variant, raw),
        records,
    }
}
