//! Static checks run before a sequence makes any model call.
//!
//! Validation walks the blocks in execution order while tracking the shape
//! of every name that will be bound by then. It catches misconfigured
//! blocks, names produced twice, references to names that are unknown or
//! only produced later, and indexing that does not fit a value's shape.

use crate::engine::block::BlockVariant;
use crate::engine::error::{ConfigError, EngineError};
use crate::engine::pool::{Provenance, VariablePool};
use crate::engine::template::{
    check_shape, parse_references, rank_of, ReferenceFailure, ResolveError,
};
use serde::Serialize;
use sk_protocol::block_models::{Block, BlockType};
use sk_protocol::sequence_models::Sequence;
use sk_protocol::variable_models::ValueShape;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// What a name will hold by the time a block runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub shape: ValueShape,
    pub rank: usize,
    pub provenance: Provenance,
}

impl Symbol {
    pub fn scalar(provenance: Provenance) -> Self {
        Self {
            shape: ValueShape::Scalar,
            rank: 0,
            provenance,
        }
    }
}

/// Names visible at some point of a sequence, with their shapes.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    pub fn from_pool(pool: &VariablePool) -> Self {
        let symbols = pool
            .iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    Symbol {
                        shape: entry.value.shape(),
                        rank: rank_of(&entry.value),
                        provenance: entry.provenance.clone(),
                    },
                )
            })
            .collect();
        Self { symbols }
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Symbol)> {
        self.symbols.iter()
    }

    /// Record the outputs of a block, reporting names already produced by
    /// something other than a global list.
    pub fn declare_block(&mut self, block: &Block) -> Vec<ConfigError> {
        let provenance = Provenance::Block {
            block_id: block.id,
            block_name: block.name.clone(),
            order: block.order,
        };
        let (shape, rank) = match block.block_type {
            BlockType::Standard | BlockType::Discretization => (ValueShape::Scalar, 0),
            BlockType::SingleList => (ValueShape::List, 1),
            BlockType::MultiList => (ValueShape::Matrix, block.config.lists.len().max(1)),
        };

        let mut errors = Vec::new();
        for name in block.produced_names() {
            if let Some(existing) = self.symbols.get(&name) {
                if !existing.provenance.is_global_list() {
                    errors.push(ConfigError::DuplicateProducer {
                        name: name.clone(),
                        first: existing.provenance.describe(),
                        second: provenance.describe(),
                    });
                    continue;
                }
            }
            self.symbols.insert(
                name,
                Symbol {
                    shape,
                    rank,
                    provenance: provenance.clone(),
                },
            );
        }
        errors
    }
}

/// One problem found in a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// `None` for problems of the sequence as a whole.
    pub block_id: Option<Uuid>,
    pub block_name: Option<String>,
    pub error: EngineError,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions<'a> {
    /// Position in execution order of the first block to check.
    pub start_index: usize,
    /// Position of the first block not checked; all remaining when `None`.
    pub end_index: Option<usize>,
    /// Model used by blocks that do not name one.
    pub fallback_model: Option<&'a str>,
}

/// Check the blocks of `sequence` from `options.start_index` on against the
/// names seeded in `seed`.
///
/// Issues are ordered by block execution order.
pub fn validate_sequence(
    sequence: &Sequence,
    seed: &VariablePool,
    options: ValidationOptions<'_>,
) -> Vec<ValidationIssue> {
    let blocks = sequence.ordered_blocks();
    let end = options.end_index.unwrap_or(blocks.len());
    let pending: Vec<&Block> = blocks
        .into_iter()
        .take(end)
        .skip(options.start_index)
        .collect();
    let chunk_loop = sequence.chunking().is_some_and(|settings| settings.loop_enabled);

    let mut not_yet_produced: HashSet<String> = pending
        .iter()
        .flat_map(|block| block.produced_names())
        .collect();
    let mut table = SymbolTable::from_pool(seed);
    let mut issues = Vec::new();

    for block in pending {
        let mut errors: Vec<EngineError> = Vec::new();

        match BlockVariant::from_block(block) {
            Ok(variant) => {
                if block.model.is_none() && options.fallback_model.is_none() {
                    errors.push(
                        ConfigError::NoModel {
                            block: block.name.clone(),
                        }
                        .into(),
                    );
                }
                errors.extend(check_inputs(block, &variant, &table, &not_yet_produced, chunk_loop));

                let failures = check_prompt(block, &variant, &table, &not_yet_produced);
                if !failures.is_empty() {
                    errors.push(ResolveError { failures }.into());
                }
            }
            Err(error) => errors.push(error.into()),
        }

        errors.extend(table.declare_block(block).into_iter().map(EngineError::from));
        for name in block.produced_names() {
            not_yet_produced.remove(&name);
        }

        issues.extend(errors.into_iter().map(|error| ValidationIssue {
            block_id: Some(block.id),
            block_name: Some(block.name.clone()),
            error,
        }));
    }

    issues
}

/// Shape problems with the lists a fan-out block iterates.
fn check_inputs(
    block: &Block,
    variant: &BlockVariant,
    table: &SymbolTable,
    not_yet_produced: &HashSet<String>,
    chunk_loop: bool,
) -> Vec<EngineError> {
    let lookup = |name: &str| {
        if not_yet_produced.contains(name) {
            None
        } else {
            table.get(name)
        }
    };

    match variant {
        BlockVariant::SingleList { input_list, .. } => match lookup(input_list) {
            None => vec![ResolveError {
                failures: vec![ReferenceFailure::unresolved(input_list)],
            }
            .into()],
            Some(symbol) => match symbol.shape {
                ValueShape::List => Vec::new(),
                ValueShape::Scalar if chunk_loop => Vec::new(),
                found => vec![EngineError::TypeMismatch {
                    name: input_list.clone(),
                    found,
                }],
            },
        },
        BlockVariant::MultiList { lists, .. } => lists
            .iter()
            .filter_map(|axis| match lookup(&axis.list_name) {
                None => Some(
                    ConfigError::UnknownList {
                        block: block.name.clone(),
                        list: axis.list_name.clone(),
                    }
                    .into(),
                ),
                Some(symbol) if symbol.shape != ValueShape::List => Some(
                    ConfigError::NotAList {
                        block: block.name.clone(),
                        list: axis.list_name.clone(),
                        found: symbol.shape,
                    }
                    .into(),
                ),
                Some(_) => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Reference failures of a block's prompt against the names visible to it.
fn check_prompt(
    block: &Block,
    variant: &BlockVariant,
    table: &SymbolTable,
    not_yet_produced: &HashSet<String>,
) -> Vec<ReferenceFailure> {
    let iteration = variant.iteration_names();
    let mut failures: Vec<ReferenceFailure> = Vec::new();

    for reference in parse_references(&block.prompt) {
        let result = if iteration.contains(&reference.name) {
            check_shape(&reference, ValueShape::Scalar, 0)
        } else if not_yet_produced.contains(&reference.name) {
            Err(ReferenceFailure::unresolved(&reference.name))
        } else {
            match table.get(&reference.name) {
                Some(symbol) => check_shape(&reference, symbol.shape, symbol.rank),
                None => Err(ReferenceFailure::unresolved(&reference.name)),
            }
        };
        if let Err(failure) = result {
            if !failures.contains(&failure) {
                failures.push(failure);
            }
        }
    }
    failures
}

/// Renumber `order` densely in the order of `ordered_ids`.
///
/// `ordered_ids` must name every block of the sequence exactly once.
pub fn reorder_blocks(sequence: &mut Sequence, ordered_ids: &[Uuid]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for id in ordered_ids {
        if sequence.block(*id).is_none() {
            return Err(ConfigError::UnknownBlock(*id));
        }
        if !seen.insert(*id) {
            return Err(ConfigError::InvalidReorder(format!("block {id} listed twice")));
        }
    }
    if seen.len() != sequence.blocks.len() {
        return Err(ConfigError::InvalidReorder(format!(
            "expected {} block ids, got {}",
            sequence.blocks.len(),
            seen.len()
        )));
    }

    for (position, id) in ordered_ids.iter().enumerate() {
        if let Some(block) = sequence.blocks.iter_mut().find(|block| block.id == *id) {
            block.order = position as i64;
        }
    }
    sequence.blocks.sort_by_key(|block| block.order);
    Ok(())
}
