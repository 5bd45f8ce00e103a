//! Sequence configuration models for `.sequence-kit/sequences/*.yaml`.
//!
//! A sequence is an ordered chain of blocks plus the variables scoped to it.

use crate::block_models::Block;
use crate::variable_models::Variable;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Text chunking settings of a sequence.
///
/// Long scalar inputs are split into chunks of roughly `chunk_size` words so
/// list blocks can iterate over them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
pub struct ChunkingSettings {
    /// Target chunk length in words.
    pub chunk_size: usize,

    /// Extend a chunk to the end of its sentence instead of cutting mid-sentence.
    pub preserve_sentences: bool,

    /// Let single-list blocks iterate a scalar input's chunks directly.
    pub loop_enabled: bool,
}

/// A user-authored chain of blocks.
///
/// # Example
///
/// ```yaml
/// name: claim-review
/// description: Extract claims and grade each one
/// default_model: claude-3-haiku
/// variables:
///   - name: document
///     type: input
///     value: "..."
/// blocks:
///   - name: extract
///     block_type: discretization
///     order: 0
///     prompt: "List three claims in {{ document }}"
///     config:
///       number_of_outputs: 3
///       output_variable_names: [claim_a, claim_b, claim_c]
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct Sequence {
    #[serde(default = "Uuid::new_v4")]
    #[ts(type = "string")]
    pub id: Uuid,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Model used by blocks that do not name one.
    #[serde(default)]
    pub default_model: Option<String>,

    #[serde(default)]
    pub chunk_size: Option<usize>,

    #[serde(default)]
    pub preserve_sentences: bool,

    #[serde(default)]
    pub loop_enabled: bool,

    /// Blocks in definition order. Execution order is given by `Block::order`.
    #[serde(default)]
    pub blocks: Vec<Block>,

    /// Sequence-scoped variables.
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl Sequence {
    /// Chunking settings, present only when a chunk size is configured.
    pub fn chunking(&self) -> Option<ChunkingSettings> {
        self.chunk_size
            .filter(|size| *size > 0)
            .map(|chunk_size| ChunkingSettings {
                chunk_size,
                preserve_sentences: self.preserve_sentences,
                loop_enabled: self.loop_enabled,
            })
    }

    /// Blocks in execution order.
    ///
    /// The sort is stable, so blocks sharing an `order` keep their
    /// definition order.
    pub fn ordered_blocks(&self) -> Vec<&Block> {
        let mut blocks: Vec<&Block> = self.blocks.iter().collect();
        blocks.sort_by_key(|block| block.order);
        blocks
    }

    /// Look up a block by id.
    pub fn block(&self, block_id: Uuid) -> Option<&Block> {
        self.blocks.iter().find(|block| block.id == block_id)
    }
}
