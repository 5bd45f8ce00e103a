//! Block definitions for sequences.
//!
//! A block is one step of a sequence: it resolves a prompt template against
//! the variables visible to it, invokes a model and binds the result to one
//! or more output names. The recognized `config` fields depend on the
//! block's type.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// The four kinds of block the engine knows how to execute.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    /// One prompt, one model call, one scalar output.
    Standard,

    /// One model call whose response is split into several named outputs.
    Discretization,

    /// One model call per element of an input list.
    SingleList,

    /// One model call per combination of elements across several lists.
    MultiList,
}

impl BlockType {
    /// Wire name of the block type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Discretization => "discretization",
            Self::SingleList => "single_list",
            Self::MultiList => "multi_list",
        }
    }

    /// Whether a block of this type may issue more than one model call.
    pub fn is_fan_out(&self) -> bool {
        matches!(self, Self::SingleList | Self::MultiList)
    }
}

/// One input list of a `multi_list` block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct MultiListConfig {
    #[serde(default = "Uuid::new_v4")]
    #[ts(type = "string")]
    pub id: Uuid,

    /// Name of the list variable or global list to iterate.
    pub list_name: String,

    /// Iteration priority. Priority 0 is the innermost loop and varies fastest.
    #[serde(default)]
    pub priority: u32,
}

/// Type-dependent block configuration.
///
/// Every field is optional on the wire; which ones are required depends on
/// the owning block's [`BlockType`] and is checked by the engine before any
/// model call is made.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
pub struct BlockConfig {
    /// Discretization: how many segments the response must contain.
    #[serde(default)]
    pub number_of_outputs: Option<usize>,

    /// Discretization: the names bound positionally to each segment.
    #[serde(default)]
    pub output_variable_names: Vec<String>,

    /// Discretization: delimiter used when the response carries no JSON.
    ///
    /// Defaults to a newline.
    #[serde(default)]
    pub segment_delimiter: Option<String>,

    /// Single list: the list to iterate over.
    #[serde(default)]
    pub input_list_name: Option<String>,

    /// Multi list: the lists to combine.
    #[serde(default)]
    pub lists: Vec<MultiListConfig>,

    /// Mirror the produced value(s) into a global list.
    #[serde(default)]
    pub store_in_global_list: bool,

    /// Name of the mirrored global list. Defaults to the block's output name.
    #[serde(default)]
    pub global_list_name: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

/// A single step of a sequence.
///
/// # Example
///
/// ```yaml
/// name: summarize
/// block_type: standard
/// order: 0
/// model: claude-3-haiku
/// prompt: "Summarize: {{ document }}"
/// output_name: summary
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct Block {
    #[serde(default = "Uuid::new_v4")]
    #[ts(type = "string")]
    pub id: Uuid,

    /// Owning sequence. Filled in by the loader for inline definitions.
    #[serde(default)]
    #[ts(type = "string")]
    pub sequence_id: Uuid,

    #[serde(default = "default_block_name")]
    pub name: String,

    pub block_type: BlockType,

    /// Execution position. Ties keep their definition order.
    #[serde(default)]
    pub order: i64,

    /// Target model identifier. Falls back to the run/sequence defaults.
    #[serde(default)]
    pub model: Option<String>,

    /// Prompt template. References are written `{{ name }}` or `<< name >>`.
    pub prompt: String,

    /// Name the block's result is bound to.
    ///
    /// Unused by discretization blocks, which bind
    /// `config.output_variable_names` instead.
    #[serde(default)]
    pub output_name: String,

    #[serde(default)]
    pub config: BlockConfig,
}

fn default_block_name() -> String {
    "Untitled Block".to_string()
}

impl Block {
    /// Every variable name this block binds when it completes.
    pub fn produced_names(&self) -> Vec<String> {
        match self.block_type {
            BlockType::Discretization => self.config.output_variable_names.clone(),
            _ => vec![self.output_name.clone()],
        }
    }

    /// Name of the global list this block mirrors its output into, if any.
    pub fn global_list_target(&self) -> Option<&str> {
        if !self.config.store_in_global_list {
            return None;
        }
        match self.config.global_list_name.as_deref() {
            Some(name) if !name.is_empty() => Some(name),
            _ => Some(self.output_name.as_str()),
        }
    }
}
