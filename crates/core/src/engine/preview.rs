//! Design-time views of a block: its rendered prompt and the names it may use.
//!
//! Nothing here calls a model. Outputs of earlier blocks are not known yet,
//! so they render as placeholders like `<summary>` or `<grid[0][1]>`.

use crate::engine::block::BlockVariant;
use crate::engine::error::{ConfigError, EngineError};
use crate::engine::pool::{Provenance, VariablePool};
use crate::engine::seed_pool;
use crate::engine::template::{check_shape, index_value, render, ReferenceFailure};
use crate::engine::validation::{Symbol, SymbolTable};
use serde::Serialize;
use sk_protocol::block_models::Block;
use sk_protocol::sequence_models::Sequence;
use sk_protocol::variable_models::{GlobalList, ValueShape, VariableValue};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPreview {
    pub block_id: Uuid,
    pub rendered: String,
    #[serde(skip)]
    pub failures: Vec<ReferenceFailure>,
}

impl PromptPreview {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A name a block's prompt may reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub shape: ValueShape,
    pub rank: usize,
    pub provenance: Provenance,
}

/// Names visible to `block`: seeds plus outputs of earlier blocks, without
/// the names this block or a later one will produce.
struct BlockScope<'a> {
    block: &'a Block,
    variant: BlockVariant,
    pool: VariablePool,
    table: SymbolTable,
    not_yet_produced: HashSet<String>,
}

impl<'a> BlockScope<'a> {
    fn build(
        sequence: &'a Sequence,
        block_id: Uuid,
        overrides: &BTreeMap<String, VariableValue>,
        global_lists: &[GlobalList],
    ) -> Result<Self, EngineError> {
        let block = sequence
            .block(block_id)
            .ok_or(ConfigError::UnknownBlock(block_id))?;
        let variant = BlockVariant::from_block(block)?;
        let pool = seed_pool(sequence, global_lists, overrides);
        let mut table = SymbolTable::from_pool(&pool);
        let mut not_yet_produced = HashSet::new();

        let mut reached = false;
        for candidate in sequence.ordered_blocks() {
            reached |= candidate.id == block_id;
            if reached {
                not_yet_produced.extend(candidate.produced_names());
            } else {
                // Duplicate producers are reported by validation.
                let _ = table.declare_block(candidate);
            }
        }

        Ok(Self {
            block,
            variant,
            pool,
            table,
            not_yet_produced,
        })
    }

    fn visible(&self, name: &str) -> Option<&Symbol> {
        if self.not_yet_produced.contains(name) {
            None
        } else {
            self.table.get(name)
        }
    }

    /// Sample values for the block's per-call names, with their lists.
    fn sample_bindings(&self) -> Vec<(String, String)> {
        let first_item = |list: &str, placeholder: String| match self.pool.get(list) {
            Some(VariableValue::List(items)) => items.first().cloned().unwrap_or(placeholder),
            _ => placeholder,
        };

        match &self.variant {
            BlockVariant::SingleList { input_list, .. } => vec![
                ("item".to_string(), first_item(input_list, "<item>".to_string())),
                ("item_index".to_string(), "0".to_string()),
            ],
            BlockVariant::MultiList { lists, .. } => lists
                .iter()
                .flat_map(|axis| {
                    let n = axis.declared_position;
                    [
                        (format!("item{n}"), first_item(&axis.list_name, format!("<item{n}>"))),
                        (format!("item{n}_index"), "0".to_string()),
                        (format!("item{n}_name"), axis.list_name.clone()),
                    ]
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Render a block's prompt against the values it would see in a run.
///
/// Unknown blocks and misconfigured blocks are errors. Reference problems
/// are reported on the preview itself.
pub fn preview_block_prompt(
    sequence: &Sequence,
    block_id: Uuid,
    overrides: &BTreeMap<String, VariableValue>,
    global_lists: &[GlobalList],
) -> Result<PromptPreview, EngineError> {
    let scope = BlockScope::build(sequence, block_id, overrides, global_lists)?;
    let bindings = scope.sample_bindings();

    let (rendered, failures) = render(&scope.block.prompt, |reference| {
        if let Some((_, value)) = bindings.iter().find(|(name, _)| *name == reference.name) {
            return index_value(reference, &VariableValue::Scalar(value.clone()));
        }
        let symbol = scope
            .visible(&reference.name)
            .ok_or_else(|| ReferenceFailure::unresolved(&reference.name))?;
        match &symbol.provenance {
            Provenance::Block { .. } => {
                check_shape(reference, symbol.shape, symbol.rank)?;
                Ok(format!("<{}>", reference.display_path()))
            }
            _ => match scope.pool.get(&reference.name) {
                Some(value) => index_value(reference, value),
                None => Err(ReferenceFailure::unresolved(&reference.name)),
            },
        }
    });

    Ok(PromptPreview {
        block_id,
        rendered,
        failures,
    })
}

/// Every name the block's prompt may reference, sorted by name.
pub fn available_variables(
    sequence: &Sequence,
    block_id: Uuid,
    global_lists: &[GlobalList],
) -> Result<Vec<VariableInfo>, EngineError> {
    let scope = BlockScope::build(sequence, block_id, &BTreeMap::new(), global_lists)?;

    let mut variables: BTreeMap<String, VariableInfo> = scope
        .table
        .iter()
        .filter(|(name, _)| !scope.not_yet_produced.contains(name.as_str()))
        .map(|(name, symbol)| {
            (
                name.clone(),
                VariableInfo {
                    name: name.clone(),
                    shape: symbol.shape,
                    rank: symbol.rank,
                    provenance: symbol.provenance.clone(),
                },
            )
        })
        .collect();

    for name in scope.variant.iteration_names() {
        variables.insert(
            name.clone(),
            VariableInfo {
                name,
                shape: ValueShape::Scalar,
                rank: 0,
                provenance: Provenance::Iteration {
                    block_name: scope.block.name.clone(),
                },
            },
        );
    }

    Ok(variables.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_protocol::block_models::{BlockConfig, BlockType, MultiListConfig};
    use sk_protocol::variable_models::{Variable, VariableType};

    fn block(name: &str, order: i64, block_type: BlockType, prompt: &str, output: &str) -> Block {
        Block {
            id: Uuid::new_v4(),
            sequence_id: Uuid::nil(),
            name: name.to_string(),
            block_type,
            order,
            model: None,
            prompt: prompt.to_string(),
            output_name: output.to_string(),
            config: BlockConfig::default(),
        }
    }

    fn sequence() -> Sequence {
        let mut fan = block(
            "grid",
            1,
            BlockType::MultiList,
            "{{item1}} x {{item2}} from {{item2_name}}",
            "grid",
        );
        fan.config.lists = vec![
            MultiListConfig {
                id: Uuid::new_v4(),
                list_name: "colors".into(),
                priority: 1,
            },
            MultiListConfig {
                id: Uuid::new_v4(),
                list_name: "shapes".into(),
                priority: 0,
            },
        ];
        Sequence {
            id: Uuid::new_v4(),
            name: "seq".into(),
            description: None,
            default_model: Some("mock".into()),
            chunk_size: None,
            preserve_sentences: false,
            loop_enabled: false,
            blocks: vec![
                block("intro", 0, BlockType::Standard, "Describe {{topic}}", "intro"),
                fan,
                block(
                    "final",
                    2,
                    BlockType::Standard,
                    "{{intro}} / {{grid[1][0]}} / {{colors[0]}} / {{later}}",
                    "final",
                ),
                block("later", 3, BlockType::Standard, "x", "later"),
            ],
            variables: vec![Variable {
                id: Uuid::new_v4(),
                sequence_id: None,
                name: "topic".into(),
                value: VariableValue::from("tea"),
                var_type: VariableType::Input,
                description: None,
                source_block_id: None,
                is_array: false,
                array_length: None,
            }],
        }
    }

    fn lists() -> Vec<GlobalList> {
        vec![
            GlobalList::new("colors", vec!["red".into(), "blue".into()]),
            GlobalList::new("shapes", vec!["circle".into()]),
        ]
    }

    #[test]
    fn test_preview_uses_seed_values_and_placeholders() {
        let seq = sequence();
        let final_id = seq.blocks[2].id;

        let preview = preview_block_prompt(&seq, final_id, &BTreeMap::new(), &lists()).unwrap();

        assert_eq!(preview.rendered, "<intro> / <grid[1][0]> / red / {{later}}");
        assert_eq!(preview.failures, vec![ReferenceFailure::unresolved("later")]);
        assert!(!preview.is_complete());
    }

    #[test]
    fn test_preview_fan_out_samples() {
        let seq = sequence();
        let grid_id = seq.blocks[1].id;

        let preview = preview_block_prompt(&seq, grid_id, &BTreeMap::new(), &lists()).unwrap();
        assert_eq!(preview.rendered, "red x circle from shapes");
        assert!(preview.is_complete());
    }

    #[test]
    fn test_preview_overrides_win() {
        let seq = sequence();
        let mut overrides = BTreeMap::new();
        overrides.insert("topic".to_string(), VariableValue::from("coffee"));

        let preview = preview_block_prompt(&seq, seq.blocks[0].id, &overrides, &[]).unwrap();
        assert_eq!(preview.rendered, "Describe coffee");
    }

    #[test]
    fn test_preview_unknown_block() {
        let result = preview_block_prompt(&sequence(), Uuid::nil(), &BTreeMap::new(), &[]);
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::UnknownBlock(_)))
        ));
    }

    #[test]
    fn test_available_variables() {
        let seq = sequence();
        let grid_id = seq.blocks[1].id;

        let variables = available_variables(&seq, grid_id, &lists()).unwrap();
        let names: Vec<_> = variables.iter().map(|v| v.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "colors",
                "intro",
                "item1",
                "item1_index",
                "item1_name",
                "item2",
                "item2_index",
                "item2_name",
                "shapes",
                "topic"
            ]
        );
        let intro = variables.iter().find(|v| v.name == "intro").unwrap();
        assert!(matches!(intro.provenance, Provenance::Block { .. }));
        assert!(!names.contains(&"grid"));
    }
}
