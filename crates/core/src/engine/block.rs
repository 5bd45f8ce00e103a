//! Typed view of a block's configuration.
//!
//! [`Block`] keeps every config field optional so it can be read from any
//! YAML file. Before execution each block is checked into a [`BlockVariant`],
//! which carries exactly the fields its type needs.

use crate::engine::error::ConfigError;
use sk_protocol::block_models::{Block, BlockType};

const DEFAULT_DELIMITER: &str = "\n";

/// One input axis of a multi-list block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAxis {
    pub list_name: String,
    pub priority: u32,
    /// 1-based position in the block's config, used for `itemN` names.
    pub declared_position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockVariant {
    Standard {
        output_name: String,
    },
    Discretization {
        output_names: Vec<String>,
        delimiter: String,
    },
    SingleList {
        input_list: String,
        output_name: String,
    },
    /// `lists` is in iteration order: the first axis is the outermost loop
    /// and the last axis varies fastest.
    MultiList {
        lists: Vec<ListAxis>,
        output_name: String,
    },
}

impl BlockVariant {
    pub fn from_block(block: &Block) -> Result<Self, ConfigError> {
        let missing = |field: &'static str| ConfigError::MissingField {
            block: block.name.clone(),
            field,
        };
        let output_name = || {
            if block.output_name.trim().is_empty() {
                Err(missing("output_name"))
            } else {
                Ok(block.output_name.clone())
            }
        };

        match block.block_type {
            BlockType::Standard => Ok(Self::Standard {
                output_name: output_name()?,
            }),
            BlockType::Discretization => {
                let expected = block
                    .config
                    .number_of_outputs
                    .filter(|count| *count > 0)
                    .ok_or_else(|| missing("number_of_outputs"))?;
                let names = &block.config.output_variable_names;
                if names.len() != expected {
                    return Err(ConfigError::OutputCountMismatch {
                        block: block.name.clone(),
                        expected,
                        found: names.len(),
                    });
                }
                if names.iter().any(|name| name.trim().is_empty()) {
                    return Err(missing("output_variable_names"));
                }
                let delimiter = block
                    .config
                    .segment_delimiter
                    .clone()
                    .filter(|delimiter| !delimiter.is_empty())
                    .unwrap_or_else(|| DEFAULT_DELIMITER.to_string());
                Ok(Self::Discretization {
                    output_names: names.clone(),
                    delimiter,
                })
            }
            BlockType::SingleList => {
                let input_list = block
                    .config
                    .input_list_name
                    .clone()
                    .filter(|name| !name.trim().is_empty())
                    .ok_or_else(|| missing("input_list_name"))?;
                Ok(Self::SingleList {
                    input_list,
                    output_name: output_name()?,
                })
            }
            BlockType::MultiList => {
                if block.config.lists.is_empty() {
                    return Err(missing("lists"));
                }
                let mut lists: Vec<ListAxis> = block
                    .config
                    .lists
                    .iter()
                    .enumerate()
                    .map(|(i, list)| ListAxis {
                        list_name: list.list_name.clone(),
                        priority: list.priority,
                        declared_position: i + 1,
                    })
                    .collect();
                if lists.iter().any(|axis| axis.list_name.trim().is_empty()) {
                    return Err(missing("lists[].list_name"));
                }
                // Highest priority is outermost. Among equal priorities the
                // earlier-declared list varies fastest.
                lists.sort_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then(b.declared_position.cmp(&a.declared_position))
                });
                Ok(Self::MultiList {
                    lists,
                    output_name: output_name()?,
                })
            }
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Standard { .. } => BlockType::Standard,
            Self::Discretization { .. } => BlockType::Discretization,
            Self::SingleList { .. } => BlockType::SingleList,
            Self::MultiList { .. } => BlockType::MultiList,
        }
    }

    pub fn output_names(&self) -> Vec<&str> {
        match self {
            Self::Discretization { output_names, .. } => {
                output_names.iter().map(String::as_str).collect()
            }
            Self::Standard { output_name }
            | Self::SingleList { output_name, .. }
            | Self::MultiList { output_name, .. } => vec![output_name.as_str()],
        }
    }

    /// Names of the list variables the block iterates.
    pub fn input_lists(&self) -> Vec<&str> {
        match self {
            Self::SingleList { input_list, .. } => vec![input_list.as_str()],
            Self::MultiList { lists, .. } => lists.iter().map(|axis| axis.list_name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Per-call names the prompt may reference besides pool variables.
    pub fn iteration_names(&self) -> Vec<String> {
        match self {
            Self::SingleList { .. } => vec!["item".to_string(), "item_index".to_string()],
            Self::MultiList { lists, .. } => lists
                .iter()
                .flat_map(|axis| {
                    let n = axis.declared_position;
                    [
                        format!("item{n}"),
                        format!("item{n}_index"),
                        format!("item{n}_name"),
                    ]
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_protocol::block_models::{BlockConfig, MultiListConfig};
    use uuid::Uuid;

    fn block(block_type: BlockType, config: BlockConfig) -> Block {
        Block {
            id: Uuid::new_v4(),
            sequence_id: Uuid::nil(),
            name: "b".to_string(),
            block_type,
            order: 0,
            model: None,
            prompt: "p".to_string(),
            output_name: "out".to_string(),
            config,
        }
    }

    fn list(name: &str, priority: u32) -> MultiListConfig {
        MultiListConfig {
            id: Uuid::new_v4(),
            list_name: name.to_string(),
            priority,
        }
    }

    #[test]
    fn test_standard_requires_output_name() {
        let mut b = block(BlockType::Standard, BlockConfig::default());
        b.output_name = " ".to_string();
        assert_eq!(
            BlockVariant::from_block(&b),
            Err(ConfigError::MissingField {
                block: "b".into(),
                field: "output_name"
            })
        );
    }

    #[test]
    fn test_discretization_count_must_match_names() {
        let config = BlockConfig {
            number_of_outputs: Some(3),
            output_variable_names: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        assert!(matches!(
            BlockVariant::from_block(&block(BlockType::Discretization, config)),
            Err(ConfigError::OutputCountMismatch {
                expected: 3,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_discretization_defaults_to_newline() {
        let config = BlockConfig {
            number_of_outputs: Some(2),
            output_variable_names: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        let variant = BlockVariant::from_block(&block(BlockType::Discretization, config)).unwrap();
        assert!(matches!(variant, BlockVariant::Discretization { ref delimiter, .. } if delimiter == "\n"));
        assert_eq!(variant.output_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_single_list_requires_input() {
        let result = BlockVariant::from_block(&block(BlockType::SingleList, BlockConfig::default()));
        assert!(matches!(
            result,
            Err(ConfigError::MissingField {
                field: "input_list_name",
                ..
            })
        ));
    }

    #[test]
    fn test_multi_list_orders_axes_by_priority() {
        let config = BlockConfig {
            lists: vec![list("inner", 0), list("outer", 1)],
            ..Default::default()
        };
        let variant = BlockVariant::from_block(&block(BlockType::MultiList, config)).unwrap();
        let BlockVariant::MultiList { lists, .. } = &variant else {
            panic!("expected multi list");
        };
        let names: Vec<_> = lists.iter().map(|a| a.list_name.as_str()).collect();
        assert_eq!(names, vec!["outer", "inner"]);
        assert_eq!(lists[0].declared_position, 2);
        assert!(variant.iteration_names().contains(&"item2_name".to_string()));
    }

    #[test]
    fn test_multi_list_equal_priority_keeps_first_fastest() {
        let config = BlockConfig {
            lists: vec![list("first", 0), list("second", 0)],
            ..Default::default()
        };
        let variant = BlockVariant::from_block(&block(BlockType::MultiList, config)).unwrap();
        assert_eq!(variant.input_lists(), vec!["second", "first"]);
    }
}
