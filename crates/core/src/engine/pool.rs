//! The per-run variable pool.
//!
//! Seeded once when a run starts, then grown by block outputs. Entries are
//! write-once: a block can only bind a name nobody else holds, except a name
//! seeded from a global list, which sequence-scoped values shadow.

use serde::Serialize;
use sk_protocol::variable_models::{GlobalList, Matrix, Variable, VariableType, VariableValue};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Where a pool entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    GlobalList,
    SequenceVariable { var_type: VariableType },
    Override,
    /// `<name>_chunks` derived from a long scalar input.
    Chunked { source: String },
    Block { block_id: Uuid, block_name: String, order: i64 },
    /// Per-call names of a fan-out block, such as `item` or `item2_name`.
    Iteration { block_name: String },
}

impl Provenance {
    pub fn is_global_list(&self) -> bool {
        matches!(self, Self::GlobalList)
    }

    /// Short human description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::GlobalList => "a global list".to_string(),
            Self::SequenceVariable { .. } => "a sequence variable".to_string(),
            Self::Override => "a run override".to_string(),
            Self::Chunked { source } => format!("the chunks of '{source}'"),
            Self::Block { block_name, .. } => format!("block '{block_name}'"),
            Self::Iteration { block_name } => format!("the iteration of block '{block_name}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub value: VariableValue,
    pub provenance: Provenance,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("'{name}' is already bound by {existing}")]
    AlreadyBound { name: String, existing: String },
}

#[derive(Debug, Clone, Default)]
pub struct VariablePool {
    entries: BTreeMap<String, PoolEntry>,
}

impl VariablePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pool for a new run.
    ///
    /// Precedence, lowest first: global lists, sequence variables, overrides.
    /// Output-type sequence variables are left out; they belong to earlier
    /// runs.
    pub fn seeded(
        global_lists: &[GlobalList],
        variables: &[Variable],
        overrides: &BTreeMap<String, VariableValue>,
    ) -> Self {
        let mut pool = Self::new();

        for list in global_lists {
            pool.entries.insert(
                list.name.clone(),
                PoolEntry {
                    value: global_list_value(list),
                    provenance: Provenance::GlobalList,
                },
            );
        }

        for variable in variables
            .iter()
            .filter(|variable| variable.var_type != VariableType::Output)
        {
            pool.entries.insert(
                variable.name.clone(),
                PoolEntry {
                    value: variable.value.clone(),
                    provenance: Provenance::SequenceVariable {
                        var_type: variable.var_type,
                    },
                },
            );
        }

        for (name, value) in overrides {
            pool.entries.insert(
                name.clone(),
                PoolEntry {
                    value: value.clone(),
                    provenance: Provenance::Override,
                },
            );
        }

        pool
    }

    /// Bind a value, refusing to overwrite anything but a global list.
    pub fn bind(
        &mut self,
        name: impl Into<String>,
        value: VariableValue,
        provenance: Provenance,
    ) -> Result<(), PoolError> {
        let name = name.into();
        if let Some(existing) = self.entries.get(&name) {
            if !existing.provenance.is_global_list() {
                return Err(PoolError::AlreadyBound {
                    name,
                    existing: existing.provenance.describe(),
                });
            }
        }
        self.entries.insert(name, PoolEntry { value, provenance });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.entries.get(name).map(|entry| &entry.value)
    }

    pub fn entry(&self, name: &str) -> Option<&PoolEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PoolEntry)> {
        self.entries.iter()
    }

    /// Plain values by name.
    pub fn snapshot(&self) -> BTreeMap<String, VariableValue> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value.clone()))
            .collect()
    }
}

/// Pool value of a global list: a matrix when it carries consistent
/// dimensions, a plain list otherwise.
pub fn global_list_value(list: &GlobalList) -> VariableValue {
    list.matrix_dimensions
        .and_then(|dims| Matrix::new(vec![dims.rows, dims.cols], list.values.clone()))
        .map_or_else(|| VariableValue::List(list.values.clone()), VariableValue::Matrix)
}
