//! Persistence capability.
//!
//! The engine reads sequences and global lists through [`Store`] and writes
//! run state, block runs, output variables and global list appends back
//! through it. [`InMemoryStore`] is the bundled implementation.

pub mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use sk_protocol::run_models::{BlockRun, Run};
use sk_protocol::sequence_models::Sequence;
use sk_protocol::variable_models::{GlobalList, GlobalListAppend, Variable};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_sequence(&self, id: Uuid) -> StoreResult<Option<Sequence>>;
    async fn save_sequence(&self, sequence: Sequence) -> StoreResult<()>;
    async fn list_sequences(&self) -> StoreResult<Vec<Sequence>>;

    async fn list_global_lists(&self) -> StoreResult<Vec<GlobalList>>;
    async fn get_global_list(&self, name: &str) -> StoreResult<Option<GlobalList>>;
    async fn save_global_list(&self, list: GlobalList) -> StoreResult<()>;

    /// Append to the named list, creating it when absent.
    async fn append_to_global_list(
        &self,
        name: &str,
        append: GlobalListAppend,
    ) -> StoreResult<GlobalList>;

    /// Insert or replace a variable, keyed by its sequence and name.
    async fn upsert_variable(&self, variable: Variable) -> StoreResult<()>;
    async fn list_variables(&self, sequence_id: Uuid) -> StoreResult<Vec<Variable>>;

    async fn upsert_run(&self, run: &Run) -> StoreResult<()>;
    async fn get_run(&self, id: Uuid) -> StoreResult<Option<Run>>;
    /// Runs ordered by creation time, optionally restricted to one sequence.
    async fn list_runs(&self, sequence_id: Option<Uuid>) -> StoreResult<Vec<Run>>;

    async fn upsert_block_run(&self, block_run: &BlockRun) -> StoreResult<()>;
    async fn get_block_run(&self, id: Uuid) -> StoreResult<Option<BlockRun>>;
    /// Block runs of a run in the order they were first written.
    async fn list_block_runs(&self, run_id: Uuid) -> StoreResult<Vec<BlockRun>>;
}
