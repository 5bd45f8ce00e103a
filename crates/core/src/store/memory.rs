use super::{Store, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use sk_protocol::run_models::{BlockRun, Run};
use sk_protocol::sequence_models::Sequence;
use sk_protocol::variable_models::{GlobalList, GlobalListAppend, Variable};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Process-local [`Store`] backed by concurrent maps.
///
/// Cloning is cheap and every clone sees the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    sequences: Arc<DashMap<Uuid, Sequence>>,
    global_lists: Arc<DashMap<String, GlobalList>>,
    variables: Arc<DashMap<(Uuid, String), Variable>>,
    runs: Arc<DashMap<Uuid, Run>>,
    block_runs: Arc<DashMap<Uuid, BlockRun>>,
    block_runs_by_run: Arc<DashMap<Uuid, Vec<Uuid>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with sequences and global lists.
    pub fn seeded(sequences: Vec<Sequence>, lists: Vec<GlobalList>) -> Self {
        let store = Self::new();
        for sequence in sequences {
            store.sequences.insert(sequence.id, sequence);
        }
        for list in lists {
            store.global_lists.insert(list.name.clone(), list);
        }
        store
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_sequence(&self, id: Uuid) -> StoreResult<Option<Sequence>> {
        Ok(self.sequences.get(&id).map(|entry| entry.value().clone()))
    }

    async fn save_sequence(&self, sequence: Sequence) -> StoreResult<()> {
        self.sequences.insert(sequence.id, sequence);
        Ok(())
    }

    async fn list_sequences(&self) -> StoreResult<Vec<Sequence>> {
        let mut sequences: Vec<Sequence> = self
            .sequences
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sequences.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sequences)
    }

    async fn list_global_lists(&self) -> StoreResult<Vec<GlobalList>> {
        let mut lists: Vec<GlobalList> = self
            .global_lists
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        lists.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(lists)
    }

    async fn get_global_list(&self, name: &str) -> StoreResult<Option<GlobalList>> {
        Ok(self.global_lists.get(name).map(|entry| entry.value().clone()))
    }

    async fn save_global_list(&self, list: GlobalList) -> StoreResult<()> {
        self.global_lists.insert(list.name.clone(), list);
        Ok(())
    }

    async fn append_to_global_list(
        &self,
        name: &str,
        append: GlobalListAppend,
    ) -> StoreResult<GlobalList> {
        let added = append.values.len();
        let mut entry = self
            .global_lists
            .entry(name.to_string())
            .or_insert_with(|| GlobalList::new(name, Vec::new()));
        entry.append(append);
        debug!(list = name, added, total = entry.values.len(), "appended to global list");
        Ok(entry.value().clone())
    }

    async fn upsert_variable(&self, variable: Variable) -> StoreResult<()> {
        let scope = variable.sequence_id.unwrap_or_else(Uuid::nil);
        self.variables.insert((scope, variable.name.clone()), variable);
        Ok(())
    }

    async fn list_variables(&self, sequence_id: Uuid) -> StoreResult<Vec<Variable>> {
        let mut variables: Vec<Variable> = self
            .variables
            .iter()
            .filter(|entry| entry.key().0 == sequence_id)
            .map(|entry| entry.value().clone())
            .collect();
        variables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(variables)
    }

    async fn upsert_run(&self, run: &Run) -> StoreResult<()> {
        self.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> StoreResult<Option<Run>> {
        Ok(self.runs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_runs(&self, sequence_id: Option<Uuid>) -> StoreResult<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .filter(|entry| sequence_id.map_or(true, |id| entry.value().sequence_id == id))
            .map(|entry| entry.value().clone())
            .collect();
        runs.sort_by_key(|run| run.created_at);
        Ok(runs)
    }

    async fn upsert_block_run(&self, block_run: &BlockRun) -> StoreResult<()> {
        let is_new = self
            .block_runs
            .insert(block_run.id, block_run.clone())
            .is_none();
        if is_new {
            self.block_runs_by_run
                .entry(block_run.run_id)
                .or_default()
                .push(block_run.id);
        }
        Ok(())
    }

    async fn get_block_run(&self, id: Uuid) -> StoreResult<Option<BlockRun>> {
        Ok(self.block_runs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_block_runs(&self, run_id: Uuid) -> StoreResult<Vec<BlockRun>> {
        let ids = self
            .block_runs_by_run
            .get(&run_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        Ok(ids
            .iter()
            .filter_map(|id| self.block_runs.get(id).map(|entry| entry.value().clone()))
            .collect())
    }
}
