//! Test fixtures for creating sample sequences, engines and projects.

use sk_core::engine::{EngineSettings, RunRequest, SequenceEngine};
use sk_core::providers::ModelProvider;
use sk_core::store::InMemoryStore;
use sk_protocol::block_models::{Block, BlockConfig, BlockType, MultiListConfig};
use sk_protocol::ipc::Event;
use sk_protocol::run_models::Run;
use sk_protocol::sequence_models::Sequence;
use sk_protocol::variable_models::{GlobalList, Variable, VariableType, VariableValue};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const MOCK_MODEL: &str = "mock-model";

/// A standard block writing to `output_name`.
pub fn standard_block(name: &str, order: i64, prompt: &str, output_name: &str) -> Block {
    Block {
        id: Uuid::new_v4(),
        sequence_id: Uuid::nil(),
        name: name.to_string(),
        block_type: BlockType::Standard,
        order,
        model: None,
        prompt: prompt.to_string(),
        output_name: output_name.to_string(),
        config: BlockConfig::default(),
    }
}

#[allow(dead_code)]
pub fn discretization_block(name: &str, order: i64, prompt: &str, outputs: &[&str]) -> Block {
    let mut block = standard_block(name, order, prompt, "");
    block.block_type = BlockType::Discretization;
    block.config.number_of_outputs = Some(outputs.len());
    block.config.output_variable_names = outputs.iter().map(|s| s.to_string()).collect();
    block
}

#[allow(dead_code)]
pub fn single_list_block(name: &str, order: i64, prompt: &str, list: &str, output: &str) -> Block {
    let mut block = standard_block(name, order, prompt, output);
    block.block_type = BlockType::SingleList;
    block.config.input_list_name = Some(list.to_string());
    block
}

/// A multi-list block; `lists` pairs each list name with its priority.
#[allow(dead_code)]
pub fn multi_list_block(
    name: &str,
    order: i64,
    prompt: &str,
    lists: &[(&str, u32)],
    output: &str,
) -> Block {
    let mut block = standard_block(name, order, prompt, output);
    block.block_type = BlockType::MultiList;
    block.config.lists = lists
        .iter()
        .map(|(list_name, priority)| MultiListConfig {
            id: Uuid::new_v4(),
            list_name: list_name.to_string(),
            priority: *priority,
        })
        .collect();
    block
}

#[allow(dead_code)]
pub fn input_variable(name: &str, value: impl Into<VariableValue>) -> Variable {
    Variable {
        id: Uuid::new_v4(),
        sequence_id: None,
        name: name.to_string(),
        value: value.into(),
        var_type: VariableType::Input,
        description: None,
        source_block_id: None,
        is_array: false,
        array_length: None,
    }
}

/// A sequence using [`MOCK_MODEL`] with blocks attached to it.
pub fn create_test_sequence(name: &str, blocks: Vec<Block>) -> Sequence {
    let id = Uuid::new_v4();
    Sequence {
        id,
        name: name.to_string(),
        description: None,
        default_model: Some(MOCK_MODEL.to_string()),
        chunk_size: None,
        preserve_sentences: false,
        loop_enabled: false,
        blocks: blocks
            .into_iter()
            .map(|block| Block {
                sequence_id: id,
                ..block
            })
            .collect(),
        variables: Vec::new(),
    }
}

#[allow(dead_code)]
pub fn global_list(name: &str, values: &[&str]) -> GlobalList {
    GlobalList::new(name, values.iter().map(|s| s.to_string()).collect())
}

/// An engine over a store seeded with `sequence` and `lists`.
pub fn create_test_engine(
    provider: Arc<dyn ModelProvider>,
    sequence: &Sequence,
    lists: Vec<GlobalList>,
    max_concurrency: usize,
) -> (Arc<SequenceEngine>, InMemoryStore) {
    let store = InMemoryStore::seeded(vec![sequence.clone()], lists);
    let engine = SequenceEngine::new(
        provider,
        Arc::new(store.clone()),
        EngineSettings {
            default_model: None,
            max_concurrency,
        },
    );
    (Arc::new(engine), store)
}

/// Run `request` to completion and return the run with every event it emitted.
#[allow(dead_code)]
pub async fn run_collecting(engine: &SequenceEngine, request: RunRequest) -> (Run, Vec<Event>) {
    let (tx, mut rx) = mpsc::channel(1000);
    let run = engine
        .run(request, tx)
        .await
        .expect("Run should be created");

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (run, events)
}

/// Create a temporary project directory with `.sequence-kit` configuration.
///
/// Returns a TempDir that must be kept alive for the test duration.
#[allow(dead_code)]
pub fn create_test_project() -> std::io::Result<TempDir> {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().join(".sequence-kit");

    std::fs::create_dir_all(root.join("sequences"))?;
    std::fs::create_dir_all(root.join("lists"))?;

    std::fs::write(
        root.join("config.toml"),
        "default_model = \"mock-model\"\nmax_concurrency = 2\n",
    )?;

    let sequence_yaml = r#"
name: country-facts
variables:
  - name: audience
    type: input
    value: "students"
blocks:
  - name: facts
    block_type: single_list
    order: 0
    prompt: "One fact about {{ item }} for {{ audience }}"
    output_name: facts
    config:
      input_list_name: countries
  - name: summary
    block_type: standard
    order: 1
    prompt: "Summarize {{ facts }}"
    output_name: summary
"#;
    std::fs::write(root.join("sequences/country-facts.yaml"), sequence_yaml)?;
    std::fs::write(
        root.join("lists/countries.yaml"),
        "name: countries\nvalues: [France, Japan, Peru]\n",
    )?;

    Ok(temp_dir)
}
