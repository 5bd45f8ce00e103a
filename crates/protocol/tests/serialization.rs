use sk_protocol::*;
use uuid::Uuid;

#[test]
fn test_sequence_deserialization_from_yaml() {
    let yaml_str = r#"
name: product-review
default_model: claude-3-haiku
chunk_size: 200
preserve_sentences: true
variables:
  - name: product
    type: input
    value: "a kettle"
  - name: tones
    type: list
    value: [friendly, formal]
blocks:
  - name: claims
    block_type: discretization
    order: 0
    prompt: "Three claims about {{ product }}"
    config:
      number_of_outputs: 3
      output_variable_names: [claim_a, claim_b, claim_c]
  - name: rewrite
    block_type: multi_list
    order: 1
    prompt: "Rewrite {{ item1 }} in a {{ item2 }} tone"
    output_name: rewrites
    config:
      lists:
        - list_name: claims_list
          priority: 2
        - list_name: tones
"#;

    let sequence: Sequence =
        serde_yaml::from_str(yaml_str).expect("Failed to deserialize Sequence");

    assert_eq!(sequence.name, "product-review");
    assert_eq!(sequence.default_model.as_deref(), Some("claude-3-haiku"));
    assert_eq!(sequence.variables.len(), 2);
    assert_eq!(sequence.variables[0].var_type, VariableType::Input);
    assert_eq!(
        sequence.variables[1].value,
        VariableValue::List(vec!["friendly".into(), "formal".into()])
    );

    let blocks = sequence.ordered_blocks();
    assert_eq!(blocks[0].block_type, BlockType::Discretization);
    assert_eq!(
        blocks[0].produced_names(),
        vec!["claim_a", "claim_b", "claim_c"]
    );
    assert_eq!(blocks[1].block_type, BlockType::MultiList);
    assert_eq!(blocks[1].config.lists[0].priority, 2);
    assert_eq!(blocks[1].config.lists[1].priority, 0);

    let chunking = sequence.chunking().expect("chunking should be enabled");
    assert_eq!(chunking.chunk_size, 200);
    assert!(chunking.preserve_sentences);
    assert!(!chunking.loop_enabled);
}

#[test]
fn test_block_type_serialization() {
    let json = serde_json::to_value(BlockType::SingleList).expect("Failed to serialize BlockType");
    assert_eq!(json, "single_list");

    let parsed: BlockType =
        serde_json::from_value(serde_json::json!("multi_list")).expect("Failed to deserialize");
    assert_eq!(parsed, BlockType::MultiList);
}

#[test]
fn test_variable_value_untagged_forms() {
    let scalar: VariableValue = serde_json::from_str("\"text\"").unwrap();
    assert_eq!(scalar.shape(), ValueShape::Scalar);

    let list: VariableValue = serde_json::from_str("[\"a\", \"b\"]").unwrap();
    assert_eq!(list.as_list(), Some(&["a".to_string(), "b".to_string()][..]));

    let matrix: VariableValue =
        serde_json::from_str(r#"{"shape": [2, 2], "cells": ["a", "b", "c", "d"]}"#).unwrap();
    match matrix {
        VariableValue::Matrix(matrix) => {
            assert_eq!(matrix.get(&[1, 0]).unwrap(), "c");
            assert_eq!(
                matrix.to_nested_json(),
                serde_json::json!([["a", "b"], ["c", "d"]])
            );
        }
        other => panic!("Expected a matrix, got {other:?}"),
    }
}

#[test]
fn test_matrix_with_missing_cells_is_rejected() {
    let result: Result<VariableValue, _> =
        serde_json::from_str(r#"{"shape": [2, 2], "cells": ["a"]}"#);
    assert!(result.is_err());

    let result: Result<Matrix, _> = serde_json::from_str(r#"{"shape": [], "cells": []}"#);
    assert!(result.is_err());
}

#[test]
fn test_run_status_serialization() {
    let json = serde_json::to_value(RunStatus::Running).expect("Failed to serialize RunStatus");
    assert_eq!(json, "running");

    let kind = serde_json::to_value(FailureKind::UnresolvedVariable).unwrap();
    assert_eq!(kind, "unresolved_variable");
}

#[test]
fn test_event_serialization() {
    let run_id = Uuid::new_v4();
    let event = Event::RunStatusUpdate {
        run_id,
        status: RunStatus::Running,
        block_index: 2,
        progress_percentage: 50.0,
    };

    let json = serde_json::to_value(&event).expect("Failed to serialize Event");
    assert_eq!(json["type"], "runStatusUpdate");
    assert_eq!(json["payload"]["run_id"], run_id.to_string());
    assert_eq!(json["payload"]["status"], "running");
    assert_eq!(json["payload"]["block_index"], 2);

    let back: Event = serde_json::from_value(json).expect("Failed to deserialize Event");
    assert_eq!(back.run_id(), run_id);
    assert!(!back.is_terminal());

    let error = Event::RunError {
        run_id,
        kind: FailureKind::Cancelled,
        error: "Run cancelled".to_string(),
    };
    assert!(error.is_terminal());
    let json = serde_json::to_value(&error).unwrap();
    assert_eq!(json["type"], "runError");
    assert_eq!(json["payload"]["kind"], "cancelled");
}

#[test]
fn test_global_config_defaults() {
    let config: GlobalConfig = serde_json::from_str("{}").expect("Empty config should parse");
    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.max_concurrency, 4);
    assert!(config.providers.is_empty());
}

#[test]
fn test_global_list_matrix_append() {
    let mut list = GlobalList::new("grid", Vec::new());
    let block_id = Uuid::new_v4();

    list.append(GlobalListAppend {
        values: vec!["a".into(), "b".into()],
        source_block_id: Some(block_id),
        dimensions: Some(MatrixDimensions { rows: 1, cols: 2 }),
    });
    list.append(GlobalListAppend {
        values: vec!["c".into(), "d".into()],
        source_block_id: None,
        dimensions: Some(MatrixDimensions { rows: 1, cols: 2 }),
    });

    assert_eq!(
        list.matrix_dimensions,
        Some(MatrixDimensions { rows: 2, cols: 2 })
    );
    assert_eq!(list.source_block_id, Some(block_id));

    list.append(GlobalListAppend {
        values: vec!["loose".into()],
        source_block_id: None,
        dimensions: None,
    });
    assert!(!list.is_matrix());
    assert_eq!(list.values.len(), 5);
}

#[test]
fn test_block_run_effective_output_prefers_edit() {
    let mut block_run = BlockRun {
        id: Uuid::new_v4(),
        run_id: Uuid::new_v4(),
        block_id: Uuid::new_v4(),
        block_name: "b".to_string(),
        block_type: BlockType::Standard,
        combination: Vec::new(),
        input: "prompt".to_string(),
        output: Some("original".to_string()),
        edited_output: None,
        edit_history: Vec::new(),
        status: RunStatus::Completed,
        error_message: None,
        execution_time_ms: 3,
        token_usage: None,
        cost_estimate: None,
        started_at: chrono::Utc::now(),
        completed_at: None,
    };
    assert_eq!(block_run.effective_output(), Some("original"));

    block_run.edited_output = Some("better".to_string());
    assert_eq!(block_run.effective_output(), Some("better"));
    assert_eq!(block_run.output.as_deref(), Some("original"));
}
