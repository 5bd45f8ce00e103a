//! Turns raw model responses into bound values.
//!
//! Materialization is all-or-nothing per block: either every output name of
//! the block gets a value or none does.

use crate::engine::block::BlockVariant;
use crate::engine::error::EngineError;
use serde_json::Value;
use sk_protocol::variable_models::{
    GlobalListAppend, Matrix, Variable, VariableType, VariableValue,
};
use uuid::Uuid;

/// Responses collected for one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutput {
    /// The single response of a standard or discretization block.
    Single(String),
    /// One response per call of a fan-out block, in combination order.
    /// `shape` holds one length per iterated list.
    Fanned { shape: Vec<usize>, outputs: Vec<String> },
}

/// Bind a block's responses to its output names.
pub fn materialize(
    block_name: &str,
    variant: &BlockVariant,
    raw: RawOutput,
) -> Result<Vec<(String, VariableValue)>, EngineError> {
    let malformed = |reason: String| EngineError::MalformedOutput {
        block: block_name.to_string(),
        reason,
    };

    match (variant, raw) {
        (BlockVariant::Standard { output_name }, RawOutput::Single(text)) => {
            Ok(vec![(output_name.clone(), VariableValue::Scalar(text))])
        }
        (
            BlockVariant::Discretization {
                output_names,
                delimiter,
            },
            RawOutput::Single(text),
        ) => {
            let segments = parse_discretized(&text, output_names, delimiter).map_err(malformed)?;
            Ok(output_names
                .iter()
                .cloned()
                .zip(segments.into_iter().map(VariableValue::Scalar))
                .collect())
        }
        (BlockVariant::SingleList { output_name, .. }, RawOutput::Fanned { outputs, .. }) => {
            Ok(vec![(output_name.clone(), VariableValue::List(outputs))])
        }
        (BlockVariant::MultiList { output_name, .. }, RawOutput::Fanned { shape, outputs }) => {
            let cells = outputs.len();
            let matrix = Matrix::new(shape.clone(), outputs).ok_or_else(|| {
                malformed(format!("{cells} results do not fill a matrix of shape {shape:?}"))
            })?;
            Ok(vec![(output_name.clone(), VariableValue::Matrix(matrix))])
        }
        (variant, _) => Err(malformed(format!(
            "unexpected response layout for a {} block",
            variant.block_type().as_str()
        ))),
    }
}

/// Split one response into exactly `names.len()` segments.
///
/// JSON is preferred: an object carrying every name is matched by name, any
/// other object or array of the right size positionally. The JSON may be the
/// whole response or embedded in surrounding prose; embedded JSON of the
/// wrong size is ignored. Without usable JSON the trimmed response is split
/// on `delimiter`. Every segment must be non-empty after trimming, and a JSON
/// `null` counts as empty.
pub fn parse_discretized(raw: &str, names: &[String], delimiter: &str) -> Result<Vec<String>, String> {
    let expected = names.len();

    for candidate in json_candidates(raw) {
        let (values, found): (Vec<String>, usize) = match &candidate.value {
            Value::Object(map) if names.iter().all(|name| map.contains_key(name)) => (
                names.iter().map(|name| json_text(&map[name.as_str()])).collect(),
                map.len(),
            ),
            Value::Object(map) => (map.values().map(json_text).collect(), map.len()),
            Value::Array(items) => (items.iter().map(json_text).collect(), items.len()),
            _ => continue,
        };
        if values.len() == expected {
            return non_empty(values);
        }
        if candidate.whole {
            return Err(if candidate.value.is_object() {
                format!("JSON object has {found} fields, expected {expected}")
            } else {
                format!("JSON array has {found} elements, expected {expected}")
            });
        }
    }

    let segments: Vec<String> = raw
        .trim()
        .split(delimiter)
        .map(|segment| segment.trim().to_string())
        .collect();

    let segments = non_empty(segments)?;
    if segments.len() == expected {
        Ok(segments)
    } else {
        Err(format!(
            "found {} segments, expected {expected}",
            segments.len()
        ))
    }
}

fn non_empty(segments: Vec<String>) -> Result<Vec<String>, String> {
    match segments.iter().position(String::is_empty) {
        Some(position) => Err(format!("segment {} is empty", position + 1)),
        None => Ok(segments),
    }
}

struct JsonCandidate {
    value: Value,
    /// The value is the entire response, not a snippet inside it.
    whole: bool,
}

fn json_candidates(raw: &str) -> Vec<JsonCandidate> {
    let mut candidates = Vec::new();
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        candidates.push(JsonCandidate { value, whole: true });
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (raw.find(open), raw.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&raw[start..=end]) {
                    candidates.push(JsonCandidate { value, whole: false });
                }
            }
        }
    }
    candidates
}

fn json_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}

/// The persisted output variable for a bound value.
pub fn variable_for(
    sequence_id: Uuid,
    block_id: Uuid,
    name: &str,
    value: &VariableValue,
) -> Variable {
    let array_length = match value {
        VariableValue::Scalar(_) => None,
        VariableValue::List(items) => Some(items.len()),
        VariableValue::Matrix(matrix) => Some(matrix.cells.len()),
    };
    Variable {
        id: Uuid::new_v4(),
        sequence_id: Some(sequence_id),
        name: name.to_string(),
        value: value.clone(),
        var_type: VariableType::Output,
        description: None,
        source_block_id: Some(block_id),
        is_array: array_length.is_some(),
        array_length,
    }
}

/// Flatten a block's bound values into a global list append.
///
/// Matrix dimensions are kept only when the block produced a single matrix.
pub fn global_list_append(block_id: Uuid, bindings: &[(String, VariableValue)]) -> GlobalListAppend {
    let dimensions = match bindings {
        [(_, VariableValue::Matrix(matrix))] => Some(matrix.dimensions()),
        _ => None,
    };
    GlobalListAppend {
        values: bindings.iter().flat_map(|(_, value)| value.flatten()).collect(),
        source_block_id: Some(block_id),
        dimensions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_protocol::variable_models::MatrixDimensions;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_delimited_segments() {
        let parsed = parse_discretized("  alpha \n beta\ngamma \n", &names(&["a", "b", "c"]), "\n");
        assert_eq!(parsed, Ok(names(&["alpha", "beta", "gamma"])));
    }

    #[test]
    fn test_empty_segment_is_malformed() {
        let parsed = parse_discretized("alpha\n\nbeta", &names(&["a", "b"]), "\n");
        assert_eq!(parsed, Err("segment 2 is empty".to_string()));
    }

    #[test]
    fn test_custom_delimiter() {
        let parsed = parse_discretized("x|y", &names(&["a", "b"]), "|");
        assert_eq!(parsed, Ok(names(&["x", "y"])));
    }

    #[test]
    fn test_wrong_segment_count_is_malformed() {
        let parsed = parse_discretized("only one line", &names(&["a", "b", "c"]), "\n");
        assert_eq!(parsed, Err("found 1 segments, expected 3".to_string()));
    }

    #[test]
    fn test_json_object_by_name() {
        let raw = r#"Sure! {"b": "second", "a": "first"}"#;
        let parsed = parse_discretized(raw, &names(&["a", "b"]), "\n");
        assert_eq!(parsed, Ok(names(&["first", "second"])));
    }

    #[test]
    fn test_json_object_positional_fallback() {
        let raw = r#"{"one": "x", "two": 2}"#;
        let parsed = parse_discretized(raw, &names(&["a", "b"]), "\n");
        assert_eq!(parsed, Ok(names(&["x", "2"])));
    }

    #[test]
    fn test_json_array_wrong_length_is_malformed() {
        let parsed = parse_discretized(r#"["x", "y"]"#, &names(&["a", "b", "c"]), "\n");
        assert_eq!(parsed, Err("JSON array has 2 elements, expected 3".to_string()));
    }

    #[test]
    fn test_embedded_json_of_wrong_size_falls_back_to_delimiter() {
        let parsed = parse_discretized("Use arrays like [1]\nSecond part", &names(&["a", "b"]), "\n");
        assert_eq!(parsed, Ok(names(&["Use arrays like [1]", "Second part"])));

        let parsed = parse_discretized("Config {\"k\": 1}\nDone", &names(&["a", "b"]), "\n");
        assert_eq!(parsed, Ok(names(&["Config {\"k\": 1}", "Done"])));
    }

    #[test]
    fn test_empty_json_values_are_malformed() {
        let parsed = parse_discretized(r#"{"a": "  ", "b": "x"}"#, &names(&["a", "b"]), "\n");
        assert_eq!(parsed, Err("segment 1 is empty".to_string()));

        let parsed = parse_discretized(r#"["x", null]"#, &names(&["a", "b"]), "\n");
        assert_eq!(parsed, Err("segment 2 is empty".to_string()));

        let parsed = parse_discretized(r#"Here: {"first": "x", "second": ""}"#, &names(&["a", "b"]), "\n");
        assert_eq!(parsed, Err("segment 2 is empty".to_string()));
    }

    #[test]
    fn test_materialize_discretization_binds_all_names() {
        let variant = BlockVariant::Discretization {
            output_names: names(&["a", "b"]),
            delimiter: "\n".into(),
        };
        let bindings = materialize("split", &variant, RawOutput::Single("x\ny".into())).unwrap();
        assert_eq!(
            bindings,
            vec![
                ("a".to_string(), VariableValue::from("x")),
                ("b".to_string(), VariableValue::from("y")),
            ]
        );

        let error = materialize("split", &variant, RawOutput::Single("x".into())).unwrap_err();
        assert!(matches!(error, EngineError::MalformedOutput { ref block, .. } if block == "split"));
    }

    #[test]
    fn test_materialize_multi_list_matrix() {
        let variant = BlockVariant::MultiList {
            lists: Vec::new(),
            output_name: "grid".into(),
        };
        let raw = RawOutput::Fanned {
            shape: vec![2, 3],
            outputs: names(&["1", "2", "3", "4", "5", "6"]),
        };
        let bindings = materialize("m", &variant, raw).unwrap();
        let append = global_list_append(Uuid::nil(), &bindings);
        assert_eq!(append.values.len(), 6);
        assert_eq!(append.dimensions, Some(MatrixDimensions { rows: 2, cols: 3 }));

        let variable = variable_for(Uuid::nil(), Uuid::nil(), "grid", &bindings[0].1);
        assert!(variable.is_array);
        assert_eq!(variable.array_length, Some(6));
    }

    #[test]
    fn test_empty_fan_out_materializes_empty() {
        let variant = BlockVariant::SingleList {
            input_list: "xs".into(),
            output_name: "ys".into(),
        };
        let raw = RawOutput::Fanned {
            shape: vec![0],
            outputs: Vec::new(),
        };
        let bindings = materialize("s", &variant, raw).unwrap();
        assert_eq!(bindings, vec![("ys".to_string(), VariableValue::List(Vec::new()))]);
    }
}
