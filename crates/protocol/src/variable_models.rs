//! Variable and global list models.
//!
//! Values visible to a prompt template come in three shapes: a scalar
//! string, an ordered list of strings, or a matrix of strings addressed by
//! one index per axis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

/// Where a variable comes from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    /// User-defined constant.
    Global,
    /// User-defined list.
    List,
    /// Produced by a block during a run.
    Output,
    /// Expected at run time, possibly overridden when the run starts.
    Input,
}

/// Shape of a value, used to type-check references before resolution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    Scalar,
    List,
    Matrix,
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::List => write!(f, "list"),
            Self::Matrix => write!(f, "matrix"),
        }
    }
}

/// Row/column shape attached to matrix-backed lists.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
pub struct MatrixDimensions {
    pub rows: usize,
    pub cols: usize,
}

/// A dense, row-major matrix of strings.
///
/// `shape` holds one length per axis; the last axis varies fastest in
/// `cells`. Multi-list blocks produce one axis per input list. Deserialized
/// matrices go through [`Matrix::new`], so a cell count that does not match
/// the shape is rejected.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(try_from = "RawMatrix")]
pub struct Matrix {
    pub shape: Vec<usize>,
    pub cells: Vec<String>,
}

#[derive(Deserialize)]
struct RawMatrix {
    shape: Vec<usize>,
    cells: Vec<String>,
}

impl TryFrom<RawMatrix> for Matrix {
    type Error = String;

    fn try_from(raw: RawMatrix) -> Result<Self, Self::Error> {
        let cells = raw.cells.len();
        let shape = raw.shape.clone();
        Matrix::new(raw.shape, raw.cells)
            .ok_or_else(|| format!("{cells} cells do not fill a matrix of shape {shape:?}"))
    }
}

impl Matrix {
    /// Build a matrix, returning `None` when the cell count does not match the shape.
    pub fn new(shape: Vec<usize>, cells: Vec<String>) -> Option<Self> {
        let expected: usize = shape.iter().product();
        if shape.is_empty() || expected != cells.len() {
            return None;
        }
        Some(Self { shape, cells })
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Row-major offset of a full index, or the first offending axis.
    pub fn offset(&self, index: &[usize]) -> Result<usize, MatrixIndexError> {
        if index.len() != self.shape.len() {
            return Err(MatrixIndexError::Rank {
                expected: self.shape.len(),
                found: index.len(),
            });
        }
        let mut offset = 0;
        for (axis, (&i, &len)) in index.iter().zip(self.shape.iter()).enumerate() {
            if i >= len {
                return Err(MatrixIndexError::OutOfRange {
                    axis,
                    index: i,
                    len,
                });
            }
            offset = offset * len + i;
        }
        Ok(offset)
    }

    pub fn get(&self, index: &[usize]) -> Result<&str, MatrixIndexError> {
        let offset = self.offset(index)?;
        self.cells
            .get(offset)
            .map(String::as_str)
            .ok_or(MatrixIndexError::MissingCell {
                offset,
                len: self.cells.len(),
            })
    }

    /// Collapse the shape to rows x cols (all leading axes become rows).
    pub fn dimensions(&self) -> MatrixDimensions {
        let cols = self.shape.last().copied().unwrap_or(0);
        let rows = if self.shape.len() > 1 {
            self.shape[..self.shape.len() - 1].iter().product()
        } else {
            1
        };
        MatrixDimensions { rows, cols }
    }

    /// Nested JSON array form, one nesting level per axis.
    pub fn to_nested_json(&self) -> serde_json::Value {
        fn nest(shape: &[usize], cells: &[String]) -> serde_json::Value {
            match shape.split_first() {
                None => serde_json::Value::Array(Vec::new()),
                Some((_, [])) => serde_json::Value::Array(
                    cells.iter().cloned().map(serde_json::Value::String).collect(),
                ),
                Some((&len, rest)) => {
                    let stride: usize = rest.iter().product();
                    serde_json::Value::Array(
                        (0..len)
                            .map(|i| {
                                let row = cells.get(i * stride..(i + 1) * stride).unwrap_or(&[]);
                                nest(rest, row)
                            })
                            .collect(),
                    )
                }
            }
        }
        nest(&self.shape, &self.cells)
    }
}

/// Why a matrix lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixIndexError {
    Rank { expected: usize, found: usize },
    OutOfRange { axis: usize, index: usize, len: usize },
    /// The shape admits the index but `cells` is too short.
    MissingCell { offset: usize, len: usize },
}

/// The value of a variable or pool entry.
///
/// Deserializes untagged: a string is a scalar, a sequence is a list and a
/// `{shape, cells}` map is a matrix.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(untagged)]
pub enum VariableValue {
    Scalar(String),
    List(Vec<String>),
    Matrix(Matrix),
}

impl VariableValue {
    pub fn shape(&self) -> ValueShape {
        match self {
            Self::Scalar(_) => ValueShape::Scalar,
            Self::List(_) => ValueShape::List,
            Self::Matrix(_) => ValueShape::Matrix,
        }
    }

    /// Elements in iteration order. A scalar yields itself.
    pub fn flatten(&self) -> Vec<String> {
        match self {
            Self::Scalar(value) => vec![value.clone()],
            Self::List(values) => values.clone(),
            Self::Matrix(matrix) => matrix.cells.clone(),
        }
    }

    /// Text substituted into a prompt for a plain reference.
    ///
    /// Scalars render verbatim; lists and matrices render as JSON arrays.
    pub fn to_prompt_text(&self) -> String {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::List(values) => {
                serde_json::Value::Array(values.iter().cloned().map(serde_json::Value::String).collect())
                    .to_string()
            }
            Self::Matrix(matrix) => matrix.to_nested_json().to_string(),
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(values) => Some(values.as_slice()),
            _ => None,
        }
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<Vec<String>> for VariableValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

/// A named value scoped to a sequence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct Variable {
    #[serde(default = "Uuid::new_v4")]
    #[ts(type = "string")]
    pub id: Uuid,

    #[serde(default)]
    pub sequence_id: Option<Uuid>,

    pub name: String,

    pub value: VariableValue,

    #[serde(rename = "type")]
    pub var_type: VariableType,

    #[serde(default)]
    pub description: Option<String>,

    /// The block that produced this value, for `output` variables.
    #[serde(default)]
    pub source_block_id: Option<Uuid>,

    #[serde(default)]
    pub is_array: bool,

    #[serde(default)]
    pub array_length: Option<usize>,
}

/// A named list persisted independently of any run.
///
/// # Example
///
/// ```yaml
/// name: countries
/// values: ["France", "Japan", "Peru"]
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct GlobalList {
    #[serde(default = "Uuid::new_v4")]
    #[ts(type = "string")]
    pub id: Uuid,

    pub name: String,

    #[serde(default)]
    pub values: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// The block whose output was mirrored into this list, if any.
    #[serde(default)]
    pub source_block_id: Option<Uuid>,

    #[serde(default)]
    pub matrix_dimensions: Option<MatrixDimensions>,

    #[serde(default = "Utc::now")]
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl GlobalList {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            values,
            description: None,
            source_block_id: None,
            matrix_dimensions: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_matrix(&self) -> bool {
        self.matrix_dimensions.is_some()
    }

    /// Append values produced by a block.
    ///
    /// Matrix shape survives only while the list stays a stack of rows with
    /// the same column count: appending a matrix to an empty list adopts its
    /// dimensions, appending one with matching columns adds rows, and any
    /// other append drops the shape.
    pub fn append(&mut self, append: GlobalListAppend) {
        let was_empty = self.values.is_empty();
        self.matrix_dimensions = match (was_empty, self.matrix_dimensions, append.dimensions) {
            (true, _, dims) => dims,
            (false, Some(existing), Some(added)) if existing.cols == added.cols => {
                Some(MatrixDimensions {
                    rows: existing.rows + added.rows,
                    cols: existing.cols,
                })
            }
            _ => None,
        };
        self.values.extend(append.values);
        if append.source_block_id.is_some() {
            self.source_block_id = append.source_block_id;
        }
        self.updated_at = Utc::now();
    }
}

/// Values a block mirrors into a global list, already flattened.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct GlobalListAppend {
    pub values: Vec<String>,

    #[serde(default)]
    pub source_block_id: Option<Uuid>,

    /// Set when the values are the cells of a matrix output.
    #[serde(default)]
    pub dimensions: Option<MatrixDimensions>,
}
