//! Prompt template resolution.
//!
//! References are written `{{ name }}` or `<< name >>`, with optional
//! zero-based indexing: `{{ items[2] }}` for a list element and
//! `{{ grid[1][0] }}` for a matrix cell. Whitespace inside the delimiters is
//! ignored. Text that does not match the reference grammar is left as is.
//!
//! Resolution never mutates the pool and reports every failing reference at
//! once.

use crate::engine::pool::VariablePool;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use sk_protocol::run_models::FailureKind;
use sk_protocol::variable_models::{MatrixIndexError, ValueShape, VariableValue};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

lazy_static! {
    static ref REFERENCE: Regex = reference_pattern();
    static ref INDEX: Regex = index_pattern();
}

const NAME: &str = r"[A-Za-z_][A-Za-z0-9_\-]*";
const INDICES: &str = r"(?:\[\s*\d+\s*\]\s*)*";

#[allow(clippy::expect_used)]
fn reference_pattern() -> Regex {
    let pattern = format!(
        r"\{{\{{\s*(?P<curly>{NAME})\s*(?P<curly_idx>{INDICES})\}}\}}|<<\s*(?P<angle>{NAME})\s*(?P<angle_idx>{INDICES})>>"
    );
    Regex::new(&pattern).expect("reference pattern is valid")
}

#[allow(clippy::expect_used)]
fn index_pattern() -> Regex {
    Regex::new(r"\[\s*(\d+)\s*\]").expect("index pattern is valid")
}

/// One variable reference found in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub indices: Vec<usize>,
    /// The reference as written, delimiters included.
    pub raw: String,
    span: Range<usize>,
}

impl Reference {
    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        let whole = caps.get(0)?;
        let (name, indices) = match (caps.name("curly"), caps.name("angle")) {
            (Some(name), _) => (name, caps.name("curly_idx")),
            (None, Some(name)) => (name, caps.name("angle_idx")),
            (None, None) => return None,
        };

        let indices = indices
            .map(|m| {
                INDEX
                    .captures_iter(m.as_str())
                    // Indices too large for usize can never be in range.
                    .map(|c| c[1].parse::<usize>().unwrap_or(usize::MAX))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            name: name.as_str().to_string(),
            indices,
            raw: whole.as_str().to_string(),
            span: whole.range(),
        })
    }

    /// `name[i][j]` form used in messages.
    pub fn display_path(&self) -> String {
        let mut path = self.name.clone();
        for index in &self.indices {
            path.push_str(&format!("[{index}]"));
        }
        path
    }
}

/// Why a single reference could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceFailure {
    #[error("unresolved variable '{name}'")]
    UnresolvedVariable { name: String },

    #[error("index {index} out of range for '{reference}' (axis {axis} has length {len})")]
    IndexOutOfRange {
        reference: String,
        axis: usize,
        index: usize,
        len: usize,
    },

    #[error("'{reference}' uses {indices} index(es) but the value is a {shape} of rank {rank}")]
    ShapeMismatch {
        reference: String,
        shape: ValueShape,
        rank: usize,
        indices: usize,
    },
}

impl ReferenceFailure {
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::UnresolvedVariable { name: name.into() }
    }
}

/// Every failure found while resolving one template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    pub failures: Vec<ReferenceFailure>,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template resolution failed: ")?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl ResolveError {
    /// Classification, preferring unresolved names over index and shape errors.
    pub fn kind(&self) -> FailureKind {
        let has = |pred: fn(&ReferenceFailure) -> bool| self.failures.iter().any(pred);

        if has(|f| matches!(f, ReferenceFailure::UnresolvedVariable { .. })) {
            FailureKind::UnresolvedVariable
        } else if has(|f| matches!(f, ReferenceFailure::IndexOutOfRange { .. })) {
            FailureKind::IndexOutOfRange
        } else {
            FailureKind::TypeMismatch
        }
    }

    /// Names that had no pool entry.
    pub fn unresolved_names(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter_map(|failure| match failure {
                ReferenceFailure::UnresolvedVariable { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// All references in a template, in order of appearance.
pub fn parse_references(template: &str) -> Vec<Reference> {
    REFERENCE
        .captures_iter(template)
        .filter_map(|caps| Reference::from_captures(&caps))
        .collect()
}

/// Render a template, letting `lookup` produce each reference's text.
///
/// Failed references stay in the output verbatim. Unresolved names are
/// reported once each.
pub fn render<F>(template: &str, mut lookup: F) -> (String, Vec<ReferenceFailure>)
where
    F: FnMut(&Reference) -> Result<String, ReferenceFailure>,
{
    let mut output = String::with_capacity(template.len());
    let mut failures: Vec<ReferenceFailure> = Vec::new();
    let mut cursor = 0;

    for reference in parse_references(template) {
        output.push_str(&template[cursor..reference.span.start]);
        match lookup(&reference) {
            Ok(text) => output.push_str(&text),
            Err(failure) => {
                output.push_str(&reference.raw);
                if !failures.contains(&failure) {
                    failures.push(failure);
                }
            }
        }
        cursor = reference.span.end;
    }
    output.push_str(&template[cursor..]);

    (output, failures)
}

/// Resolve a template against a pool.
pub fn resolve(template: &str, pool: &VariablePool) -> Result<String, ResolveError> {
    resolve_with(template, pool, &[])
}

/// Resolve a template against a pool overlaid with per-call scalar bindings.
///
/// Bindings shadow pool entries of the same name.
pub fn resolve_with(
    template: &str,
    pool: &VariablePool,
    bindings: &[(String, String)],
) -> Result<String, ResolveError> {
    let (text, failures) = render(template, |reference| {
        if let Some((_, value)) = bindings.iter().find(|(name, _)| *name == reference.name) {
            return index_value(reference, &VariableValue::Scalar(value.clone()));
        }
        match pool.get(&reference.name) {
            Some(value) => index_value(reference, value),
            None => Err(ReferenceFailure::unresolved(&reference.name)),
        }
    });

    if failures.is_empty() {
        Ok(text)
    } else {
        Err(ResolveError { failures })
    }
}

/// Rank of a value: 0 for scalars, 1 for lists, the axis count for matrices.
pub fn rank_of(value: &VariableValue) -> usize {
    match value {
        VariableValue::Scalar(_) => 0,
        VariableValue::List(_) => 1,
        VariableValue::Matrix(matrix) => matrix.rank(),
    }
}

/// Check that a reference's indexing fits a value of the given shape.
///
/// A reference may use no index at all, or exactly one per axis.
pub fn check_shape(
    reference: &Reference,
    shape: ValueShape,
    rank: usize,
) -> Result<(), ReferenceFailure> {
    let indices = reference.indices.len();
    if indices == 0 || indices == rank {
        Ok(())
    } else {
        Err(ReferenceFailure::ShapeMismatch {
            reference: reference.display_path(),
            shape,
            rank,
            indices,
        })
    }
}

/// Text a reference renders to for a concrete value.
pub fn index_value(reference: &Reference, value: &VariableValue) -> Result<String, ReferenceFailure> {
    check_shape(reference, value.shape(), rank_of(value))?;

    if reference.indices.is_empty() {
        return Ok(value.to_prompt_text());
    }

    let out_of_range = |axis: usize, index: usize, len: usize| ReferenceFailure::IndexOutOfRange {
        reference: reference.display_path(),
        axis,
        index,
        len,
    };

    match value {
        // check_shape rejects any index on a scalar.
        VariableValue::Scalar(text) => Ok(text.clone()),
        VariableValue::List(items) => {
            let index = reference.indices[0];
            items
                .get(index)
                .cloned()
                .ok_or_else(|| out_of_range(0, index, items.len()))
        }
        VariableValue::Matrix(matrix) => match matrix.get(&reference.indices) {
            Ok(cell) => Ok(cell.to_string()),
            Err(MatrixIndexError::OutOfRange { axis, index, len }) => {
                Err(out_of_range(axis, index, len))
            }
            Err(MatrixIndexError::MissingCell { offset, len }) => Err(out_of_range(0, offset, len)),
            Err(MatrixIndexError::Rank { expected, found }) => Err(ReferenceFailure::ShapeMismatch {
                reference: reference.display_path(),
                shape: ValueShape::Matrix,
                rank: expected,
                indices: found,
            }),
        },
    }
}
