//! Error types for sequence execution.

use crate::engine::template::ResolveError;
use crate::providers::base::ModelError;
use crate::store::StoreError;
use sk_protocol::run_models::FailureKind;
use sk_protocol::variable_models::ValueShape;
use thiserror::Error;
use uuid::Uuid;

/// A block or sequence definition that cannot run as written.
///
/// Always detected before any model call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block '{block}': {field} is required")]
    MissingField { block: String, field: &'static str },

    #[error("block '{block}': discretization expects {expected} outputs but names {found}")]
    OutputCountMismatch {
        block: String,
        expected: usize,
        found: usize,
    },

    #[error("block '{block}': list '{list}' is not defined")]
    UnknownList { block: String, list: String },

    #[error("block '{block}': '{list}' is a {found}, not a list")]
    NotAList {
        block: String,
        list: String,
        found: ValueShape,
    },

    #[error("variable '{name}' is produced by both {first} and {second}")]
    DuplicateProducer {
        name: String,
        first: String,
        second: String,
    },

    #[error("no model configured for block '{block}'")]
    NoModel { block: String },

    #[error("block {0} does not belong to this sequence")]
    UnknownBlock(Uuid),

    #[error("invalid block order: {0}")]
    InvalidReorder(String),

    #[error("block '{stop}' runs before start block '{start}'")]
    EmptyBlockRange { start: String, stop: String },
}

/// Every way a run, or an operation on one, can fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Sequence {0} not found")]
    SequenceNotFound(Uuid),

    #[error("Run {0} not found")]
    RunNotFound(Uuid),

    #[error("Block run {0} not found")]
    BlockRunNotFound(Uuid),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Type mismatch: '{name}' is a {found}, expected a list")]
    TypeMismatch { name: String, found: ValueShape },

    #[error("Malformed output from block '{block}': {reason}")]
    MalformedOutput { block: String, reason: String },

    #[error("Block '{block_name}' ({block_id}) failed: {cause}")]
    BlockExecutionFailed {
        block_id: Uuid,
        block_name: String,
        cause: ModelError,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// The failure classification recorded on a failed run.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SequenceNotFound(_)
            | Self::RunNotFound(_)
            | Self::BlockRunNotFound(_)
            | Self::Config(_) => FailureKind::Config,
            Self::Resolve(error) => error.kind(),
            Self::TypeMismatch { .. } => FailureKind::TypeMismatch,
            Self::MalformedOutput { .. } => FailureKind::MalformedOutput,
            Self::BlockExecutionFailed { .. } => FailureKind::BlockExecutionFailed,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Store(_) => FailureKind::Persistence,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
