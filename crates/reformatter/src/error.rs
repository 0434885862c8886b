//! Error types for the reformatting engine.
//!
//! Only [`ReformatError`] ever aborts an update. [`FetchError`],
//! [`TransformError`] and [`StoreError`] raised while a region job runs are
//! recorded against the affected coordinates instead.

use thiserror::Error;

/// Run-aborting errors.
#[derive(Error, Debug)]
pub enum ReformatError {
    /// The on-disk store disagrees with the configured schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The configured schema failed validation.
    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),

    /// The store could not be opened, read or committed to.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No dataset with this id is registered.
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),
}

impl ReformatError {
    /// Create a SchemaMismatch error.
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Schema validation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("schema declares no dimensions")]
    NoDimensions,

    #[error("schema declares no variables")]
    NoVariables,

    #[error("empty {0} name")]
    EmptyName(&'static str),

    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("expected exactly one unbounded dimension, found {0}")]
    AppendDimensionCount(usize),

    #[error("dimension '{dimension}': chunk size {chunk} is invalid for length {len:?}")]
    InvalidChunk {
        dimension: String,
        chunk: u64,
        len: Option<u64>,
    },

    #[error("dimension '{dimension}': {reason}")]
    InvalidCoordinate { dimension: String, reason: String },

    #[error("variable '{variable}' references undeclared dimension '{dimension}'")]
    UnknownDimension { variable: String, dimension: String },

    #[error("variable '{variable}' lists dimensions out of declared order")]
    DimensionOrder { variable: String },

    #[error("variable '{variable}' must start with the append dimension '{append}'")]
    MissingAppendDimension { variable: String, append: String },

    #[error("variable '{variable}': {reason}")]
    InvalidVariable { variable: String, reason: String },

    #[error("failed to parse schema: {0}")]
    Parse(String),
}

/// Source adapter outcomes other than a decoded tile.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The source file has not been published yet. Expected, not a failure.
    #[error("source data not yet available")]
    NotYetAvailable,

    /// The source exists but could not be retrieved.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The source was retrieved but could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),
}

impl FetchError {
    /// Create a Retrieval error.
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    /// Create a Decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether this outcome means "try again on a later run".
    pub fn is_not_yet_available(&self) -> bool {
        matches!(self, Self::NotYetAvailable)
    }
}

/// Failures of the transform pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("tile shape {actual:?} does not match expected {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("tile has {actual} values but shape {shape:?} needs {expected}")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("implausible value {value} outside [{min}, {max}]")]
    ImplausibleValue { value: f32, min: f32, max: f32 },
}

/// Store I/O failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("Zarr error: {0}")]
    Zarr(String),

    #[error("invalid store metadata: {0}")]
    Metadata(String),

    /// Another update holds the store's lock file.
    #[error("store is locked by another update ({0}); remove the file if no update is running")]
    Locked(String),

    #[error("region {start}..{end} is outside the time extent {extent}")]
    OutOfRange { start: u64, end: u64, extent: u64 },

    #[error("region buffer for '{variable}' has {actual} values, expected {expected}")]
    BufferSize {
        variable: String,
        expected: usize,
        actual: usize,
    },
}

impl StoreError {
    /// Create a Zarr error.
    pub fn zarr(msg: impl ToString) -> Self {
        Self::Zarr(msg.to_string())
    }

    /// Create a Metadata error.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Metadata(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, ReformatError>;
