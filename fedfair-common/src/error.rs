//! Error types shared across fedfair crates
//!
//! Configuration problems are split the same way the loader works: I/O and
//! parse failures happen while reading, validation failures afterwards.

use thiserror::Error;

/// Errors that can occur while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization error
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Configuration validation error
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ConfigValidationError),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Errors produced by configuration validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// Fairness regularization strength below zero
    #[error("fairness_lambda must be >= 0, got {0}")]
    NegativeLambda(f32),

    /// Fairness regularization strength is NaN or infinite
    #[error("fairness_lambda must be finite, got {0}")]
    NonFiniteLambda(f32),

    /// Protected attribute column does not exist in the model input
    #[error("protected_attr_index {index} out of range for input width {width}")]
    ProtectedAttrOutOfRange {
        /// Configured column index
        index: usize,
        /// Number of input features
        width: usize,
    },

    /// Local training would run zero epochs
    #[error("local_epochs must be at least 1")]
    ZeroEpochs,

    /// Batch size of zero
    #[error("batch_size must be at least 1")]
    InvalidBatchSize,

    /// Learning rate not strictly positive and finite
    #[error("learning rate must be positive and finite, got {0}")]
    InvalidLearningRate(f32),

    /// Momentum outside [0, 1)
    #[error("momentum must be in [0, 1), got {0}")]
    InvalidMomentum(f32),

    /// Weight decay below zero
    #[error("weight_decay must be >= 0, got {0}")]
    InvalidWeightDecay(f32),

    /// Scheduler step size of zero or non-positive decay factor
    #[error("invalid scheduler: {0}")]
    InvalidScheduler(String),
}

/// Errors raised while building or slicing batch data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataError {
    /// Row counts of two arrays disagree
    #[error("{what}: expected {expected} rows, got {actual}")]
    RowMismatch {
        /// What was being compared
        what: &'static str,
        /// Expected row count
        expected: usize,
        /// Actual row count
        actual: usize,
    },

    /// Column index beyond the matrix width
    #[error("column {index} out of range for width {width}")]
    ColumnOutOfRange {
        /// Requested column
        index: usize,
        /// Matrix width
        width: usize,
    },

    /// Label outside {0, 1}
    #[error("label {label} at row {row} is not binary")]
    NonBinaryLabel {
        /// Row of the offending label
        row: usize,
        /// Offending label value
        label: i64,
    },

    /// Model outputs with an unsupported number of columns
    #[error("model outputs must have 1 or 2 columns, got {0}")]
    UnsupportedOutputWidth(usize),
}
