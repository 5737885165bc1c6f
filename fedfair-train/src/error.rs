//! Error types for fair training and evaluation
//!
//! Upstream failures (model, loss, optimizer) are never retried or swallowed:
//! they surface through [`TrainError`] so the orchestrator can abort the
//! affected client round.

use fedfair_common::{ConfigValidationError, DataError};
use fedfair_metrics::MetricError;
use thiserror::Error;

/// Top-level error type for training and evaluation passes
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid hyperparameters
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    /// Malformed batch or model outputs
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Metric update or merge failure
    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),

    /// Tensor shapes do not line up
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Where the mismatch was detected
        context: &'static str,
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// Training loader yields no batches
    #[error("Training loader is empty")]
    EmptyLoader,

    /// Loss evaluated on a batch with no examples
    #[error("Cannot compute a loss over an empty batch")]
    EmptyBatch,

    /// Model forward/backward failure
    #[error("Model error: {reason}")]
    Model {
        /// Reason for the failure
        reason: String,
    },

    /// Optimizer step failure
    #[error("Optimizer error: {reason}")]
    Optimizer {
        /// Reason for the failure
        reason: String,
    },
}
