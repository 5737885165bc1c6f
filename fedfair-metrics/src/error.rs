//! Error types for metric accumulation

use fedfair_common::DataError;
use thiserror::Error;

/// Errors raised while updating, merging or registering metrics
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    /// Per-example arrays of a single update disagree in length
    #[error("length mismatch in {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Which array was short or long
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Accumulators built for different sensitive groups cannot be combined
    #[error("cannot merge accumulators for sensitive values {left} and {right}")]
    IncompatibleMerge {
        /// Sensitive value of the receiving accumulator
        left: f32,
        /// Sensitive value of the merged-in accumulator
        right: f32,
    },

    /// Counter state violates `positive <= total`
    #[error("inconsistent counters: {0}")]
    InconsistentCounts(String),

    /// A standard metric tried to claim a reserved result key
    #[error("metric name '{0}' is reserved")]
    ReservedName(String),

    /// Malformed batch data
    #[error(transparent)]
    Data(#[from] DataError),
}
