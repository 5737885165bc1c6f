//! Common types and utilities for fedfair
//!
//! This crate provides the batch representation, model-output conversions,
//! configuration structures, error types and logging setup shared by the
//! fairness metric engine (`fedfair-metrics`) and the fair training/evaluation
//! loops (`fedfair-train`).

pub mod batch;
pub mod config;
pub mod error;
pub mod logging;

pub use batch::{
    hard_predictions, positive_probabilities, protected_column, sigmoid, Batch,
    SCALAR_DECISION_THRESHOLD,
};
pub use config::{
    EvaluatorConfig, FairClientConfig, GroupSpec, OptimizerConfig, OptimizerKind, SchedulerConfig,
};
pub use error::{ConfigError, ConfigValidationError, DataError};
pub use logging::{
    format_metrics, init_logging, log_filter, log_metrics, DEFAULT_LOG_FILTER,
};

/// Flat metric-name to value mapping returned by evaluation passes.
///
/// Callers must treat the key set as open-ended; only `"loss"`,
/// `"demographic_parity"` and `"equal_opportunity"` are reserved.
pub type MetricsMap = std::collections::BTreeMap<String, f64>;
