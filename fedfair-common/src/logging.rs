//! Logging infrastructure for fedfair
//!
//! This module provides configurable logging using the `tracing` crate and
//! helpers for emitting evaluation results as structured events.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Builds the event filter: `RUST_LOG` if set and valid, else `default`.
///
/// `default` takes the usual directive syntax, e.g. `"info,fedfair_train=trace"`
/// to see every batch of the training loop.
pub fn log_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Installs the global fmt subscriber.
///
/// Returns false if a subscriber was already installed, which leaves the
/// existing one in place.
///
/// # Example
///
/// ```no_run
/// use fedfair_common::logging::{init_logging, DEFAULT_LOG_FILTER};
///
/// init_logging(DEFAULT_LOG_FILTER);
/// ```
pub fn init_logging(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(default_filter))
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .is_ok()
}

/// Log a set of named metric values at debug level, one event per metric.
///
/// `context` identifies the producer (e.g. `"server"` or `"client-3"`).
pub fn log_metrics<'a, I>(context: &str, round: usize, metrics: I)
where
    I: IntoIterator<Item = (&'a String, &'a f64)>,
{
    for (name, value) in metrics {
        tracing::debug!(
            context = context,
            round = round,
            metric = name.as_str(),
            value = *value,
            "{} round {} {}={:.6}",
            context,
            round,
            name,
            value
        );
    }
}

/// Formats a metrics mapping as a single compact line (`name=value` pairs).
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use fedfair_common::logging::format_metrics;
///
/// let mut m = BTreeMap::new();
/// m.insert("demographic_parity".to_string(), 0.25);
/// m.insert("loss".to_string(), 0.5);
/// assert_eq!(format_metrics(&m), "demographic_parity=0.2500 loss=0.5000");
/// ```
pub fn format_metrics<'a, I>(metrics: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a f64)>,
{
    metrics
        .into_iter()
        .map(|(name, value)| format!("{name}={value:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}
