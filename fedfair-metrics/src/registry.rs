//! Standard (label-only) metric contract and registry
//!
//! The evaluator treats every standard metric as an opaque stateful object
//! with a `reset`/`update`/`compute` cycle. Concrete implementations live
//! with whoever owns the classification pipeline; this module only defines
//! the seam and a named collection of them.

use std::collections::BTreeMap;
use std::fmt;

use fedfair_common::MetricsMap;
use ndarray::{ArrayView1, ArrayView2};

use crate::error::MetricError;
use crate::RESERVED_KEYS;

/// A stateful metric updated from raw outputs and labels
pub trait Metric: Send {
    /// Clears accumulated state
    fn reset(&mut self);

    /// Accumulates one batch
    fn update(
        &mut self,
        outputs: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, i64>,
    ) -> Result<(), MetricError>;

    /// Final value over everything seen since the last reset
    fn compute(&self) -> f64;
}

/// Named collection of standard metrics, iterated in name order
#[derive(Default)]
pub struct MetricRegistry {
    metrics: BTreeMap<String, Box<dyn Metric>>,
}

impl MetricRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a metric under `name`, returning the one it replaced.
    ///
    /// Names reserved for the evaluator's own results are rejected.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        metric: Box<dyn Metric>,
    ) -> Result<Option<Box<dyn Metric>>, MetricError> {
        let name = name.into();
        if RESERVED_KEYS.contains(&name.as_str()) {
            return Err(MetricError::ReservedName(name));
        }
        Ok(self.metrics.insert(name, metric))
    }

    /// Builder form of [`MetricRegistry::insert`]
    pub fn with_metric(
        mut self,
        name: impl Into<String>,
        metric: Box<dyn Metric>,
    ) -> Result<Self, MetricError> {
        self.insert(name, metric)?;
        Ok(self)
    }

    /// Looks up a metric by name
    pub fn get(&self, name: &str) -> Option<&dyn Metric> {
        self.metrics.get(name).map(|m| m.as_ref())
    }

    /// Number of registered metrics
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Returns true if no metric is registered
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Registered names, in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    /// Resets every metric
    pub fn reset_all(&mut self) {
        for metric in self.metrics.values_mut() {
            metric.reset();
        }
    }

    /// Feeds one batch to every metric
    pub fn update_all(
        &mut self,
        outputs: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, i64>,
    ) -> Result<(), MetricError> {
        for metric in self.metrics.values_mut() {
            metric.update(outputs, labels)?;
        }
        Ok(())
    }

    /// Writes every metric's final value into `results`
    pub fn compute_into(&self, results: &mut MetricsMap) {
        for (name, metric) in &self.metrics {
            results.insert(name.clone(), metric.compute());
        }
    }
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.metrics.keys().collect::<Vec<_>>())
            .finish()
    }
}
