//! Group-fairness metrics over streaming minibatches
//!
//! Both metrics wrap a [`GroupRateAccumulator`] and differ only in which
//! examples they let through:
//!
//! | metric | eligible examples | statistic |
//! |---|---|---|
//! | [`DemographicParity`] | all | `|P(ŷ=1 \| A=s) − P(ŷ=1 \| A≠s)|` |
//! | [`EqualOpportunity`] | `y = 1` | `|TPR(A=s) − TPR(A≠s)|` |

use fedfair_common::{hard_predictions, protected_column, GroupSpec, MetricsMap};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::accumulator::{GroupCounts, GroupRateAccumulator};
use crate::error::MetricError;
use crate::{DEMOGRAPHIC_PARITY_KEY, EQUAL_OPPORTUNITY_KEY};

/// A resettable, mergeable fairness statistic fed with raw model outputs.
pub trait FairnessMetric {
    /// Result key under which the statistic is reported
    fn name(&self) -> &'static str;

    /// Protected-group specification
    fn group(&self) -> GroupSpec;

    /// Clears accumulated state
    fn reset(&mut self);

    /// Thresholds `raw_predictions`, extracts the protected column from
    /// `inputs` and accumulates the eligible examples.
    fn update(
        &mut self,
        raw_predictions: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, i64>,
        inputs: ArrayView2<'_, f32>,
    ) -> Result<(), MetricError>;

    /// Current value of the statistic, in [0, 1]
    fn compute(&self) -> f64;

    /// Underlying accumulator state
    fn accumulator(&self) -> &GroupRateAccumulator;

    /// Folds a partial state from another worker into this metric
    fn merge_from(&mut self, other: &GroupRateAccumulator) -> Result<(), MetricError>;
}

/// Shared update path: validate shapes, threshold, mask, accumulate.
fn accumulate<F>(
    acc: &mut GroupRateAccumulator,
    group: GroupSpec,
    raw_predictions: ArrayView2<'_, f32>,
    labels: ArrayView1<'_, i64>,
    inputs: ArrayView2<'_, f32>,
    eligible: F,
) -> Result<(), MetricError>
where
    F: Fn(i64) -> bool,
{
    let n = raw_predictions.nrows();
    if labels.len() != n {
        return Err(MetricError::LengthMismatch {
            what: "labels",
            expected: n,
            actual: labels.len(),
        });
    }
    if inputs.nrows() != n {
        return Err(MetricError::LengthMismatch {
            what: "inputs",
            expected: n,
            actual: inputs.nrows(),
        });
    }

    let predictions = hard_predictions(raw_predictions)?;
    let protected = protected_column(inputs, group.protected_attr_index)?;
    let mask: Array1<bool> = labels.mapv(eligible);
    acc.update(predictions.view(), protected, mask.view())
}

macro_rules! fairness_metric_common {
    () => {
        fn group(&self) -> GroupSpec {
            self.group
        }

        fn reset(&mut self) {
            self.acc.reset();
        }

        fn compute(&self) -> f64 {
            self.acc.compute()
        }

        fn accumulator(&self) -> &GroupRateAccumulator {
            &self.acc
        }

        fn merge_from(&mut self, other: &GroupRateAccumulator) -> Result<(), MetricError> {
            self.acc.merge(other)
        }
    };
}

/// Demographic Parity difference: disparity in positive-prediction rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DemographicParity {
    group: GroupSpec,
    acc: GroupRateAccumulator,
}

impl DemographicParity {
    /// Creates an empty metric for the given protected group
    pub fn new(group: GroupSpec) -> Self {
        Self {
            group,
            acc: GroupRateAccumulator::new(group.sensitive_group_val),
        }
    }
}

impl FairnessMetric for DemographicParity {
    fn name(&self) -> &'static str {
        DEMOGRAPHIC_PARITY_KEY
    }

    fn update(
        &mut self,
        raw_predictions: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, i64>,
        inputs: ArrayView2<'_, f32>,
    ) -> Result<(), MetricError> {
        accumulate(&mut self.acc, self.group, raw_predictions, labels, inputs, |_| true)
    }

    fairness_metric_common!();
}

/// Equal Opportunity difference: disparity in true-positive rate.
///
/// Only examples with ground truth `1` ever reach the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualOpportunity {
    group: GroupSpec,
    acc: GroupRateAccumulator,
}

impl EqualOpportunity {
    /// Creates an empty metric for the given protected group
    pub fn new(group: GroupSpec) -> Self {
        Self {
            group,
            acc: GroupRateAccumulator::new(group.sensitive_group_val),
        }
    }
}

impl FairnessMetric for EqualOpportunity {
    fn name(&self) -> &'static str {
        EQUAL_OPPORTUNITY_KEY
    }

    fn update(
        &mut self,
        raw_predictions: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, i64>,
        inputs: ArrayView2<'_, f32>,
    ) -> Result<(), MetricError> {
        accumulate(&mut self.acc, self.group, raw_predictions, labels, inputs, |y| y == 1)
    }

    fairness_metric_common!();
}

/// Snapshot of both fairness statistics and the counters behind them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessReport {
    /// Demographic Parity difference
    pub demographic_parity: f64,
    /// Equal Opportunity difference
    pub equal_opportunity: f64,
    /// Counters behind `demographic_parity`
    pub dp_counts: GroupCounts,
    /// Counters behind `equal_opportunity` (label = 1 examples only)
    pub eo_counts: GroupCounts,
}

impl FairnessReport {
    /// Finalizes both metrics into a report
    pub fn from_metrics(dp: &DemographicParity, eo: &EqualOpportunity) -> Self {
        Self {
            demographic_parity: dp.compute(),
            equal_opportunity: eo.compute(),
            dp_counts: dp.accumulator().counts(),
            eo_counts: eo.accumulator().counts(),
        }
    }

    /// Writes the two statistics into a results mapping under their reserved keys
    pub fn insert_into(&self, results: &mut MetricsMap) {
        results.insert(DEMOGRAPHIC_PARITY_KEY.to_string(), self.demographic_parity);
        results.insert(EQUAL_OPPORTUNITY_KEY.to_string(), self.equal_opportunity);
    }

    /// Exports the report as pretty-printed JSON
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for FairnessReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DP: {:.4} ({} sensitive / {} other), EO: {:.4} ({} sensitive / {} other)",
            self.demographic_parity,
            self.dp_counts.total_in_sensitive,
            self.dp_counts.total_in_other,
            self.equal_opportunity,
            self.eo_counts.total_in_sensitive,
            self.eo_counts.total_in_other,
        )
    }
}
