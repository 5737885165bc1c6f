//! Streaming group-rate accumulation
//!
//! [`GroupRateAccumulator`] keeps four counters per evaluation pass and never
//! stores individual predictions, so memory stays constant regardless of how
//! many batches are seen. Partial states from different workers or clients are
//! combined by summing counters, which makes the reduction order irrelevant.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MetricError;

/// Lower bound on a group's total when turning counts into a rate.
///
/// A group that was never observed ends up with rate 0 instead of NaN.
pub const RATE_EPSILON: f64 = 1e-6;

/// Raw counters of a [`GroupRateAccumulator`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupCounts {
    /// Positive predictions among sensitive-group examples
    pub positive_in_sensitive: u64,
    /// Sensitive-group examples seen
    pub total_in_sensitive: u64,
    /// Positive predictions among complement-group examples
    pub positive_in_other: u64,
    /// Complement-group examples seen
    pub total_in_other: u64,
}

impl GroupCounts {
    /// Returns true if `positive <= total` holds for both groups
    pub fn is_consistent(&self) -> bool {
        self.positive_in_sensitive <= self.total_in_sensitive
            && self.positive_in_other <= self.total_in_other
    }

    /// Total examples routed to either group
    pub fn total(&self) -> u64 {
        self.total_in_sensitive + self.total_in_other
    }

    /// Positive rate of the sensitive group (0 if the group is empty)
    pub fn sensitive_rate(&self) -> f64 {
        rate(self.positive_in_sensitive, self.total_in_sensitive)
    }

    /// Positive rate of the complement group (0 if the group is empty)
    pub fn other_rate(&self) -> f64 {
        rate(self.positive_in_other, self.total_in_other)
    }

    /// Absolute difference between the two group rates
    pub fn rate_difference(&self) -> f64 {
        (self.sensitive_rate() - self.other_rate()).abs()
    }

    /// Returns true if both groups have been observed at least once
    pub fn both_groups_present(&self) -> bool {
        self.total_in_sensitive > 0 && self.total_in_other > 0
    }
}

fn rate(positive: u64, total: u64) -> f64 {
    positive as f64 / (total as f64).max(RATE_EPSILON)
}

impl Add for GroupCounts {
    type Output = GroupCounts;

    fn add(self, rhs: GroupCounts) -> GroupCounts {
        GroupCounts {
            positive_in_sensitive: self.positive_in_sensitive + rhs.positive_in_sensitive,
            total_in_sensitive: self.total_in_sensitive + rhs.total_in_sensitive,
            positive_in_other: self.positive_in_other + rhs.positive_in_other,
            total_in_other: self.total_in_other + rhs.total_in_other,
        }
    }
}

impl AddAssign for GroupCounts {
    fn add_assign(&mut self, rhs: GroupCounts) {
        *self = *self + rhs;
    }
}

impl Sum for GroupCounts {
    fn sum<I: Iterator<Item = GroupCounts>>(iter: I) -> Self {
        iter.fold(GroupCounts::default(), Add::add)
    }
}

impl<'a> Sum<&'a GroupCounts> for GroupCounts {
    fn sum<I: Iterator<Item = &'a GroupCounts>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Running positive-rate counters for a sensitive group and its complement.
///
/// Deserialization goes through [`GroupRateAccumulator::from_counts`], so a
/// received partial state with more positives than examples is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AccumulatorState")]
pub struct GroupRateAccumulator {
    sensitive_group_val: f32,
    counts: GroupCounts,
}

/// Unchecked wire form of [`GroupRateAccumulator`]
#[derive(Deserialize)]
struct AccumulatorState {
    sensitive_group_val: f32,
    counts: GroupCounts,
}

impl TryFrom<AccumulatorState> for GroupRateAccumulator {
    type Error = MetricError;

    fn try_from(state: AccumulatorState) -> Result<Self, Self::Error> {
        Self::from_counts(state.sensitive_group_val, state.counts)
    }
}

impl GroupRateAccumulator {
    /// Creates an empty accumulator for the given sensitive value
    pub fn new(sensitive_group_val: f32) -> Self {
        Self {
            sensitive_group_val,
            counts: GroupCounts::default(),
        }
    }

    /// Rebuilds an accumulator from counters received from another worker.
    pub fn from_counts(sensitive_group_val: f32, counts: GroupCounts) -> Result<Self, MetricError> {
        if !counts.is_consistent() {
            return Err(MetricError::InconsistentCounts(format!("{counts:?}")));
        }
        Ok(Self {
            sensitive_group_val,
            counts,
        })
    }

    /// Value that defines the sensitive group
    pub fn sensitive_group_val(&self) -> f32 {
        self.sensitive_group_val
    }

    /// Current counters
    pub fn counts(&self) -> GroupCounts {
        self.counts
    }

    /// Clears all counters
    pub fn reset(&mut self) {
        self.counts = GroupCounts::default();
    }

    /// Routes every eligible example to its group and counts positives.
    ///
    /// All three views must have the same length; nothing is counted if they
    /// do not. A batch with no eligible examples is a no-op.
    pub fn update(
        &mut self,
        predictions: ArrayView1<'_, u8>,
        protected_values: ArrayView1<'_, f32>,
        eligibility_mask: ArrayView1<'_, bool>,
    ) -> Result<(), MetricError> {
        let n = predictions.len();
        if protected_values.len() != n {
            return Err(MetricError::LengthMismatch {
                what: "protected_values",
                expected: n,
                actual: protected_values.len(),
            });
        }
        if eligibility_mask.len() != n {
            return Err(MetricError::LengthMismatch {
                what: "eligibility_mask",
                expected: n,
                actual: eligibility_mask.len(),
            });
        }

        let mut batch = GroupCounts::default();
        for ((&pred, &value), &eligible) in predictions
            .iter()
            .zip(protected_values.iter())
            .zip(eligibility_mask.iter())
        {
            if !eligible {
                continue;
            }
            let positive = u64::from(pred == 1);
            if value == self.sensitive_group_val {
                batch.total_in_sensitive += 1;
                batch.positive_in_sensitive += positive;
            } else {
                batch.total_in_other += 1;
                batch.positive_in_other += positive;
            }
        }
        self.counts += batch;
        Ok(())
    }

    /// Absolute difference of the two group positive rates, in [0, 1].
    ///
    /// If either group has no examples there is nothing to compare against
    /// and the disparity is 0.
    pub fn compute(&self) -> f64 {
        if !self.counts.both_groups_present() {
            debug!(
                total_in_sensitive = self.counts.total_in_sensitive,
                total_in_other = self.counts.total_in_other,
                "group absent, reporting zero disparity"
            );
            return 0.0;
        }
        self.counts.rate_difference()
    }

    /// Adds another accumulator's counters into this one.
    ///
    /// `other` is left untouched. Both must share the same sensitive value.
    pub fn merge(&mut self, other: &GroupRateAccumulator) -> Result<(), MetricError> {
        if other.sensitive_group_val != self.sensitive_group_val {
            return Err(MetricError::IncompatibleMerge {
                left: self.sensitive_group_val,
                right: other.sensitive_group_val,
            });
        }
        if !other.counts.is_consistent() {
            return Err(MetricError::InconsistentCounts(format!("{:?}", other.counts)));
        }
        self.counts += other.counts;
        Ok(())
    }

    /// Returns the merge of `self` and `other` without modifying either.
    pub fn merged(&self, other: &GroupRateAccumulator) -> Result<Self, MetricError> {
        let mut out = *self;
        out.merge(other)?;
        Ok(out)
    }

    /// Folds any number of partial accumulators into one.
    pub fn merge_all<'a, I>(sensitive_group_val: f32, parts: I) -> Result<Self, MetricError>
    where
        I: IntoIterator<Item = &'a GroupRateAccumulator>,
    {
        parts
            .into_iter()
            .try_fold(Self::new(sensitive_group_val), |mut acc, part| {
                acc.merge(part)?;
                Ok(acc)
            })
    }
}
