//! Covariance-based fairness penalty
//!
//! `penalty = |cov(p, a)|` where `p` is the positive-class probability per
//! example and `a` the protected attribute, with population (1/n) covariance.
//! Pushing the penalty to zero decorrelates the model's positive scores from
//! group membership.

use fedfair_common::{positive_probabilities, protected_column, DataError};
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::TrainError;

/// Penalty value and `dPenalty/dOutputs`
#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyOutput {
    /// Non-negative penalty
    pub value: f32,
    /// Gradient w.r.t. the raw outputs, same shape as the outputs
    pub grad: Array2<f32>,
}

/// Differentiable covariance penalty on one protected column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FairnessRegularizer {
    protected_attr_index: usize,
}

impl FairnessRegularizer {
    /// Creates a regularizer reading the protected attribute from column `protected_attr_index`
    pub fn new(protected_attr_index: usize) -> Self {
        Self {
            protected_attr_index,
        }
    }

    /// Protected column index
    pub fn protected_attr_index(&self) -> usize {
        self.protected_attr_index
    }

    /// Penalty value only.
    pub fn penalty(
        &self,
        raw_outputs: ArrayView2<'_, f32>,
        inputs: ArrayView2<'_, f32>,
    ) -> Result<f32, TrainError> {
        let (probs, attr) = self.prepare(raw_outputs, inputs)?;
        Ok(covariance(probs.view(), attr).map_or(0.0, |(cov, _)| cov.abs() as f32))
    }

    /// Penalty value and its gradient w.r.t. `raw_outputs`.
    ///
    /// `d|cov|/dp_i = sign(cov)·(a_i − ā)/n`, chained through the sigmoid
    /// (`dp/dz = p(1 − p)`). With two output columns `p = σ(z1 − z0)`, so
    /// column 1 receives `+g` and column 0 receives `−g`. At `cov = 0` the
    /// subgradient 0 is used.
    pub fn penalty_with_grad(
        &self,
        raw_outputs: ArrayView2<'_, f32>,
        inputs: ArrayView2<'_, f32>,
    ) -> Result<PenaltyOutput, TrainError> {
        let (probs, attr) = self.prepare(raw_outputs, inputs)?;
        let mut grad = Array2::zeros(raw_outputs.raw_dim());
        let Some((cov, attr_mean)) = covariance(probs.view(), attr) else {
            return Ok(PenaltyOutput { value: 0.0, grad });
        };

        let sign = if cov > 0.0 {
            1.0
        } else if cov < 0.0 {
            -1.0
        } else {
            0.0
        };
        let n = probs.len() as f64;
        let two_columns = raw_outputs.ncols() == 2;
        for (i, (&p, &a)) in probs.iter().zip(attr.iter()).enumerate() {
            let p = f64::from(p);
            let g = (sign * (f64::from(a) - attr_mean) / n * p * (1.0 - p)) as f32;
            if two_columns {
                grad[[i, 1]] = g;
                grad[[i, 0]] = -g;
            } else {
                grad[[i, 0]] = g;
            }
        }

        Ok(PenaltyOutput {
            value: cov.abs() as f32,
            grad,
        })
    }

    fn prepare<'a>(
        &self,
        raw_outputs: ArrayView2<'_, f32>,
        inputs: ArrayView2<'a, f32>,
    ) -> Result<(ndarray::Array1<f32>, ArrayView1<'a, f32>), TrainError> {
        if inputs.nrows() != raw_outputs.nrows() {
            return Err(DataError::RowMismatch {
                what: "inputs",
                expected: raw_outputs.nrows(),
                actual: inputs.nrows(),
            }
            .into());
        }
        let probs = positive_probabilities(raw_outputs)?;
        let attr = protected_column(inputs, self.protected_attr_index)?;
        Ok((probs, attr))
    }
}

/// Population covariance and the attribute mean, or `None` when the penalty
/// is defined as exactly zero (fewer than two examples, constant attribute).
fn covariance(probs: ArrayView1<'_, f32>, attr: ArrayView1<'_, f32>) -> Option<(f64, f64)> {
    let n = probs.len();
    if n < 2 {
        return None;
    }
    let first = attr[0];
    if attr.iter().all(|&a| a == first) {
        return None;
    }

    let nf = n as f64;
    let p_mean = probs.iter().map(|&p| f64::from(p)).sum::<f64>() / nf;
    let a_mean = attr.iter().map(|&a| f64::from(a)).sum::<f64>() / nf;
    let cov = probs
        .iter()
        .zip(attr.iter())
        .map(|(&p, &a)| (f64::from(p) - p_mean) * (f64::from(a) - a_mean))
        .sum::<f64>()
        / nf;
    Some((cov, a_mean))
}
