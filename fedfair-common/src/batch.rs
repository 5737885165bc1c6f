//! Batch data and model-output conversions
//!
//! A [`Batch`] pairs a row-major feature matrix with binary labels. The free
//! functions here turn raw model outputs into the two views every fairness
//! component needs: hard 0/1 predictions and positive-class probabilities.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Threshold applied to single-column scores to obtain a hard prediction
pub const SCALAR_DECISION_THRESHOLD: f32 = 0.5;

/// A minibatch of examples: `n × width` features and `n` binary labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    inputs: Array2<f32>,
    labels: Array1<i64>,
}

impl Batch {
    /// Creates a batch, checking that row counts agree and labels are in {0, 1}.
    pub fn new(inputs: Array2<f32>, labels: Array1<i64>) -> Result<Self, DataError> {
        if inputs.nrows() != labels.len() {
            return Err(DataError::RowMismatch {
                what: "labels",
                expected: inputs.nrows(),
                actual: labels.len(),
            });
        }
        if let Some(row) = labels.iter().position(|&l| l != 0 && l != 1) {
            return Err(DataError::NonBinaryLabel {
                row,
                label: labels[row],
            });
        }
        Ok(Self { inputs, labels })
    }

    /// Feature matrix
    pub fn inputs(&self) -> ArrayView2<'_, f32> {
        self.inputs.view()
    }

    /// Ground-truth labels
    pub fn labels(&self) -> ArrayView1<'_, i64> {
        self.labels.view()
    }

    /// Number of examples
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true if the batch holds no examples
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of input features per example
    pub fn width(&self) -> usize {
        self.inputs.ncols()
    }

    /// Consumes the batch and returns its parts
    pub fn into_parts(self) -> (Array2<f32>, Array1<i64>) {
        (self.inputs, self.labels)
    }
}

/// Borrows column `index` of `inputs` as the protected-attribute vector.
pub fn protected_column(
    inputs: ArrayView2<'_, f32>,
    index: usize,
) -> Result<ArrayView1<'_, f32>, DataError> {
    if index >= inputs.ncols() {
        return Err(DataError::ColumnOutOfRange {
            index,
            width: inputs.ncols(),
        });
    }
    Ok(inputs.index_axis_move(Axis(1), index))
}

/// Converts raw outputs to hard binary predictions.
///
/// Two columns: arg-max (ties resolve to class 0). One column: `score > 0.5`.
pub fn hard_predictions(outputs: ArrayView2<'_, f32>) -> Result<Array1<u8>, DataError> {
    match outputs.ncols() {
        1 => Ok(outputs
            .column(0)
            .mapv(|s| u8::from(s > SCALAR_DECISION_THRESHOLD))),
        2 => Ok(outputs
            .rows()
            .into_iter()
            .map(|row| u8::from(row[1] > row[0]))
            .collect()),
        n => Err(DataError::UnsupportedOutputWidth(n)),
    }
}

/// Converts raw outputs to per-example positive-class probabilities.
///
/// Two columns: `softmax(row)[1]`, computed as `sigmoid(z1 - z0)`. One
/// column: `sigmoid(z)`.
pub fn positive_probabilities(outputs: ArrayView2<'_, f32>) -> Result<Array1<f32>, DataError> {
    match outputs.ncols() {
        1 => Ok(outputs.column(0).mapv(sigmoid)),
        2 => Ok(outputs
            .rows()
            .into_iter()
            .map(|row| sigmoid(row[1] - row[0]))
            .collect()),
        n => Err(DataError::UnsupportedOutputWidth(n)),
    }
}

/// Numerically stable logistic function
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
