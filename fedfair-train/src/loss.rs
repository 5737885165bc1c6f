//! Task losses with analytic gradients w.r.t. the raw outputs

use fedfair_common::sigmoid;
use ndarray::{Array2, ArrayView1, ArrayView2, Zip};

use crate::error::TrainError;

/// Scalar loss together with `dLoss/dOutputs`
#[derive(Debug, Clone, PartialEq)]
pub struct LossOutput {
    /// Mean loss over the batch
    pub value: f32,
    /// Gradient w.r.t. the raw outputs, same shape as the outputs
    pub grad: Array2<f32>,
}

/// A differentiable task loss over raw model outputs and integer labels
pub trait LossFn: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Evaluates the mean loss and its gradient.
    fn evaluate(
        &self,
        outputs: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, i64>,
    ) -> Result<LossOutput, TrainError>;

    /// Loss value only
    fn value(
        &self,
        outputs: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, i64>,
    ) -> Result<f32, TrainError> {
        Ok(self.evaluate(outputs, labels)?.value)
    }
}

fn check_batch(
    outputs: ArrayView2<'_, f32>,
    labels: ArrayView1<'_, i64>,
    width: Option<usize>,
) -> Result<(), TrainError> {
    if outputs.nrows() == 0 {
        return Err(TrainError::EmptyBatch);
    }
    if labels.len() != outputs.nrows() {
        return Err(TrainError::ShapeMismatch {
            context: "loss labels",
            expected: vec![outputs.nrows()],
            actual: vec![labels.len()],
        });
    }
    if let Some(width) = width {
        if outputs.ncols() != width {
            return Err(TrainError::ShapeMismatch {
                context: "loss outputs",
                expected: vec![outputs.nrows(), width],
                actual: outputs.shape().to_vec(),
            });
        }
    }
    Ok(())
}

/// Mean softmax cross-entropy over per-class logits
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl LossFn for CrossEntropyLoss {
    fn name(&self) -> &'static str {
        "cross_entropy"
    }

    fn evaluate(
        &self,
        outputs: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, i64>,
    ) -> Result<LossOutput, TrainError> {
        check_batch(outputs, labels, None)?;
        let classes = outputs.ncols();
        if classes < 2 {
            return Err(TrainError::ShapeMismatch {
                context: "cross-entropy outputs",
                expected: vec![outputs.nrows(), 2],
                actual: outputs.shape().to_vec(),
            });
        }

        let n = outputs.nrows() as f32;
        let mut grad = Array2::zeros(outputs.raw_dim());
        let mut total = 0.0f64;
        for ((row, &label), mut grad_row) in outputs
            .rows()
            .into_iter()
            .zip(labels.iter())
            .zip(grad.rows_mut())
        {
            let target = usize::try_from(label)
                .ok()
                .filter(|&t| t < classes)
                .ok_or_else(|| TrainError::Model {
                    reason: format!("label {label} outside [0, {classes})"),
                })?;
            let max = row.fold(f32::NEG_INFINITY, |m, &z| m.max(z));
            let log_norm = max + row.iter().map(|&z| (z - max).exp()).sum::<f32>().ln();
            total += f64::from(log_norm - row[target]);
            Zip::from(&mut grad_row)
                .and(&row)
                .for_each(|g, &z| *g = (z - log_norm).exp() / n);
            grad_row[target] -= 1.0 / n;
        }

        Ok(LossOutput {
            value: (total / f64::from(n)) as f32,
            grad,
        })
    }
}

/// Mean binary cross-entropy over a single logit column
#[derive(Debug, Clone, Copy, Default)]
pub struct BceWithLogitsLoss;

impl LossFn for BceWithLogitsLoss {
    fn name(&self) -> &'static str {
        "bce_with_logits"
    }

    fn evaluate(
        &self,
        outputs: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, i64>,
    ) -> Result<LossOutput, TrainError> {
        check_batch(outputs, labels, Some(1))?;
        let n = outputs.nrows() as f32;
        let mut grad = Array2::zeros(outputs.raw_dim());
        let mut total = 0.0f64;
        for ((&z, &label), g) in outputs.iter().zip(labels.iter()).zip(grad.iter_mut()) {
            let y = label as f32;
            // max(z, 0) - z*y + log(1 + e^-|z|)
            total += f64::from(z.max(0.0) - z * y + (-z.abs()).exp().ln_1p());
            *g = (sigmoid(z) - y) / n;
        }

        Ok(LossOutput {
            value: (total / f64::from(n)) as f32,
            grad,
        })
    }
}
