//! Fairness-regularized local training
//!
//! [`fit`] runs `epochs` passes over a loader. Each batch is optimized on
//! `task_loss + λ·|cov(p, a)|`; with `λ = 0` the regularizer is never
//! evaluated and the objective is exactly the task loss.

use fedfair_common::ConfigValidationError;
use ndarray::ArrayView2;
use tracing::{debug, info, trace};

use crate::data::DataLoader;
use crate::device::{Device, DeviceScope};
use crate::error::TrainError;
use crate::loss::{LossFn, LossOutput};
use crate::model::Model;
use crate::optim::{LrScheduler, Optimizer};
use crate::regularizer::FairnessRegularizer;

/// Training objective: task loss plus a weighted fairness penalty
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairObjective {
    fairness_lambda: f32,
    regularizer: FairnessRegularizer,
}

impl FairObjective {
    /// Creates an objective; `fairness_lambda` must be finite and non-negative.
    pub fn new(
        fairness_lambda: f32,
        protected_attr_index: usize,
    ) -> Result<Self, ConfigValidationError> {
        if !fairness_lambda.is_finite() {
            return Err(ConfigValidationError::NonFiniteLambda(fairness_lambda));
        }
        if fairness_lambda < 0.0 {
            return Err(ConfigValidationError::NegativeLambda(fairness_lambda));
        }
        Ok(Self {
            fairness_lambda,
            regularizer: FairnessRegularizer::new(protected_attr_index),
        })
    }

    /// Objective with no fairness term
    pub fn task_only() -> Self {
        Self {
            fairness_lambda: 0.0,
            regularizer: FairnessRegularizer::new(0),
        }
    }

    /// Regularization strength
    pub fn fairness_lambda(&self) -> f32 {
        self.fairness_lambda
    }

    /// Underlying penalty
    pub fn regularizer(&self) -> &FairnessRegularizer {
        &self.regularizer
    }

    /// Returns true if the fairness term contributes
    pub fn is_regularized(&self) -> bool {
        self.fairness_lambda > 0.0
    }

    /// Adds `λ·penalty` (value and gradient) to the task loss.
    pub fn combine(
        &self,
        task: LossOutput,
        raw_outputs: ArrayView2<'_, f32>,
        inputs: ArrayView2<'_, f32>,
    ) -> Result<LossOutput, TrainError> {
        if !self.is_regularized() {
            return Ok(task);
        }
        let penalty = self.regularizer.penalty_with_grad(raw_outputs, inputs)?;
        let mut grad = task.grad;
        grad.scaled_add(self.fairness_lambda, &penalty.grad);
        Ok(LossOutput {
            value: task.value + self.fairness_lambda * penalty.value,
            grad,
        })
    }
}

/// Everything a local fit needs besides the model and its data
pub struct FairTrainingStep<'a> {
    /// Task loss
    pub loss_fn: &'a dyn LossFn,
    /// Task loss plus fairness term
    pub objective: FairObjective,
    /// Passes over the loader
    pub epochs: usize,
    /// Device to train on
    pub device: Device,
}

impl FairTrainingStep<'_> {
    /// Trains `model` in place and returns the mean total loss per batch.
    ///
    /// The scheduler, if any, is advanced once per epoch. The model is back
    /// on the host in inference mode when this returns, on success or error.
    pub fn run<M: Model + ?Sized>(
        &self,
        model: &mut M,
        loader: &dyn DataLoader,
        optimizer: &mut dyn Optimizer,
        mut scheduler: Option<&mut dyn LrScheduler>,
    ) -> Result<f32, TrainError> {
        if self.epochs == 0 {
            return Err(ConfigValidationError::ZeroEpochs.into());
        }
        let num_batches = loader.num_batches();
        if num_batches == 0 {
            return Err(TrainError::EmptyLoader);
        }
        let (index, width) = (self.objective.regularizer.protected_attr_index(), model.input_dim());
        if self.objective.is_regularized() && index >= width {
            return Err(ConfigValidationError::ProtectedAttrOutOfRange { index, width }.into());
        }

        info!(
            "Local fit: {} epochs x {} batches, loss={}, lambda={}, device={}",
            self.epochs,
            num_batches,
            self.loss_fn.name(),
            self.objective.fairness_lambda,
            self.device
        );

        let mut model = DeviceScope::acquire(model, self.device, true);
        let mut running_loss = 0.0f64;
        for epoch in 0..self.epochs {
            let mut epoch_loss = 0.0f64;
            for (step, batch) in loader.batches().enumerate() {
                optimizer.zero_grad(model.parameters_mut());
                let outputs = model.forward(batch.inputs())?;
                let task = self.loss_fn.evaluate(outputs.view(), batch.labels())?;
                let task_value = task.value;
                let total = self.objective.combine(task, outputs.view(), batch.inputs())?;
                model.backward(total.grad.view())?;
                optimizer.step(model.parameters_mut())?;

                trace!(epoch, step, task_loss = task_value, total_loss = total.value, "batch");
                epoch_loss += f64::from(total.value);
            }
            running_loss += epoch_loss;

            if let Some(scheduler) = scheduler.as_mut() {
                scheduler.step(optimizer);
            }
            debug!(
                "Epoch {}/{}: mean loss {:.6}, lr {}",
                epoch + 1,
                self.epochs,
                epoch_loss / num_batches as f64,
                optimizer.learning_rate()
            );
        }

        let mean = running_loss / (self.epochs * num_batches) as f64;
        Ok(mean as f32)
    }
}

/// Free-function form of [`FairTrainingStep::run`].
#[allow(clippy::too_many_arguments)]
pub fn fit<M: Model + ?Sized>(
    model: &mut M,
    loader: &dyn DataLoader,
    loss_fn: &dyn LossFn,
    objective: FairObjective,
    optimizer: &mut dyn Optimizer,
    scheduler: Option<&mut dyn LrScheduler>,
    epochs: usize,
    device: Device,
) -> Result<f32, TrainError> {
    FairTrainingStep {
        loss_fn,
        objective,
        epochs,
        device,
    }
    .run(model, loader, optimizer, scheduler)
}
