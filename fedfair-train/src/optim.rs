//! Optimizers and learning-rate schedules
//!
//! Both are built from their serde configs through [`OptimizerFactory`] and
//! [`SchedulerFactory`], so a client only ever stores the configuration until
//! its first local fit.

use fedfair_common::{OptimizerConfig, OptimizerKind, SchedulerConfig};
use ndarray::Array2;
use tracing::debug;

use crate::error::TrainError;
use crate::model::Parameter;

/// First-order optimizer over a model's parameters
pub trait Optimizer: Send {
    /// Clears every parameter gradient
    fn zero_grad(&mut self, params: &mut [Parameter]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Applies one update using the accumulated gradients
    fn step(&mut self, params: &mut [Parameter]) -> Result<(), TrainError>;

    /// Current learning rate
    fn learning_rate(&self) -> f32;

    /// Overrides the learning rate (used by schedulers)
    fn set_learning_rate(&mut self, lr: f32);
}

/// Per-epoch learning-rate schedule
pub trait LrScheduler: Send {
    /// Advances the schedule by one epoch
    fn step(&mut self, optimizer: &mut dyn Optimizer);
}

/// Stochastic gradient descent with momentum and L2 weight decay.
///
/// Update rule per parameter `p` with gradient `g`:
/// `d = g + wd·p`, `v = μ·v + d` (`v = d` on the first step), `p -= lr·v`.
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    velocity: Vec<Array2<f32>>,
}

impl Sgd {
    /// Creates an optimizer with no momentum or weight decay
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            momentum: 0.0,
            weight_decay: 0.0,
            velocity: Vec::new(),
        }
    }

    /// Sets the momentum factor
    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    /// Sets the weight decay
    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [Parameter]) -> Result<(), TrainError> {
        let first_step = self.velocity.is_empty();
        if !first_step && self.velocity.len() != params.len() {
            return Err(TrainError::Optimizer {
                reason: format!(
                    "optimizer tracks {} parameters, model has {}",
                    self.velocity.len(),
                    params.len()
                ),
            });
        }

        for (i, param) in params.iter_mut().enumerate() {
            let mut direction = param.grad.clone();
            if self.weight_decay != 0.0 {
                direction.scaled_add(self.weight_decay, &param.value);
            }
            if self.momentum != 0.0 {
                if first_step {
                    self.velocity.push(direction.clone());
                } else {
                    let v = &mut self.velocity[i];
                    if v.raw_dim() != param.value.raw_dim() {
                        return Err(TrainError::Optimizer {
                            reason: format!("parameter '{}' changed shape", param.name),
                        });
                    }
                    *v *= self.momentum;
                    *v += &direction;
                    direction.assign(&*v);
                }
            }
            param.value.scaled_add(-self.lr, &direction);
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// Multiplies the learning rate by `gamma` every `step_size` epochs
#[derive(Debug, Clone)]
pub struct StepLr {
    step_size: usize,
    gamma: f32,
    epoch: usize,
}

impl StepLr {
    /// Creates the schedule; `step_size` of 0 is treated as 1.
    pub fn new(step_size: usize, gamma: f32) -> Self {
        Self {
            step_size: step_size.max(1),
            gamma,
            epoch: 0,
        }
    }

    /// Epochs stepped so far
    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl LrScheduler for StepLr {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.epoch += 1;
        if self.epoch % self.step_size == 0 {
            let lr = optimizer.learning_rate() * self.gamma;
            debug!(epoch = self.epoch, lr, "learning rate decayed");
            optimizer.set_learning_rate(lr);
        }
    }
}

/// Builds an optimizer from its configuration
pub trait OptimizerFactory {
    /// Instantiates a fresh optimizer with empty state
    fn build(&self) -> Box<dyn Optimizer>;
}

impl OptimizerFactory for OptimizerConfig {
    fn build(&self) -> Box<dyn Optimizer> {
        match self.kind {
            OptimizerKind::Sgd => Box::new(
                Sgd::new(self.lr)
                    .with_momentum(self.momentum)
                    .with_weight_decay(self.weight_decay),
            ),
        }
    }
}

/// Builds a learning-rate scheduler from its configuration
pub trait SchedulerFactory {
    /// Instantiates a scheduler at epoch 0
    fn build(&self) -> Box<dyn LrScheduler>;
}

impl SchedulerFactory for SchedulerConfig {
    fn build(&self) -> Box<dyn LrScheduler> {
        match *self {
            SchedulerConfig::StepLr { step_size, gamma } => Box::new(StepLr::new(step_size, gamma)),
        }
    }
}
