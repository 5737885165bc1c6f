//! Configuration structures for fair clients and evaluators
//!
//! All types deserialize from YAML (the format experiment configs are kept in)
//! and carry a `validate()` that rejects bad values before any data is seen.
//! The one check that needs the model, `protected_attr_index < width`, is
//! exposed separately as [`GroupSpec::validate_width`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigValidationError};

/// Identifies the protected attribute and the value that marks the sensitive group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Column of the input feature matrix holding the protected attribute
    pub protected_attr_index: usize,
    /// Attribute value defining the sensitive group
    pub sensitive_group_val: f32,
}

impl GroupSpec {
    /// Creates a new group specification.
    pub fn new(protected_attr_index: usize, sensitive_group_val: f32) -> Self {
        Self {
            protected_attr_index,
            sensitive_group_val,
        }
    }

    /// Returns true if `value` belongs to the sensitive group
    #[inline]
    pub fn is_sensitive(&self, value: f32) -> bool {
        value == self.sensitive_group_val
    }

    /// Checks that the protected column exists for inputs of `width` features.
    pub fn validate_width(&self, width: usize) -> Result<(), ConfigValidationError> {
        if self.protected_attr_index >= width {
            return Err(ConfigValidationError::ProtectedAttrOutOfRange {
                index: self.protected_attr_index,
                width,
            });
        }
        Ok(())
    }
}

impl Default for GroupSpec {
    fn default() -> Self {
        Self::new(0, 0.0)
    }
}

/// Optimizer algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Stochastic gradient descent with optional momentum
    #[default]
    Sgd,
}

/// Optimizer hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Algorithm
    #[serde(default)]
    pub kind: OptimizerKind,
    /// Learning rate
    pub lr: f32,
    /// Momentum factor in [0, 1)
    #[serde(default)]
    pub momentum: f32,
    /// L2 penalty applied to the gradients
    #[serde(default)]
    pub weight_decay: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: OptimizerKind::Sgd,
            lr: 0.01,
            momentum: 0.9,
            weight_decay: 0.0,
        }
    }
}

impl OptimizerConfig {
    /// Plain SGD with the given learning rate and no momentum
    pub fn sgd(lr: f32) -> Self {
        Self {
            lr,
            momentum: 0.0,
            ..Default::default()
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

    /// Validates the optimizer settings
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(ConfigValidationError::InvalidLearningRate(self.lr));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(ConfigValidationError::InvalidMomentum(self.momentum));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(ConfigValidationError::InvalidWeightDecay(self.weight_decay));
        }
        Ok(())
    }
}

/// Learning-rate schedule, advanced once per local epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerConfig {
    /// Multiply the learning rate by `gamma` every `step_size` epochs
    StepLr {
        /// Epochs between decays
        step_size: usize,
        /// Multiplicative decay factor
        gamma: f32,
    },
}

impl SchedulerConfig {
    /// Validates the schedule parameters
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        match self {
            SchedulerConfig::StepLr { step_size, gamma } => {
                if *step_size == 0 {
                    return Err(ConfigValidationError::InvalidScheduler(
                        "step_size must be at least 1".to_string(),
                    ));
                }
                if !(gamma.is_finite() && *gamma > 0.0) {
                    return Err(ConfigValidationError::InvalidScheduler(format!(
                        "gamma must be positive and finite, got {gamma}"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Hyperparameters of a fairness-aware federated client.
///
/// Immutable for the lifetime of one client round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairClientConfig {
    /// Local epochs per round
    #[serde(default = "default_local_epochs")]
    pub local_epochs: usize,
    /// Minibatch size for train sets built from raw arrays (`FairClient::from_arrays`)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fairness regularization strength (0 disables the penalty)
    #[serde(default)]
    pub fairness_lambda: f32,
    /// Column of the protected attribute
    #[serde(default)]
    pub protected_attr_index: usize,
    /// Value defining the sensitive group
    #[serde(default)]
    pub sensitive_group_val: f32,
    /// Optimizer settings
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// Optional learning-rate schedule
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

fn default_local_epochs() -> usize {
    1
}

fn default_batch_size() -> usize {
    32
}

impl Default for FairClientConfig {
    fn default() -> Self {
        Self {
            local_epochs: default_local_epochs(),
            batch_size: default_batch_size(),
            fairness_lambda: 0.0,
            protected_attr_index: 0,
            sensitive_group_val: 0.0,
            optimizer: OptimizerConfig::default(),
            scheduler: None,
        }
    }
}

impl FairClientConfig {
    /// Sets the fairness regularization strength
    pub fn with_fairness_lambda(mut self, fairness_lambda: f32) -> Self {
        self.fairness_lambda = fairness_lambda;
        self
    }

    /// Sets the protected attribute column and sensitive value
    pub fn with_group(mut self, group: GroupSpec) -> Self {
        self.protected_attr_index = group.protected_attr_index;
        self.sensitive_group_val = group.sensitive_group_val;
        self
    }

    /// Sets the number of local epochs
    pub fn with_local_epochs(mut self, local_epochs: usize) -> Self {
        self.local_epochs = local_epochs;
        self
    }

    /// Sets the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the optimizer
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the learning-rate schedule
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Protected-group specification carried by this config
    pub fn group(&self) -> GroupSpec {
        GroupSpec::new(self.protected_attr_index, self.sensitive_group_val)
    }

    /// Validates every width-independent setting.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.fairness_lambda.is_nan() || self.fairness_lambda.is_infinite() {
            return Err(ConfigValidationError::NonFiniteLambda(self.fairness_lambda));
        }
        if self.fairness_lambda < 0.0 {
            return Err(ConfigValidationError::NegativeLambda(self.fairness_lambda));
        }
        if self.local_epochs == 0 {
            return Err(ConfigValidationError::ZeroEpochs);
        }
        if self.batch_size == 0 {
            return Err(ConfigValidationError::InvalidBatchSize);
        }
        self.optimizer.validate()?;
        if let Some(scheduler) = &self.scheduler {
            scheduler.validate()?;
        }
        Ok(())
    }

    /// Validates all settings, including the protected column against `width`.
    pub fn validate_for_width(&self, width: usize) -> Result<(), ConfigValidationError> {
        self.validate()?;
        self.group().validate_width(width)
    }

    /// Parses a client configuration from a YAML string.
    ///
    /// # Example
    /// ```
    /// use fedfair_common::FairClientConfig;
    ///
    /// let yaml = r#"
    /// local_epochs: 2
    /// fairness_lambda: 0.5
    /// protected_attr_index: 3
    /// optimizer:
    ///   lr: 0.05
    ///   momentum: 0.9
    /// "#;
    ///
    /// let config = FairClientConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.local_epochs, 2);
    /// assert_eq!(config.batch_size, 32);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a client configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Serializes the configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Configuration of the server-side fairness evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Evaluate every N rounds (0 disables periodic evaluation)
    #[serde(default = "default_eval_every")]
    pub eval_every: usize,
    /// Column of the protected attribute
    #[serde(default)]
    pub protected_attr_index: usize,
    /// Value defining the sensitive group
    #[serde(default)]
    pub sensitive_group_val: f32,
}

fn default_eval_every() -> usize {
    1
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            eval_every: default_eval_every(),
            protected_attr_index: 0,
            sensitive_group_val: 0.0,
        }
    }
}

impl EvaluatorConfig {
    /// Creates an evaluator config for the given group that runs every round
    pub fn new(group: GroupSpec) -> Self {
        Self {
            eval_every: default_eval_every(),
            protected_attr_index: group.protected_attr_index,
            sensitive_group_val: group.sensitive_group_val,
        }
    }

    /// Sets the evaluation cadence
    pub fn with_eval_every(mut self, eval_every: usize) -> Self {
        self.eval_every = eval_every;
        self
    }

    /// Protected-group specification carried by this config
    pub fn group(&self) -> GroupSpec {
        GroupSpec::new(self.protected_attr_index, self.sensitive_group_val)
    }

    /// Parses an evaluator configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
