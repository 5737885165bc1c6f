//! Fairness-aware federated client
//!
//! A [`FairClient`] owns one participant's data, task loss and
//! hyperparameters. The global model is lent to it for each local fit and
//! handed back on the host afterwards; the client never keeps a reference.

#![allow(missing_docs)]

use fedfair_common::{log_metrics, FairClientConfig, MetricsMap};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::{DataLoader, InMemoryLoader};
use crate::device::Device;
use crate::error::TrainError;
use crate::evaluator::FairnessEvaluator;
use crate::loss::LossFn;
use crate::model::Model;
use crate::optim::{LrScheduler, Optimizer, OptimizerFactory, SchedulerFactory};
use crate::training::{FairObjective, FairTrainingStep};

/// Lifecycle state of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientState {
    /// Waiting for the next round
    Idle,
    /// Running a local fit
    Training,
}

/// Federated client that trains with a fairness penalty
pub struct FairClient {
    index: usize,
    config: FairClientConfig,
    objective: FairObjective,
    input_dim: usize,
    train_set: Box<dyn DataLoader + Send>,
    test_set: Option<Box<dyn DataLoader + Send>>,
    loss_fn: Box<dyn LossFn>,
    /// Built on the first fit and reused across rounds
    optimizer: Option<Box<dyn Optimizer>>,
    scheduler: Option<Box<dyn LrScheduler>>,
    device: Device,
    state: ClientState,
    rounds_completed: usize,
}

impl FairClient {
    /// Creates a client for models of width `input_dim`.
    ///
    /// Rejects negative or non-finite `fairness_lambda` and a protected
    /// column outside `[0, input_dim)`.
    pub fn new(
        index: usize,
        config: FairClientConfig,
        input_dim: usize,
        train_set: Box<dyn DataLoader + Send>,
        loss_fn: Box<dyn LossFn>,
    ) -> Result<Self, TrainError> {
        config.validate_for_width(input_dim)?;
        if let Some(width) = train_set
            .batches()
            .map(|b| b.width())
            .find(|&w| w != input_dim)
        {
            return Err(TrainError::ShapeMismatch {
                context: "client train set",
                expected: vec![input_dim],
                actual: vec![width],
            });
        }
        let objective = FairObjective::new(config.fairness_lambda, config.protected_attr_index)?;

        info!(
            "Created fair client {} ({} train batches, lambda={}, protected column {})",
            index,
            train_set.num_batches(),
            config.fairness_lambda,
            config.protected_attr_index
        );

        Ok(Self {
            index,
            config,
            objective,
            input_dim,
            train_set,
            test_set: None,
            loss_fn,
            optimizer: None,
            scheduler: None,
            device: Device::Cpu,
            state: ClientState::Idle,
            rounds_completed: 0,
        })
    }

    /// Creates a client whose train set is batched from raw arrays using
    /// `config.batch_size`, shuffled once when `shuffle` carries a seed.
    pub fn from_arrays(
        index: usize,
        config: FairClientConfig,
        inputs: Array2<f32>,
        labels: Array1<i64>,
        shuffle: Option<u64>,
        loss_fn: Box<dyn LossFn>,
    ) -> Result<Self, TrainError> {
        config.validate()?;
        let input_dim = inputs.ncols();
        let train_set = InMemoryLoader::from_arrays(inputs, labels, config.batch_size, shuffle)?;
        Self::new(index, config, input_dim, Box::new(train_set), loss_fn)
    }

    /// Attaches a local test set
    pub fn with_test_set(mut self, test_set: Box<dyn DataLoader + Send>) -> Self {
        self.test_set = Some(test_set);
        self
    }

    /// Sets the device used for local training
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn config(&self) -> &FairClientConfig {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn rounds_completed(&self) -> usize {
        self.rounds_completed
    }

    /// Number of local training examples (FedAvg weight)
    pub fn num_train_examples(&self) -> usize {
        self.train_set.num_examples()
    }

    /// Current learning rate, once the optimizer exists
    pub fn learning_rate(&self) -> Option<f32> {
        self.optimizer.as_ref().map(|o| o.learning_rate())
    }

    /// Runs one local fit and returns the mean total loss.
    ///
    /// A non-zero `override_local_epochs` replaces the configured
    /// `local_epochs` for this call only.
    pub fn fit(
        &mut self,
        model: &mut dyn Model,
        override_local_epochs: usize,
    ) -> Result<f32, TrainError> {
        if model.input_dim() != self.input_dim {
            return Err(TrainError::ShapeMismatch {
                context: "client model",
                expected: vec![self.input_dim],
                actual: vec![model.input_dim()],
            });
        }
        let epochs = if override_local_epochs > 0 {
            override_local_epochs
        } else {
            self.config.local_epochs
        };

        if self.optimizer.is_none() {
            debug!("Client {}: building optimizer from {:?}", self.index, self.config.optimizer);
            self.scheduler = self.config.scheduler.as_ref().map(SchedulerFactory::build);
        }
        let optimizer = self
            .optimizer
            .get_or_insert_with(|| self.config.optimizer.build());

        self.state = ClientState::Training;
        let step = FairTrainingStep {
            loss_fn: self.loss_fn.as_ref(),
            objective: self.objective,
            epochs,
            device: self.device,
        };
        let result = step.run(
            model,
            self.train_set.as_ref(),
            optimizer.as_mut(),
            self.scheduler
                .as_mut()
                .map(|s| s.as_mut() as &mut dyn LrScheduler),
        );
        self.state = ClientState::Idle;

        let loss = result?;
        self.rounds_completed += 1;
        info!("Client {} finished local fit: mean loss {:.6}", self.index, loss);
        Ok(loss)
    }

    /// Evaluates `model` on this client's test set.
    ///
    /// Returns an empty mapping when the client has no test set.
    pub fn evaluate(
        &self,
        evaluator: &mut FairnessEvaluator,
        model: &mut dyn Model,
        round: usize,
    ) -> Result<MetricsMap, TrainError> {
        let Some(test_set) = self.test_set.as_deref() else {
            debug!("Client {} has no test set; skipping evaluation", self.index);
            return Ok(MetricsMap::new());
        };
        let results = evaluator.evaluate(
            round,
            Some(model),
            test_set,
            Some(self.loss_fn.as_ref()),
            None,
            self.device,
        )?;
        log_metrics(&format!("client-{}", self.index), round, &results);
        Ok(results)
    }
}

impl std::fmt::Debug for FairClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FairClient")
            .field("index", &self.index)
            .field("config", &self.config)
            .field("input_dim", &self.input_dim)
            .field("loss_fn", &self.loss_fn.name())
            .field("device", &self.device)
            .field("state", &self.state)
            .field("rounds_completed", &self.rounds_completed)
            .finish()
    }
}
