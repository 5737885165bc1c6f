//! Fairness-regularized training and fairness-aware evaluation
//!
//! This crate hosts the two model-touching passes of a fairness-aware
//! federated client:
//!
//! - **local fit**: minibatch SGD on `task_loss + λ·|cov(p, a)|`, where `p` is
//!   the positive-class probability and `a` the protected attribute
//! - **evaluation**: one pass over held-out data producing loss, standard
//!   metrics, Demographic Parity and Equal Opportunity differences
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                           fedfair-train                            │
//! │  ┌──────────────────┐   ┌───────────────────┐   ┌───────────────┐  │
//! │  │ FairClient       │──►│ FairTrainingStep  │──►│ Model         │  │
//! │  │  - config        │   │  - FairObjective  │   │ LossFn        │  │
//! │  │  - lazy Sgd      │   │  - DeviceScope    │   │ Optimizer     │  │
//! │  │  - loaders       │   └───────────────────┘   │ LrScheduler   │  │
//! │  └────────┬─────────┘   ┌───────────────────┐   │ DataLoader    │  │
//! │           └────────────►│ FairnessEvaluator │──►│               │  │
//! │                         │  - single pass    │   └───────────────┘  │
//! │                         └───────────────────┘                      │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```
//! use fedfair_common::{EvaluatorConfig, FairClientConfig, GroupSpec, OptimizerConfig};
//! use fedfair_train::{CrossEntropyLoss, FairClient, FairnessEvaluator, InMemoryLoader, LinearClassifier};
//! use ndarray::{Array1, Array2};
//!
//! let inputs = Array2::from_shape_fn((8, 2), |(i, j)| if j == 0 { (i % 2) as f32 } else { 1.0 });
//! let labels = Array1::from_shape_fn(8, |i| (i % 2) as i64);
//! let train = InMemoryLoader::from_arrays(inputs.clone(), labels.clone(), 4, Some(0)).unwrap();
//! let test = InMemoryLoader::from_arrays(inputs, labels, 4, None).unwrap();
//!
//! let config = FairClientConfig::default()
//!     .with_fairness_lambda(1.0)
//!     .with_group(GroupSpec::new(0, 0.0))
//!     .with_optimizer(OptimizerConfig::sgd(0.1));
//! let mut client = FairClient::new(0, config, 2, Box::new(train), Box::new(CrossEntropyLoss))
//!     .unwrap()
//!     .with_test_set(Box::new(test));
//!
//! let mut model = LinearClassifier::new(2, 2, 42).unwrap();
//! let loss = client.fit(&mut model, 0).unwrap();
//! assert!(loss.is_finite());
//!
//! let mut evaluator = FairnessEvaluator::new(EvaluatorConfig::new(GroupSpec::new(0, 0.0)));
//! let results = client.evaluate(&mut evaluator, &mut model, 1).unwrap();
//! assert!(results.contains_key("demographic_parity"));
//! ```

pub mod client;
pub mod data;
pub mod device;
pub mod error;
pub mod evaluator;
pub mod loss;
pub mod model;
pub mod optim;
pub mod regularizer;
pub mod training;

// Re-export main types
pub use client::{ClientState, FairClient};
pub use data::{DataLoader, InMemoryLoader};
pub use device::{Device, DeviceScope};
pub use error::TrainError;
pub use evaluator::FairnessEvaluator;
pub use loss::{BceWithLogitsLoss, CrossEntropyLoss, LossFn, LossOutput};
pub use model::{LinearClassifier, Model, Parameter};
pub use optim::{LrScheduler, Optimizer, OptimizerFactory, SchedulerFactory, Sgd, StepLr};
pub use regularizer::{FairnessRegularizer, PenaltyOutput};
pub use training::{fit, FairObjective, FairTrainingStep};
