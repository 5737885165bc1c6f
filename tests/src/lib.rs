//! Integration test framework for fedfair
//!
//! This crate provides fixtures and helpers for integration testing of the
//! fairness metric engine and the fair training/evaluation loops.
//!
//! # Components
//!
//! - [`test_fixtures`] - Synthetic biased datasets, client partitioning, FedAvg helper
//! - [`test_utils`] - Logging setup and float assertions
//!
//! # Test Categories
//!
//! 1. **Fairness Tests** - Metric scenarios, partial merging, report shipping
//! 2. **Federated Simulation Tests** - Multi-client rounds with server-side evaluation

#![allow(missing_docs)]

pub mod test_fixtures;

#[cfg(test)]
mod fairness_integration;
#[cfg(test)]
mod federated_simulation;

pub use test_fixtures::{
    federated_average, group_positive_rates, BiasedDatasetConfig, SyntheticDataset,
};
pub use test_utils::{assert_close, init_test_logging, TestResult, FAIRNESS_TOLERANCE};
