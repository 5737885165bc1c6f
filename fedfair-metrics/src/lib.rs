//! Streaming group-fairness metrics for federated evaluation
//!
//! Computes Demographic Parity and Equal Opportunity differences from
//! minibatch predictions without keeping the prediction history.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        fedfair-metrics                           │
//! │  ┌──────────────────────┐   ┌──────────────────────────────────┐ │
//! │  │ GroupRateAccumulator │◄──│ FairnessMetric                   │ │
//! │  │  - 4 counters        │   │  - DemographicParity (all rows)  │ │
//! │  │  - update / compute  │   │  - EqualOpportunity  (y = 1)     │ │
//! │  │  - merge (sum)       │   └──────────────────────────────────┘ │
//! │  └──────────────────────┘   ┌──────────────────────────────────┐ │
//! │                             │ MetricRegistry (standard metrics)│ │
//! │                             └──────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Partial accumulators from several workers combine with
//! [`GroupRateAccumulator::merge`]; because merging is a counter sum, the
//! final statistic does not depend on merge order or on how the data was
//! partitioned.

pub mod accumulator;
pub mod error;
pub mod fairness;
pub mod registry;

pub use accumulator::{GroupCounts, GroupRateAccumulator, RATE_EPSILON};
pub use error::MetricError;
pub use fairness::{DemographicParity, EqualOpportunity, FairnessMetric, FairnessReport};
pub use registry::{Metric, MetricRegistry};

/// Result key for the mean evaluation loss
pub const LOSS_KEY: &str = "loss";
/// Result key for the Demographic Parity difference
pub const DEMOGRAPHIC_PARITY_KEY: &str = "demographic_parity";
/// Result key for the Equal Opportunity difference
pub const EQUAL_OPPORTUNITY_KEY: &str = "equal_opportunity";

/// Keys the evaluator writes itself; standard metrics may not use them
pub const RESERVED_KEYS: &[&str] = &[LOSS_KEY, DEMOGRAPHIC_PARITY_KEY, EQUAL_OPPORTUNITY_KEY];
