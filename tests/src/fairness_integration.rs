//! Integration tests for the fairness metric engine
//!
//! This module tests end-to-end scenarios involving:
//! - Demographic Parity and Equal Opportunity through the evaluator
//! - Partial accumulator merging across simulated clients
//! - Fairness report serialization for shipping to a coordinator
//! - Configuration loading into a working client

use fedfair_common::{Batch, EvaluatorConfig, FairClientConfig, GroupSpec, MetricsMap};
use fedfair_metrics::{
    DemographicParity, EqualOpportunity, FairnessMetric, FairnessReport, GroupRateAccumulator,
    DEMOGRAPHIC_PARITY_KEY, EQUAL_OPPORTUNITY_KEY,
};
use fedfair_train::{
    CrossEntropyLoss, Device, FairClient, FairnessEvaluator, FairnessRegularizer, InMemoryLoader,
    LinearClassifier, Model, TrainError,
};
use ndarray::{array, Array2};

use crate::test_fixtures::{BiasedDatasetConfig, SyntheticDataset};
use crate::test_utils::{assert_close, init_test_logging, FAIRNESS_TOLERANCE};

/// Model whose single output column is the second input feature.
fn passthrough_model() -> LinearClassifier {
    LinearClassifier::from_weights(array![[0.0], [1.0]], array![[0.0]]).unwrap()
}

/// Four examples, protected attribute `[0, 0, 1, 1]`, predictions as given.
fn scenario(preds: [u8; 4], labels: [i64; 4]) -> Vec<Batch> {
    let inputs = Array2::from_shape_fn((4, 2), |(i, j)| match j {
        0 => (i / 2) as f32,
        _ => f32::from(preds[i]),
    });
    vec![Batch::new(inputs, labels.to_vec().into()).unwrap()]
}

fn evaluate(batches: &Vec<Batch>) -> MetricsMap {
    let mut evaluator = FairnessEvaluator::new(EvaluatorConfig::new(GroupSpec::new(0, 0.0)));
    let mut model = passthrough_model();
    evaluator
        .evaluate(1, Some(&mut model), batches, None, None, Device::Cpu)
        .unwrap()
}

// ============================================================================
// Metric scenarios
// ============================================================================

#[test]
fn test_equal_positive_rates_give_zero_dp() {
    init_test_logging();
    let results = evaluate(&scenario([1, 0, 1, 0], [1, 0, 1, 0]));
    assert_close(results[DEMOGRAPHIC_PARITY_KEY], 0.0, FAIRNESS_TOLERANCE);
}

#[test]
fn test_disjoint_positive_rates_give_unit_dp() {
    let results = evaluate(&scenario([1, 1, 0, 0], [1, 0, 1, 0]));
    assert_close(results[DEMOGRAPHIC_PARITY_KEY], 1.0, FAIRNESS_TOLERANCE);
}

#[test]
fn test_true_positive_gap_gives_unit_eo() {
    let results = evaluate(&scenario([1, 0, 0, 1], [1, 0, 1, 0]));
    assert_close(results[EQUAL_OPPORTUNITY_KEY], 1.0, FAIRNESS_TOLERANCE);
}

#[test]
fn test_single_group_resolves_to_zero() {
    let inputs = array![[0.0f32, 1.0], [0.0, 0.0], [0.0, 1.0]];
    let batches = vec![Batch::new(inputs, array![1, 1, 0]).unwrap()];
    let results = evaluate(&batches);
    assert_eq!(results[DEMOGRAPHIC_PARITY_KEY], 0.0);
    assert_eq!(results[EQUAL_OPPORTUNITY_KEY], 0.0);
}

#[test]
fn test_no_positive_labels_leaves_eo_empty() {
    let mut eo = EqualOpportunity::new(GroupSpec::new(0, 0.0));
    let batch = &scenario([1, 1, 0, 1], [0, 0, 0, 0])[0];
    let mut model = passthrough_model();
    let outputs = model.forward(batch.inputs()).unwrap();
    eo.update(outputs.view(), batch.labels(), batch.inputs()).unwrap();

    let counts = eo.accumulator().counts();
    assert_eq!(counts.total_in_sensitive, 0);
    assert_eq!(counts.total_in_other, 0);
    assert_eq!(eo.compute(), 0.0);
}

#[test]
fn test_metrics_stay_in_unit_interval_on_random_data() {
    let data = SyntheticDataset::generate(&BiasedDatasetConfig::default().with_seed(11));
    let loader = data.loader(32, None).unwrap();
    let mut evaluator = FairnessEvaluator::new(EvaluatorConfig::new(GroupSpec::new(0, 0.0)));
    for seed in 0..5 {
        let mut model = LinearClassifier::new(data.width(), 2, seed).unwrap();
        let results = evaluator
            .evaluate(0, Some(&mut model), &loader, Some(&CrossEntropyLoss), None, Device::Cpu)
            .unwrap();
        for key in [DEMOGRAPHIC_PARITY_KEY, EQUAL_OPPORTUNITY_KEY] {
            assert!((0.0..=1.0).contains(&results[key]), "{key} = {}", results[key]);
        }
    }
}

// ============================================================================
// Distributed reduction
// ============================================================================

#[test]
fn test_client_partials_merge_to_centralized_result() {
    let group = GroupSpec::new(0, 0.0);
    let data = SyntheticDataset::generate(&BiasedDatasetConfig::default().with_examples(300));
    let mut model = LinearClassifier::new(data.width(), 2, 5).unwrap();

    // centralized
    let mut central = DemographicParity::new(group);
    let batch = data.as_batch();
    let outputs = model.forward(batch.inputs()).unwrap();
    central.update(outputs.view(), batch.labels(), batch.inputs()).unwrap();

    // one partial per client
    let partials: Vec<GroupRateAccumulator> = data
        .partition(3)
        .iter()
        .map(|shard| {
            let mut dp = DemographicParity::new(group);
            let b = shard.as_batch();
            let out = model.forward(b.inputs()).unwrap();
            dp.update(out.view(), b.labels(), b.inputs()).unwrap();
            *dp.accumulator()
        })
        .collect();

    let forward = GroupRateAccumulator::merge_all(0.0, &partials).unwrap();
    let backward = GroupRateAccumulator::merge_all(0.0, partials.iter().rev()).unwrap();
    assert_eq!(forward.counts(), central.accumulator().counts());
    assert_eq!(forward.compute(), backward.compute());
    assert_close(forward.compute(), central.compute(), 1e-12);
}

#[test]
fn test_partials_survive_serialization() {
    let group = GroupSpec::new(0, 0.0);
    let batches = scenario([1, 1, 0, 0], [1, 0, 1, 0]);
    let mut dp = DemographicParity::new(group);
    let mut eo = EqualOpportunity::new(group);
    let mut model = passthrough_model();
    let outputs = model.forward(batches[0].inputs()).unwrap();
    dp.update(outputs.view(), batches[0].labels(), batches[0].inputs()).unwrap();
    eo.update(outputs.view(), batches[0].labels(), batches[0].inputs()).unwrap();

    let report = FairnessReport::from_metrics(&dp, &eo);
    let wire = report.export_json().unwrap();
    let received: FairnessReport = serde_json::from_str(&wire).unwrap();
    assert_eq!(received, report);

    let shipped = serde_json::to_string(dp.accumulator()).unwrap();
    let partial: GroupRateAccumulator = serde_json::from_str(&shipped).unwrap();
    let mut coordinator = DemographicParity::new(group);
    coordinator.merge_from(&partial).unwrap();
    assert_close(coordinator.compute(), 1.0, FAIRNESS_TOLERANCE);
}

#[test]
fn test_merge_rejects_different_sensitive_value() {
    let a = GroupRateAccumulator::new(0.0);
    let mut b = GroupRateAccumulator::new(1.0);
    assert!(b.merge(&a).is_err());
}

// ============================================================================
// Regularizer and configuration
// ============================================================================

#[test]
fn test_regularizer_zero_for_constant_protected_column() {
    let reg = FairnessRegularizer::new(2);
    let data = SyntheticDataset::generate(&BiasedDatasetConfig::default().with_examples(50));
    let mut inputs = data.inputs.clone();
    inputs.column_mut(2).fill(3.0);
    let mut model = LinearClassifier::new(data.width(), 2, 0).unwrap();
    let outputs = model.forward(inputs.view()).unwrap();
    assert_eq!(reg.penalty(outputs.view(), inputs.view()).unwrap(), 0.0);
}

#[test]
fn test_client_from_yaml_config() {
    let yaml = r#"
local_epochs: 2
batch_size: 16
fairness_lambda: 0.5
protected_attr_index: 0
sensitive_group_val: 0.0
optimizer:
  lr: 0.05
  momentum: 0.9
scheduler:
  type: step_lr
  step_size: 1
  gamma: 0.9
"#;
    let config = FairClientConfig::from_yaml(yaml).unwrap();
    let data = SyntheticDataset::generate(&BiasedDatasetConfig::default().with_examples(64));
    let loader = data.loader(config.batch_size, Some(1)).unwrap();
    assert_eq!(fedfair_train::DataLoader::num_batches(&loader), 4);

    let mut client = FairClient::new(
        0,
        config,
        data.width(),
        Box::new(loader),
        Box::new(CrossEntropyLoss),
    )
    .unwrap();
    let mut model = LinearClassifier::new(data.width(), 2, 0).unwrap();
    assert!(client.fit(&mut model, 0).unwrap().is_finite());
    let lr = client.learning_rate().unwrap();
    assert!((lr - 0.05 * 0.81).abs() < 1e-6, "lr = {lr}");
}

#[test]
fn test_out_of_range_protected_column_rejected_at_construction() {
    let config = FairClientConfig::default().with_group(GroupSpec::new(9, 0.0));
    let data = SyntheticDataset::generate(&BiasedDatasetConfig::default().with_examples(8));
    let loader: InMemoryLoader = data.loader(4, None).unwrap();
    let err = FairClient::new(0, config, data.width(), Box::new(loader), Box::new(CrossEntropyLoss))
        .unwrap_err();
    assert!(matches!(err, TrainError::Config(_)));
    assert!(err.to_string().contains('9'));
}
