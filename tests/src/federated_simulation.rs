//! Federated simulation tests
//!
//! Several fair clients train a shared linear model over simulated rounds
//! (FedAvg between rounds) while a server-side evaluator measures loss and
//! fairness on the union of the clients' test splits.

use fedfair_common::{EvaluatorConfig, FairClientConfig, GroupSpec, MetricsMap, OptimizerConfig};
use fedfair_metrics::{DEMOGRAPHIC_PARITY_KEY, EQUAL_OPPORTUNITY_KEY, LOSS_KEY};
use fedfair_train::{
    fit, ClientState, CrossEntropyLoss, DataLoader, Device, FairClient, FairObjective,
    FairnessEvaluator, InMemoryLoader, LinearClassifier, Model, OptimizerFactory, TrainError,
};

use crate::test_fixtures::{
    federated_average, group_positive_rates, BiasedDatasetConfig, SyntheticDataset,
};
use crate::test_utils::{init_test_logging, TestResult};

const NUM_CLIENTS: usize = 3;
const BATCH_SIZE: usize = 16;

struct Federation {
    clients: Vec<FairClient>,
    test_sets: Vec<InMemoryLoader>,
    evaluator: FairnessEvaluator,
    global: LinearClassifier,
    holdout: SyntheticDataset,
}

fn federation(fairness_lambda: f32, seed: u64) -> TestResult<Federation> {
    let group = GroupSpec::new(0, 0.0);
    let data = SyntheticDataset::generate(&BiasedDatasetConfig::default().with_examples(900).with_seed(seed));
    let (train, holdout) = data.train_test_split(0.2);

    let config = FairClientConfig::default()
        .with_fairness_lambda(fairness_lambda)
        .with_group(group)
        .with_batch_size(BATCH_SIZE)
        .with_optimizer(OptimizerConfig::sgd(0.2));

    let mut clients = Vec::new();
    let mut test_sets = Vec::new();
    for (index, shard) in train.partition(NUM_CLIENTS).into_iter().enumerate() {
        let (local_train, local_test) = shard.train_test_split(0.25);
        let loader = local_train.loader(BATCH_SIZE, Some(seed + index as u64))?;
        let client = FairClient::new(
            index,
            config.clone(),
            data.width(),
            Box::new(loader),
            Box::new(CrossEntropyLoss),
        )?
        .with_test_set(Box::new(local_test.loader(BATCH_SIZE, None)?));
        clients.push(client);
        test_sets.push(local_test.loader(BATCH_SIZE, None)?);
    }

    Ok(Federation {
        clients,
        test_sets,
        evaluator: FairnessEvaluator::new(EvaluatorConfig::new(group).with_eval_every(2)),
        global: LinearClassifier::new(data.width(), 2, seed)?,
        holdout,
    })
}

impl Federation {
    /// Runs `rounds` rounds and returns the evaluation results of every evaluated round.
    fn run(&mut self, rounds: usize) -> TestResult<Vec<(usize, MetricsMap)>> {
        let mut history = Vec::new();
        for round in 1..=rounds {
            let mut updates = Vec::with_capacity(self.clients.len());
            for client in &mut self.clients {
                let mut local = self.global.clone();
                let loss = client.fit(&mut local, 0)?;
                assert!(loss.is_finite(), "client {} diverged", client.index());
                updates.push((local, client.num_train_examples()));
            }
            self.global = federated_average(&updates)?;

            if self.evaluator.should_evaluate(round) {
                let loaders: Vec<&dyn DataLoader> =
                    self.test_sets.iter().map(|l| l as &dyn DataLoader).collect();
                let results = self.evaluator.evaluate_many(
                    round,
                    Some(&mut self.global),
                    &loaders,
                    Some(&CrossEntropyLoss),
                    None,
                    Device::Cpu,
                )?;
                history.push((round, results));
            }
        }
        Ok(history)
    }

    /// |P(ŷ=1 | sensitive) − P(ŷ=1 | other)| on the held-out split
    fn holdout_disparity(&mut self) -> f64 {
        let (s, o) = group_positive_rates(&mut self.global, &self.holdout, GroupSpec::new(0, 0.0));
        (s - o).abs()
    }
}

#[test]
fn test_rounds_produce_reserved_metrics_on_cadence() -> TestResult {
    init_test_logging();
    let mut fed = federation(0.5, 1)?;
    let history = fed.run(4)?;

    assert_eq!(history.iter().map(|(r, _)| *r).collect::<Vec<_>>(), vec![2, 4]);
    for (_, results) in &history {
        assert_eq!(results.len(), 3);
        assert!(results[LOSS_KEY].is_finite());
        assert!((0.0..=1.0).contains(&results[DEMOGRAPHIC_PARITY_KEY]));
        assert!((0.0..=1.0).contains(&results[EQUAL_OPPORTUNITY_KEY]));
    }
    assert!(fed.clients.iter().all(|c| c.state() == ClientState::Idle));
    assert!(fed.clients.iter().all(|c| c.rounds_completed() == 4));
    assert_eq!(fed.global.device(), Device::Cpu);
    Ok(())
}

#[test]
fn test_training_improves_evaluation_loss() -> TestResult {
    let mut fed = federation(0.0, 2)?;
    let mut untrained = fed.global.clone();
    let loaders: Vec<&dyn DataLoader> = fed.test_sets.iter().map(|l| l as &dyn DataLoader).collect();
    let before = fed.evaluator.evaluate_many(
        0,
        Some(&mut untrained),
        &loaders,
        Some(&CrossEntropyLoss),
        None,
        Device::Cpu,
    )?;
    drop(loaders);

    let history = fed.run(6)?;
    let (_, after) = history.last().ok_or("no evaluated round")?;
    assert!(
        after[LOSS_KEY] < before[LOSS_KEY],
        "loss {} -> {}",
        before[LOSS_KEY],
        after[LOSS_KEY]
    );
    Ok(())
}

#[test]
fn test_fairness_penalty_narrows_group_gap() -> TestResult {
    let mut plain = federation(0.0, 3)?;
    plain.run(8)?;
    let mut fair = federation(5.0, 3)?;
    fair.run(8)?;

    let plain_gap = plain.holdout_disparity();
    let fair_gap = fair.holdout_disparity();
    assert!(
        fair_gap <= plain_gap + 1e-9,
        "regularized gap {fair_gap} exceeds unregularized gap {plain_gap}"
    );
    Ok(())
}

#[test]
fn test_client_with_zero_lambda_matches_plain_fit() -> TestResult {
    let data = SyntheticDataset::generate(&BiasedDatasetConfig::default().with_examples(96));
    let config = FairClientConfig::default()
        .with_group(GroupSpec::new(0, 0.0))
        .with_local_epochs(3)
        .with_optimizer(OptimizerConfig::sgd(0.1).with_momentum(0.9));

    let mut client = FairClient::new(
        0,
        config.clone(),
        data.width(),
        Box::new(data.loader(BATCH_SIZE, None)?),
        Box::new(CrossEntropyLoss),
    )?;
    let mut via_client = LinearClassifier::new(data.width(), 2, 4)?;
    let mut via_fit = via_client.clone();

    let client_loss = client.fit(&mut via_client, 0)?;

    let loader = data.loader(BATCH_SIZE, None)?;
    let mut optimizer = config.optimizer.build();
    let fit_loss = fit(
        &mut via_fit,
        &loader,
        &CrossEntropyLoss,
        FairObjective::task_only(),
        optimizer.as_mut(),
        None,
        3,
        Device::Cpu,
    )?;

    assert_eq!(client_loss, fit_loss);
    assert_eq!(via_client.weight(), via_fit.weight());
    assert_eq!(via_client.bias(), via_fit.bias());
    Ok(())
}

#[test]
fn test_client_failure_leaves_model_on_host() {
    let data = SyntheticDataset::generate(&BiasedDatasetConfig::default().with_examples(32));
    let wide = LinearClassifier::new(data.width() + 1, 2, 0).unwrap();
    let mut client = FairClient::new(
        0,
        FairClientConfig::default(),
        data.width(),
        Box::new(data.loader(8, None).unwrap()),
        Box::new(CrossEntropyLoss),
    )
    .unwrap()
    .with_device(Device::Accelerator(0));

    let mut model = wide;
    let err = client.fit(&mut model, 0).unwrap_err();
    assert!(matches!(err, TrainError::ShapeMismatch { .. }));
    assert_eq!(client.state(), ClientState::Idle);
    assert_eq!(client.rounds_completed(), 0);
    assert_eq!(model.device(), Device::Cpu);
}
