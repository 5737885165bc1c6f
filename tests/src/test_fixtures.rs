//! Test fixtures: synthetic biased datasets and client partitioning
//!
//! The generator produces tabular data whose labels depend on group
//! membership, so an unconstrained classifier picks up the disparity.

use fedfair_common::{Batch, GroupSpec};
use fedfair_train::{InMemoryLoader, LinearClassifier, Model, TrainError};
use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Parameters of a synthetic biased binary-classification dataset
#[derive(Debug, Clone)]
pub struct BiasedDatasetConfig {
    /// Number of examples
    pub num_examples: usize,
    /// Number of features, including the protected column (at least 3)
    pub num_features: usize,
    /// Protected column and sensitive value
    pub group: GroupSpec,
    /// Probability that an example belongs to the sensitive group
    pub sensitive_fraction: f64,
    /// P(y = 1) in the sensitive group
    pub sensitive_base_rate: f64,
    /// P(y = 1) outside the sensitive group
    pub other_base_rate: f64,
    /// RNG seed
    pub seed: u64,
}

impl Default for BiasedDatasetConfig {
    fn default() -> Self {
        Self {
            num_examples: 400,
            num_features: 4,
            group: GroupSpec::new(0, 0.0),
            sensitive_fraction: 0.5,
            sensitive_base_rate: 0.2,
            other_base_rate: 0.8,
            seed: 7,
        }
    }
}

impl BiasedDatasetConfig {
    /// Sets the number of examples
    pub fn with_examples(mut self, num_examples: usize) -> Self {
        self.num_examples = num_examples;
        self
    }

    /// Sets the per-group base rates
    pub fn with_base_rates(mut self, sensitive: f64, other: f64) -> Self {
        self.sensitive_base_rate = sensitive;
        self.other_base_rate = other;
        self
    }

    /// Sets the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Generated features and labels
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    /// `[n, num_features]` features
    pub inputs: Array2<f32>,
    /// Binary labels
    pub labels: Array1<i64>,
}

impl SyntheticDataset {
    /// Draws a dataset.
    ///
    /// The protected column holds `sensitive_group_val` or
    /// `sensitive_group_val + 1`. The first non-protected column is a noisy
    /// copy of the label; the rest are uniform noise.
    pub fn generate(config: &BiasedDatasetConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let n = config.num_examples;
        let width = config.num_features.max(3);
        let protected = config.group.protected_attr_index;
        let signal = if protected == 0 { 1 } else { 0 };

        let mut inputs = Array2::zeros((n, width));
        let mut labels = Array1::zeros(n);
        for (mut row, label) in inputs.rows_mut().into_iter().zip(labels.iter_mut()) {
            let sensitive = rng.gen_bool(config.sensitive_fraction);
            let base_rate = if sensitive {
                config.sensitive_base_rate
            } else {
                config.other_base_rate
            };
            let y = i64::from(rng.gen_bool(base_rate));
            *label = y;

            for (j, x) in row.iter_mut().enumerate() {
                *x = if j == protected {
                    config.group.sensitive_group_val + if sensitive { 0.0 } else { 1.0 }
                } else if j == signal {
                    y as f32 + rng.gen_range(-0.75f32..0.75)
                } else {
                    rng.gen_range(-1.0f32..1.0)
                };
            }
        }
        Self { inputs, labels }
    }

    /// Number of examples
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true when empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Feature width
    pub fn width(&self) -> usize {
        self.inputs.ncols()
    }

    /// Wraps the dataset in a loader
    pub fn loader(&self, batch_size: usize, shuffle: Option<u64>) -> Result<InMemoryLoader, TrainError> {
        InMemoryLoader::from_arrays(self.inputs.clone(), self.labels.clone(), batch_size, shuffle)
    }

    /// The whole dataset as one batch
    pub fn as_batch(&self) -> Batch {
        Batch::new(self.inputs.clone(), self.labels.clone()).expect("generated dataset is valid")
    }

    /// Splits into `parts` contiguous shards of near-equal size
    pub fn partition(&self, parts: usize) -> Vec<SyntheticDataset> {
        let parts = parts.max(1);
        let n = self.len();
        (0..parts)
            .map(|k| {
                let (start, end) = (k * n / parts, (k + 1) * n / parts);
                SyntheticDataset {
                    inputs: self.inputs.slice(s![start..end, ..]).to_owned(),
                    labels: self.labels.slice(s![start..end]).to_owned(),
                }
            })
            .collect()
    }

    /// Splits off the last `fraction` of rows as a test set
    pub fn train_test_split(&self, fraction: f64) -> (SyntheticDataset, SyntheticDataset) {
        let cut = self.len() - (self.len() as f64 * fraction).round() as usize;
        let head = SyntheticDataset {
            inputs: self.inputs.slice(s![..cut, ..]).to_owned(),
            labels: self.labels.slice(s![..cut]).to_owned(),
        };
        let tail = SyntheticDataset {
            inputs: self.inputs.slice(s![cut.., ..]).to_owned(),
            labels: self.labels.slice(s![cut..]).to_owned(),
        };
        (head, tail)
    }
}

/// Sample-weighted average of client models (FedAvg), for simulated rounds
pub fn federated_average(models: &[(LinearClassifier, usize)]) -> Result<LinearClassifier, TrainError> {
    let total: usize = models.iter().map(|(_, n)| *n).sum();
    let (first, _) = models.first().ok_or_else(|| TrainError::Model {
        reason: "no client models to average".to_string(),
    })?;

    let mut weight = Array2::<f32>::zeros(first.weight().raw_dim());
    let mut bias = Array2::<f32>::zeros(first.bias().raw_dim());
    for (model, n) in models {
        let share = *n as f32 / total.max(1) as f32;
        weight.scaled_add(share, &model.weight());
        bias.scaled_add(share, &model.bias());
    }
    LinearClassifier::from_weights(weight, bias)
}

/// Mean positive-prediction rate per group on `dataset` (sensitive, other)
pub fn group_positive_rates(model: &mut dyn Model, dataset: &SyntheticDataset, group: GroupSpec) -> (f64, f64) {
    let outputs = model.forward(dataset.inputs.view()).expect("forward failed");
    let preds = fedfair_common::hard_predictions(outputs.view()).expect("unsupported outputs");
    let protected = dataset.inputs.index_axis(Axis(1), group.protected_attr_index);

    let (mut pos_s, mut n_s, mut pos_o, mut n_o) = (0u32, 0u32, 0u32, 0u32);
    for (&p, &a) in preds.iter().zip(protected.iter()) {
        if group.is_sensitive(a) {
            n_s += 1;
            pos_s += u32::from(p);
        } else {
            n_o += 1;
            pos_o += u32::from(p);
        }
    }
    (
        f64::from(pos_s) / f64::from(n_s.max(1)),
        f64::from(pos_o) / f64::from(n_o.max(1)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_seeded_and_biased() {
        let config = BiasedDatasetConfig::default().with_examples(2000);
        let a = SyntheticDataset::generate(&config);
        let b = SyntheticDataset::generate(&config);
        assert_eq!(a.inputs, b.inputs);
        assert_eq!(a.labels, b.labels);

        let protected = a.inputs.column(0);
        let (mut pos_s, mut n_s, mut pos_o, mut n_o) = (0, 0, 0, 0);
        for (&x, &y) in protected.iter().zip(a.labels.iter()) {
            if x == 0.0 {
                n_s += 1;
                pos_s += y;
            } else {
                n_o += 1;
                pos_o += y;
            }
        }
        let rate_s = pos_s as f64 / n_s as f64;
        let rate_o = pos_o as f64 / n_o as f64;
        assert!(rate_s < 0.3 && rate_o > 0.7, "rates {rate_s} / {rate_o}");
    }

    #[test]
    fn test_partition_covers_all_rows() {
        let data = SyntheticDataset::generate(&BiasedDatasetConfig::default().with_examples(103));
        let parts = data.partition(4);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts.iter().map(SyntheticDataset::len).sum::<usize>(), 103);
        assert_eq!(parts[0].inputs.row(0), data.inputs.row(0));

        let (train, test) = data.train_test_split(0.2);
        assert_eq!(train.len() + test.len(), 103);
        assert_eq!(test.len(), 21);
    }

    #[test]
    fn test_federated_average_of_identical_models_is_identity() {
        let model = LinearClassifier::new(4, 2, 3).unwrap();
        let avg = federated_average(&[(model.clone(), 10), (model.clone(), 30)]).unwrap();
        for (a, b) in avg.weight().iter().zip(model.weight().iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert!(federated_average(&[]).is_err());
    }
}
