//! Batch iteration contract and an in-memory loader

use fedfair_common::{Batch, DataError};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::TrainError;

/// A re-iterable source of labelled minibatches
pub trait DataLoader {
    /// Iterates the batches once, in order
    fn batches(&self) -> Box<dyn Iterator<Item = &Batch> + '_>;

    /// Number of batches one iteration yields
    fn num_batches(&self) -> usize;

    /// Number of examples one iteration yields
    fn num_examples(&self) -> usize {
        self.batches().map(Batch::len).sum()
    }
}

impl DataLoader for Vec<Batch> {
    fn batches(&self) -> Box<dyn Iterator<Item = &Batch> + '_> {
        Box::new(self.iter())
    }

    fn num_batches(&self) -> usize {
        self.len()
    }
}

/// Loader over a dataset held in memory, pre-split into fixed-size batches.
///
/// The last batch holds the remainder when the row count is not a multiple
/// of the batch size. Empty batches are never produced.
#[derive(Debug, Clone)]
pub struct InMemoryLoader {
    batches: Vec<Batch>,
    batch_size: usize,
}

impl InMemoryLoader {
    /// Splits `inputs`/`labels` into batches of `batch_size` rows.
    ///
    /// With `shuffle = Some(seed)` the rows are permuted once, reproducibly.
    pub fn from_arrays(
        inputs: Array2<f32>,
        labels: Array1<i64>,
        batch_size: usize,
        shuffle: Option<u64>,
    ) -> Result<Self, TrainError> {
        if batch_size == 0 {
            return Err(fedfair_common::ConfigValidationError::InvalidBatchSize.into());
        }
        if labels.len() != inputs.nrows() {
            return Err(DataError::RowMismatch {
                what: "labels",
                expected: inputs.nrows(),
                actual: labels.len(),
            }
            .into());
        }

        let mut order: Vec<usize> = (0..inputs.nrows()).collect();
        if let Some(seed) = shuffle {
            order.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let batches = order
            .chunks(batch_size)
            .map(|rows| Batch::new(inputs.select(Axis(0), rows), labels.select(Axis(0), rows)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            batches,
            batch_size,
        })
    }

    /// Wraps already-built batches
    pub fn from_batches(batches: Vec<Batch>) -> Self {
        let batch_size = batches.iter().map(Batch::len).max().unwrap_or(0);
        Self {
            batches: batches.into_iter().filter(|b| !b.is_empty()).collect(),
            batch_size,
        }
    }

    /// Configured (maximum) batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Feature width of the stored batches, if any
    pub fn width(&self) -> Option<usize> {
        self.batches.first().map(Batch::width)
    }
}

impl DataLoader for InMemoryLoader {
    fn batches(&self) -> Box<dyn Iterator<Item = &Batch> + '_> {
        Box::new(self.batches.iter())
    }

    fn num_batches(&self) -> usize {
        self.batches.len()
    }
}
