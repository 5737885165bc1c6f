//! Model contract and a reference linear classifier
//!
//! There is no autograd here: a model caches whatever it needs during a
//! training-mode forward pass and accumulates parameter gradients when the
//! caller hands back `dLoss/dOutputs` through [`Model::backward`].

use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::Device;
use crate::error::TrainError;

/// A trainable tensor together with its accumulated gradient
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name used in diagnostics
    pub name: String,
    /// Current value
    pub value: Array2<f32>,
    /// Gradient accumulated since the last `zero_grad`
    pub grad: Array2<f32>,
}

impl Parameter {
    /// Creates a parameter with a zero gradient of matching shape
    pub fn new(name: impl Into<String>, value: Array2<f32>) -> Self {
        let grad = Array2::zeros(value.raw_dim());
        Self {
            name: name.into(),
            value,
            grad,
        }
    }

    /// Clears the accumulated gradient
    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}

/// A classifier mapping `[n, input_dim]` features to `[n, output_dim]` raw scores.
///
/// `output_dim` is 1 (a single logit) or 2 (per-class logits).
pub trait Model {
    /// Number of input features
    fn input_dim(&self) -> usize;

    /// Number of output columns
    fn output_dim(&self) -> usize;

    /// Computes raw outputs. In training mode the activations needed by
    /// [`Model::backward`] are cached; in inference mode nothing is kept.
    fn forward(&mut self, inputs: ArrayView2<'_, f32>) -> Result<Array2<f32>, TrainError>;

    /// Accumulates parameter gradients for the last training-mode forward pass.
    fn backward(&mut self, grad_outputs: ArrayView2<'_, f32>) -> Result<(), TrainError>;

    /// Read access to the parameters
    fn parameters(&self) -> &[Parameter];

    /// Mutable access to the parameters, for optimizers
    fn parameters_mut(&mut self) -> &mut [Parameter];

    /// Switches between training and inference mode
    fn set_training(&mut self, training: bool);

    /// Returns true in training mode
    fn is_training(&self) -> bool;

    /// Moves the model to `device`
    fn to_device(&mut self, device: Device);

    /// Device the model currently resides on
    fn device(&self) -> Device;
}

/// Affine classifier `outputs = inputs · W + b`.
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    params: [Parameter; 2],
    cached_inputs: Option<Array2<f32>>,
    training: bool,
    device: Device,
}

const WEIGHT: usize = 0;
const BIAS: usize = 1;

impl LinearClassifier {
    /// Creates a classifier with uniform `±1/√input_dim` initialization from `seed`.
    pub fn new(input_dim: usize, output_dim: usize, seed: u64) -> Result<Self, TrainError> {
        Self::check_dims(input_dim, output_dim)?;
        let bound = 1.0 / (input_dim as f32).sqrt();
        let mut rng = StdRng::seed_from_u64(seed);
        let weight = Array2::from_shape_fn((input_dim, output_dim), |_| rng.gen_range(-bound..bound));
        let bias = Array2::from_shape_fn((1, output_dim), |_| rng.gen_range(-bound..bound));
        Ok(Self::assemble(weight, bias))
    }

    /// Creates a classifier from explicit weights (`[input_dim, output_dim]`)
    /// and bias (`[1, output_dim]`).
    pub fn from_weights(weight: Array2<f32>, bias: Array2<f32>) -> Result<Self, TrainError> {
        let (input_dim, output_dim) = weight.dim();
        Self::check_dims(input_dim, output_dim)?;
        if bias.dim() != (1, output_dim) {
            return Err(TrainError::ShapeMismatch {
                context: "bias",
                expected: vec![1, output_dim],
                actual: bias.shape().to_vec(),
            });
        }
        Ok(Self::assemble(weight, bias))
    }

    /// Current weight matrix
    pub fn weight(&self) -> ArrayView2<'_, f32> {
        self.params[WEIGHT].value.view()
    }

    /// Current bias row
    pub fn bias(&self) -> ArrayView2<'_, f32> {
        self.params[BIAS].value.view()
    }

    fn check_dims(input_dim: usize, output_dim: usize) -> Result<(), TrainError> {
        if input_dim == 0 {
            return Err(TrainError::Model {
                reason: "input_dim must be at least 1".to_string(),
            });
        }
        if !(1..=2).contains(&output_dim) {
            return Err(TrainError::Model {
                reason: format!("output_dim must be 1 or 2, got {output_dim}"),
            });
        }
        Ok(())
    }

    fn assemble(weight: Array2<f32>, bias: Array2<f32>) -> Self {
        Self {
            params: [Parameter::new("weight", weight), Parameter::new("bias", bias)],
            cached_inputs: None,
            training: false,
            device: Device::Cpu,
        }
    }
}

impl Model for LinearClassifier {
    fn input_dim(&self) -> usize {
        self.params[WEIGHT].value.nrows()
    }

    fn output_dim(&self) -> usize {
        self.params[WEIGHT].value.ncols()
    }

    fn forward(&mut self, inputs: ArrayView2<'_, f32>) -> Result<Array2<f32>, TrainError> {
        if inputs.ncols() != self.input_dim() {
            return Err(TrainError::ShapeMismatch {
                context: "forward",
                expected: vec![inputs.nrows(), self.input_dim()],
                actual: inputs.shape().to_vec(),
            });
        }
        let outputs = inputs.dot(&self.params[WEIGHT].value) + &self.params[BIAS].value;
        self.cached_inputs = self.training.then(|| inputs.to_owned());
        Ok(outputs)
    }

    fn backward(&mut self, grad_outputs: ArrayView2<'_, f32>) -> Result<(), TrainError> {
        let inputs = self.cached_inputs.as_ref().ok_or_else(|| TrainError::Model {
            reason: "backward called without a training-mode forward pass".to_string(),
        })?;
        let expected = (inputs.nrows(), self.output_dim());
        if grad_outputs.dim() != expected {
            return Err(TrainError::ShapeMismatch {
                context: "backward",
                expected: vec![expected.0, expected.1],
                actual: grad_outputs.shape().to_vec(),
            });
        }

        let grad_w = inputs.t().dot(&grad_outputs);
        let grad_b = grad_outputs.sum_axis(Axis(0)).insert_axis(Axis(0));
        self.params[WEIGHT].grad += &grad_w;
        self.params[BIAS].grad += &grad_b;
        Ok(())
    }

    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        if !training {
            self.cached_inputs = None;
        }
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn to_device(&mut self, device: Device) {
        self.device = device;
    }

    fn device(&self) -> Device {
        self.device
    }
}
