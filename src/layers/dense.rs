use serde::{Deserialize, Serialize};

use crate::{
    activation::ActivationFunction,
    math::Matrix,
    optim::ParamView,
    precision::Precision,
};

/// Serializable part of a layer: what goes into a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerWeights {
    /// Shape `(input_size, size)`.
    pub weights: Matrix,
    /// Shape `(1, size)`.
    pub biases: Matrix,
    pub activation: ActivationFunction,
}

/// Fully connected layer operating on a batch of rows.
///
/// Besides the weights it owns transient training state: the cached input
/// and pre-activation of the last training pass and the gradient buffers.
#[derive(Debug)]
pub struct Layer {
    pub size: usize,
    pub input_size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction,
    input: Matrix,
    pre_neurons: Matrix,
    weight_grads: Matrix,
    bias_grads: Matrix,
}

impl Layer {
    pub fn new(weights: Matrix, biases: Matrix, activation: ActivationFunction) -> Layer {
        let mut layer = Layer {
            size: weights.cols,
            input_size: weights.rows,
            weights,
            biases,
            activator: activation,
            input: Matrix::default(),
            pre_neurons: Matrix::default(),
            weight_grads: Matrix::default(),
            bias_grads: Matrix::default(),
        };
        layer.zero_grad();
        layer
    }

    pub fn from_weights(w: LayerWeights) -> Layer {
        Layer::new(w.weights, w.biases, w.activation)
    }

    pub fn to_weights(&self) -> LayerWeights {
        LayerWeights {
            weights: self.weights.clone(),
            biases: self.biases.clone(),
            activation: self.activator,
        }
    }

    /// Number of trainable scalars (weights + biases).
    pub fn parameter_count(&self) -> usize {
        self.weights.data.len() + self.biases.data.len()
    }

    /// Inference pass. Nothing is cached, so `&self` is enough.
    pub fn infer(&self, input: &Matrix, precision: Precision) -> Matrix {
        let (_, a) = self.linear_and_activate(input, precision);
        a
    }

    /// Training pass; keeps the input and pre-activation for `backward`.
    pub fn feed_from(&mut self, input: Matrix, precision: Precision) -> Matrix {
        let (z, a) = self.linear_and_activate(&input, precision);
        self.input = input;
        self.pre_neurons = z;
        a
    }

    fn linear_and_activate(&self, input: &Matrix, precision: Precision) -> (Matrix, Matrix) {
        let mut z = (input * &self.weights).add_row(&self.biases);
        precision.round_slice(&mut z.data);
        let mut a = z.map(|x| self.activator.function(x));
        precision.round_slice(&mut a.data);
        (z, a)
    }

    /// Back-propagates `delta` (dL/da for this layer's output), accumulating
    /// into the gradient buffers. Returns dL/da for the layer's input.
    pub fn backward(&mut self, delta: &Matrix) -> Matrix {
        assert_eq!(
            (delta.rows, delta.cols),
            (self.pre_neurons.rows, self.pre_neurons.cols),
            "backward called without a matching forward pass"
        );
        // δ = error ⊙ σ'(z)
        let act_derivative = self.pre_neurons.map(|x| self.activator.derivative(x));
        let layer_delta = delta.hadamard(&act_derivative);

        let w_grad = &self.input.transpose() * &layer_delta;
        self.weight_grads = &self.weight_grads + &w_grad;
        self.bias_grads = &self.bias_grads + &layer_delta.sum_rows();

        &layer_delta * &self.weights.transpose()
    }

    pub fn zero_grad(&mut self) {
        self.weight_grads = Matrix::zeros(self.weights.rows, self.weights.cols);
        self.bias_grads = Matrix::zeros(self.biases.rows, self.biases.cols);
    }

    /// Drops the cached activations (they can be large for pixel batches).
    pub fn clear_cache(&mut self) {
        self.input = Matrix::default();
        self.pre_neurons = Matrix::default();
    }

    pub fn params_mut(&mut self) -> [ParamView<'_>; 2] {
        [
            ParamView { values: &mut self.weights.data, grads: &self.weight_grads.data },
            ParamView { values: &mut self.biases.data, grads: &self.bias_grads.data },
        ]
    }
}
