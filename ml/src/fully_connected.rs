use crate::{
    errors::ModelResult,
    layers::{cached, expect_rank, Layer, ParameterMut},
    ImagePrecision, InternalDataRepresentation, WeightPrecision,
};
use ndarray::*;
use ndarray_rand::{rand::Rng, rand_distr::Uniform, RandomExt};

/// Rust implementation of a feed forward layer.
/// The weight matrix shall have dimension (in that order)
/// input units x output units.
pub struct FeedforwardLayer {
    weights: Array2<WeightPrecision>,
    bias: Array1<WeightPrecision>,
    weights_grad: Array2<WeightPrecision>,
    bias_grad: Array1<WeightPrecision>,
    input: Option<Array2<ImagePrecision>>,
}

impl FeedforwardLayer {
    pub fn new(weights: Array2<WeightPrecision>, bias: Array1<WeightPrecision>) -> Self {
        debug_assert_eq!(weights.len_of(Axis(1)), bias.len());
        FeedforwardLayer {
            weights_grad: Array2::zeros(weights.raw_dim()),
            bias_grad: Array1::zeros(bias.raw_dim()),
            weights,
            bias,
            input: None,
        }
    }

    /// Weights drawn from the Glorot (Xavier) uniform distribution, zero bias.
    pub fn glorot<R: Rng + ?Sized>(
        input_dimension: usize,
        output_dimension: usize,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0 / (input_dimension + output_dimension) as WeightPrecision).sqrt();
        let weights = Array2::random_using(
            (input_dimension, output_dimension),
            Uniform::new(-limit, limit),
            rng,
        );
        FeedforwardLayer::new(weights, Array1::zeros(output_dimension))
    }

    pub fn input_dimension(&self) -> usize {
        self.weights.len_of(Axis(0))
    }

    pub fn output_dimension(&self) -> usize {
        self.weights.len_of(Axis(1))
    }
}

impl Layer for FeedforwardLayer {
    fn name(&self) -> &'static str {
        "Dense"
    }

    fn output_shape(&self, _input_shape: &[usize]) -> Vec<usize> {
        vec![self.output_dimension()]
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
        _training: bool,
    ) -> ModelResult<InternalDataRepresentation> {
        let data = expect_rank::<Ix2>(input, self.name())?;
        let output = data.dot(&self.weights) + &self.bias;
        self.input = Some(data.to_owned());
        Ok(output.into_dyn())
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let grad = expect_rank::<Ix2>(grad_output, self.name())?;
        let input = cached(&self.input, self.name())?;

        let weights_grad = input.t().dot(&grad);
        let grad_input = grad.dot(&self.weights.t());
        self.weights_grad = weights_grad;
        self.bias_grad = grad.sum_axis(Axis(0));
        Ok(grad_input.into_dyn())
    }

    fn parameters(&mut self) -> Vec<ParameterMut<'_>> {
        vec![
            ParameterMut {
                name: "kernel",
                value: self.weights.view_mut().into_dyn(),
                grad: self.weights_grad.view().into_dyn(),
            },
            ParameterMut {
                name: "bias",
                value: self.bias.view_mut().into_dyn(),
                grad: self.bias_grad.view().into_dyn(),
            },
        ]
    }

    fn num_parameters(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

/// Flattens (batch, channels, height, width) into (batch, channels * height * width).
pub struct FlattenLayer {
    input_dim: Option<IxDyn>,
}

impl FlattenLayer {
    pub fn new() -> Self {
        Self { input_dim: None }
    }
}

impl Default for FlattenLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for FlattenLayer {
    fn name(&self) -> &'static str {
        "Flatten"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        vec![input_shape.iter().product()]
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
        _training: bool,
    ) -> ModelResult<InternalDataRepresentation> {
        let batch_size = input.len_of(Axis(0));
        let features = input.len() / batch_size.max(1);
        self.input_dim = Some(input.raw_dim());
        let flat = input
            .as_standard_layout()
            .into_owned()
            .into_shape((batch_size, features))?;
        Ok(flat.into_dyn())
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let input_dim = cached(&self.input_dim, self.name())?;
        Ok(grad_output
            .as_standard_layout()
            .into_owned()
            .into_shape(input_dim.clone())?)
    }
}
