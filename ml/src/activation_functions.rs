//! This module provides the element-wise layers of our networks,
//! namely Relu and the rescaling of raw pixel values.
//!
//! Relu is exposed as a layer as well as a free function.
use ndarray::*;

use crate::{
    errors::ModelResult,
    layers::{cached, Layer},
    ImagePrecision, InternalDataRepresentation,
};

/// Relu implementation
pub fn relu<D: Dimension>(data: &Array<ImagePrecision, D>) -> Array<ImagePrecision, D> {
    data.mapv(|x| if x > 0. { x } else { 0. })
}

/// Relu as a layer. Remembers which units were active for the backward pass.
pub struct ReluLayer {
    active: Option<ArrayD<bool>>,
}

impl ReluLayer {
    pub fn new() -> Self {
        Self { active: None }
    }
}

impl Default for ReluLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for ReluLayer {
    fn name(&self) -> &'static str {
        "ReLU"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        input_shape.to_vec()
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
        _training: bool,
    ) -> ModelResult<InternalDataRepresentation> {
        self.active = Some(input.mapv(|a| a > 0.));
        Ok(relu(input))
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let active = cached(&self.active, self.name())?;
        let mut grad = grad_output.clone();
        Zip::from(&mut grad)
            .and(active)
            .for_each(|g, &on| if !on { *g = 0. });
        Ok(grad)
    }
}

/// Multiplies the input with a constant, e.g. 1/255 to map pixels into [0, 1].
pub struct RescalingLayer {
    scale: ImagePrecision,
}

impl RescalingLayer {
    pub fn new(scale: ImagePrecision) -> Self {
        Self { scale }
    }
}

impl Layer for RescalingLayer {
    fn name(&self) -> &'static str {
        "Rescaling"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        input_shape.to_vec()
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
        _training: bool,
    ) -> ModelResult<InternalDataRepresentation> {
        Ok(input * self.scale)
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        Ok(grad_output * self.scale)
    }
}
