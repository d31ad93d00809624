//! The layer abstraction the sequential model is built from.
use ndarray::{ArrayViewD, ArrayViewMutD, Dimension};

use crate::{errors::ModelResult, InternalDataRepresentation, WeightPrecision};

/// A trainable parameter together with the gradient accumulated in the
/// last backward pass.
pub struct ParameterMut<'a> {
    pub name: &'static str,
    pub value: ArrayViewMutD<'a, WeightPrecision>,
    pub grad: ArrayViewD<'a, WeightPrecision>,
}

/// A layer of a sequential network.
///
/// Shapes passed to `output_shape` are per-sample, so without the batch axis.
/// `forward` and `backward` always work on whole batches.
pub trait Layer {
    /// Keras style name of the layer type, used in summaries and weight files.
    fn name(&self) -> &'static str;

    fn output_shape(&self, input_shape: &[usize]) -> Vec<usize>;

    /// Computes the layer output. Layers cache whatever they need for the
    /// backward pass, `training` only matters for layers that behave
    /// differently at inference time.
    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
        training: bool,
    ) -> ModelResult<InternalDataRepresentation>;

    /// Takes the gradient w.r.t. the output of the last forward pass, stores the
    /// parameter gradients and returns the gradient w.r.t. the input.
    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation>;

    fn parameters(&mut self) -> Vec<ParameterMut<'_>> {
        Vec::new()
    }

    fn num_parameters(&self) -> usize {
        0
    }
}

/// Returns the forward cache or a `MissingForwardPassError`.
pub(crate) fn cached<'a, T>(cache: &'a Option<T>, layer: &'static str) -> ModelResult<&'a T> {
    cache
        .as_ref()
        .ok_or(crate::errors::ModelError::MissingForwardPassError(layer))
}

/// Converts the dynamic representation into a fixed dimension, reporting the
/// layer on rank mismatches.
pub(crate) fn expect_rank<'a, D: Dimension>(
    input: &'a InternalDataRepresentation,
    layer: &'static str,
) -> ModelResult<ndarray::ArrayView<'a, WeightPrecision, D>> {
    let rank = input.ndim();
    input.view().into_dimensionality::<D>().map_err(|_| {
        crate::errors::ModelError::RankError(layer, rank, D::NDIM.unwrap_or(rank))
    })
}
