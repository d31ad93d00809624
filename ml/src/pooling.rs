use ndarray::*;

use crate::{
    errors::ModelResult,
    layers::{cached, expect_rank, Layer},
    ImagePrecision, InternalDataRepresentation,
};

/// 2x2 max pooling with stride 2 and no padding. Odd trailing rows and
/// columns are dropped.
pub struct MaxPoolingLayer {
    /// Input shape and the flat (row * 2 + column) position of the maximum in
    /// each window, recorded in the forward pass.
    cache: Option<(Ix4, Array4<u8>)>,
}

const POOL_SIZE: usize = 2;

impl MaxPoolingLayer {
    pub fn new() -> Self {
        Self { cache: None }
    }
}

impl Default for MaxPoolingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for MaxPoolingLayer {
    fn name(&self) -> &'static str {
        "MaxPooling2D"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        vec![
            input_shape[0],
            input_shape[1] / POOL_SIZE,
            input_shape[2] / POOL_SIZE,
        ]
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
        _training: bool,
    ) -> ModelResult<InternalDataRepresentation> {
        let input = expect_rank::<Ix4>(input, self.name())?;
        let (batch_size, channels, height, width) = input.dim();
        let (new_height, new_width) = (height / POOL_SIZE, width / POOL_SIZE);

        let mut output = Array4::zeros((batch_size, channels, new_height, new_width));
        let mut argmax = Array4::zeros((batch_size, channels, new_height, new_width));

        for n in 0..batch_size {
            for c in 0..channels {
                for i in 0..new_height {
                    for j in 0..new_width {
                        let mut best = ImagePrecision::NEG_INFINITY;
                        let mut best_pos = 0u8;
                        for di in 0..POOL_SIZE {
                            for dj in 0..POOL_SIZE {
                                let v = input[[n, c, i * POOL_SIZE + di, j * POOL_SIZE + dj]];
                                if v > best {
                                    best = v;
                                    best_pos = (di * POOL_SIZE + dj) as u8;
                                }
                            }
                        }
                        output[[n, c, i, j]] = best;
                        argmax[[n, c, i, j]] = best_pos;
                    }
                }
            }
        }

        self.cache = Some((input.raw_dim(), argmax));
        Ok(output.into_dyn())
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let grad_output = expect_rank::<Ix4>(grad_output, self.name())?;
        let (input_dim, argmax) = cached(&self.cache, self.name())?;

        let mut grad_input = Array4::zeros(input_dim.clone());
        for ((n, c, i, j), &pos) in argmax.indexed_iter() {
            let di = pos as usize / POOL_SIZE;
            let dj = pos as usize % POOL_SIZE;
            grad_input[[n, c, i * POOL_SIZE + di, j * POOL_SIZE + dj]] = grad_output[[n, c, i, j]];
        }
        Ok(grad_input.into_dyn())
    }
}
