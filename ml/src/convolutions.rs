use crate::{
    errors::{ModelError, ModelResult},
    layers::{cached, expect_rank, Layer, ParameterMut},
    ImagePrecision, InternalDataRepresentation, WeightPrecision,
};
use ndarray::*;
use ndarray_rand::{rand::Rng, rand_distr::Uniform, RandomExt};

/// Rust implementation of a convolutional layer with stride 1 and "same" zero padding.
/// The weight matrix shall have dimension (in that order)
/// output channels (filters) x input channels x kernel height x kernel width.
/// Only odd, square kernels are supported, so the output keeps the spatial size
/// of the input.
pub struct ConvolutionLayer {
    /// Weight matrix of the kernel
    kernel: Array4<WeightPrecision>,
    bias: Array1<WeightPrecision>,
    kernel_grad: Array4<WeightPrecision>,
    bias_grad: Array1<WeightPrecision>,
    kernel_size: usize,
    padding: usize,
    num_filters: usize,
    img_channels: usize,
    /// Input of the last forward pass
    input: Option<Array4<ImagePrecision>>,
}

impl ConvolutionLayer {
    pub fn new(weights: Array4<WeightPrecision>, bias: Array1<WeightPrecision>) -> ConvolutionLayer {
        let num_filters = weights.len_of(Axis(0));
        let img_channels = weights.len_of(Axis(1));
        let kernel_size = weights.len_of(Axis(2));

        debug_assert_eq!(kernel_size, weights.len_of(Axis(3)), "Kernel is not square");
        debug_assert!(kernel_size % 2 == 1, "Kernel size has to be odd");
        debug_assert_eq!(num_filters, bias.len(), "One bias per filter expected");

        // im2col reshapes the kernel, which needs the standard memory layout
        let kernel = weights.as_standard_layout().into_owned();

        ConvolutionLayer {
            kernel_grad: Array4::zeros(kernel.raw_dim()),
            bias_grad: Array1::zeros(num_filters),
            kernel,
            bias,
            kernel_size,
            padding: kernel_size / 2,
            num_filters,
            img_channels,
            input: None,
        }
    }

    /// Kernel drawn from the Glorot (Xavier) uniform distribution, zero bias.
    pub fn glorot<R: Rng + ?Sized>(
        img_channels: usize,
        num_filters: usize,
        kernel_size: usize,
        rng: &mut R,
    ) -> ConvolutionLayer {
        let receptive_field = kernel_size * kernel_size;
        let fan_in = img_channels * receptive_field;
        let fan_out = num_filters * receptive_field;
        let limit = (6.0 / (fan_in + fan_out) as WeightPrecision).sqrt();

        let kernel = Array4::random_using(
            (num_filters, img_channels, kernel_size, kernel_size),
            Uniform::new(-limit, limit),
            rng,
        );
        ConvolutionLayer::new(kernel, Array1::zeros(num_filters))
    }

    pub fn kernel(&self) -> &Array4<WeightPrecision> {
        &self.kernel
    }

    pub fn bias(&self) -> &Array1<WeightPrecision> {
        &self.bias
    }

    pub fn kernel_grad(&self) -> &Array4<WeightPrecision> {
        &self.kernel_grad
    }

    /// Number of rows of the im2col matrix, C * KH * KW
    fn patch_len(&self) -> usize {
        self.img_channels * self.kernel_size * self.kernel_size
    }

    fn pad(&self, image: ArrayView3<ImagePrecision>) -> Array3<ImagePrecision> {
        let (channels, height, width) = image.dim();
        let p = self.padding;
        let mut padded = Array3::zeros((channels, height + 2 * p, width + 2 * p));
        padded
            .slice_mut(s![.., p..p + height, p..p + width])
            .assign(&image);
        padded
    }

    /// Rearranges the padded image so that every kernel position becomes a row
    /// and every output pixel a column (in (row, height, width) shape).
    /// Row order is (channel, kernel row, kernel column), matching the
    /// flattened kernel.
    /// https://leonardoaraujosantos.gitbook.io/artificial-inteligence/machine_learning/deep_learning/convolution_layer/making_faster
    fn im2col(
        &self,
        padded: &Array3<ImagePrecision>,
        height: usize,
        width: usize,
    ) -> Array3<ImagePrecision> {
        let k = self.kernel_size;
        let mut cols = Array3::zeros((self.patch_len(), height, width));
        for c in 0..self.img_channels {
            for ki in 0..k {
                for kj in 0..k {
                    let row = (c * k + ki) * k + kj;
                    cols.slice_mut(s![row, .., ..])
                        .assign(&padded.slice(s![c, ki..ki + height, kj..kj + width]));
                }
            }
        }
        cols
    }

    /// Inverse of im2col: sums every column entry back onto the padded image
    /// position it was read from.
    fn col2im(
        &self,
        cols: ArrayView3<ImagePrecision>,
        height: usize,
        width: usize,
    ) -> Array3<ImagePrecision> {
        let k = self.kernel_size;
        let p = self.padding;
        let mut padded = Array3::zeros((self.img_channels, height + 2 * p, width + 2 * p));
        for c in 0..self.img_channels {
            for ki in 0..k {
                for kj in 0..k {
                    let row = (c * k + ki) * k + kj;
                    let mut window = padded.slice_mut(s![c, ki..ki + height, kj..kj + width]);
                    window += &cols.slice(s![row, .., ..]);
                }
            }
        }
        padded
    }

    /// Performs the convolution of a single (C, H, W) image.
    fn convolve(&self, image: ArrayView3<ImagePrecision>) -> ModelResult<Array3<ImagePrecision>> {
        let (_, height, width) = image.dim();
        let weights = self
            .kernel
            .view()
            .into_shape((self.num_filters, self.patch_len()))?;
        let cols = self
            .im2col(&self.pad(image), height, width)
            .into_shape((self.patch_len(), height * width))?;

        let mut activations = weights.dot(&cols);
        activations += &self.bias.view().insert_axis(Axis(1));
        Ok(activations.into_shape((self.num_filters, height, width))?)
    }

    fn check_channels(&self, channels: usize) -> ModelResult<()> {
        if channels != self.img_channels {
            return Err(ModelError::ChannelError(
                self.name(),
                channels,
                self.img_channels,
            ));
        }
        Ok(())
    }
}

impl Layer for ConvolutionLayer {
    fn name(&self) -> &'static str {
        "Conv2D"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        vec![self.num_filters, input_shape[1], input_shape[2]]
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
        _training: bool,
    ) -> ModelResult<InternalDataRepresentation> {
        let images = expect_rank::<Ix4>(input, self.name())?;
        let (batch_size, channels, height, width) = images.dim();
        self.check_channels(channels)?;

        let mut output = Array4::zeros((batch_size, self.num_filters, height, width));
        for (image, mut out) in images.outer_iter().zip(output.outer_iter_mut()) {
            out.assign(&self.convolve(image)?);
        }

        self.input = Some(images.to_owned());
        Ok(output.into_dyn())
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let grad_output = expect_rank::<Ix4>(grad_output, self.name())?;
        let input = cached(&self.input, self.name())?;
        let (batch_size, channels, height, width) = input.dim();
        let (p, patch_len) = (self.padding, self.patch_len());

        let weights = self.kernel.view().into_shape((self.num_filters, patch_len))?;
        let mut kernel_grad = Array2::zeros((self.num_filters, patch_len));
        let mut bias_grad = Array1::zeros(self.num_filters);
        let mut grad_input = Array4::zeros((batch_size, channels, height, width));

        for ((image, grad), mut grad_image) in input
            .outer_iter()
            .zip(grad_output.outer_iter())
            .zip(grad_input.outer_iter_mut())
        {
            let cols = self
                .im2col(&self.pad(image), height, width)
                .into_shape((patch_len, height * width))?;
            let grad = grad
                .to_owned()
                .into_shape((self.num_filters, height * width))?;

            kernel_grad += &grad.dot(&cols.t());
            bias_grad += &grad.sum_axis(Axis(1));

            let grad_cols = weights.t().dot(&grad).into_shape((patch_len, height, width))?;
            let grad_padded = self.col2im(grad_cols.view(), height, width);
            grad_image.assign(&grad_padded.slice(s![.., p..p + height, p..p + width]));
        }

        self.kernel_grad = kernel_grad.into_shape(self.kernel.raw_dim())?;
        self.bias_grad = bias_grad;
        Ok(grad_input.into_dyn())
    }

    fn parameters(&mut self) -> Vec<ParameterMut<'_>> {
        vec![
            ParameterMut {
                name: "kernel",
                value: self.kernel.view_mut().into_dyn(),
                grad: self.kernel_grad.view().into_dyn(),
            },
            ParameterMut {
                name: "bias",
                value: self.bias.view_mut().into_dyn(),
                grad: self.bias_grad.view().into_dyn(),
            },
        ]
    }

    fn num_parameters(&self) -> usize {
        self.kernel.len() + self.bias.len()
    }
}
