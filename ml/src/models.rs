use std::fmt::{self, Display};
use std::fs::File;
use std::path::Path;

use crate::{
    activation_functions::{RescalingLayer, ReluLayer},
    convolutions::ConvolutionLayer,
    errors::ModelResult,
    fully_connected::{FeedforwardLayer, FlattenLayer},
    layers::{Layer, ParameterMut},
    pooling::MaxPoolingLayer,
    weight_loader::WeightLoader,
    ImagePrecision, InternalDataRepresentation,
};
use log::debug;
use ndarray::*;
use ndarray_npy::NpzWriter;
use ndarray_rand::rand::Rng;

/// A plain stack of layers, each feeding the next.
pub struct Sequential {
    /// Per-sample input shape (channels, height, width)
    input_shape: Vec<usize>,
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    pub fn new(input_shape: &[usize]) -> Self {
        Sequential {
            input_shape: input_shape.to_vec(),
            layers: Vec::new(),
        }
    }

    pub fn add<L: Layer + 'static>(&mut self, layer: L) -> &mut Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Per-sample output shape of the last layer
    pub fn output_shape(&self) -> Vec<usize> {
        self.layers
            .iter()
            .fold(self.input_shape.clone(), |shape, layer| layer.output_shape(&shape))
    }

    pub fn forward(
        &mut self,
        input: &InternalDataRepresentation,
        training: bool,
    ) -> ModelResult<InternalDataRepresentation> {
        let mut data = input.clone();
        for layer in self.layers.iter_mut() {
            data = layer.forward(&data, training)?;
        }
        Ok(data)
    }

    pub fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let mut grad = grad_output.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        Ok(grad)
    }

    /// Returns the logits for all images, computed in batches of `batch_size`.
    pub fn predict(
        &mut self,
        images: &Array4<ImagePrecision>,
        batch_size: usize,
    ) -> ModelResult<Array2<ImagePrecision>> {
        let num_images = images.len_of(Axis(0));
        let num_outputs = self.output_shape().iter().product();
        let mut logits: Array2<ImagePrecision> = Array2::zeros((0, num_outputs));
        for start in (0..num_images).step_by(batch_size.max(1)) {
            let end = (start + batch_size.max(1)).min(num_images);
            let batch = images.slice(s![start..end, .., .., ..]).to_owned().into_dyn();
            let out = self.forward(&batch, false)?.into_dimensionality::<Ix2>()?;
            logits.append(Axis(0), out.view())?;
        }
        Ok(logits)
    }

    /// All trainable parameters, named "<layer>_<index>.<parameter>"
    pub fn parameters(&mut self) -> Vec<(String, ParameterMut<'_>)> {
        self.layers
            .iter_mut()
            .enumerate()
            .flat_map(|(i, layer)| {
                let prefix = format!("{}_{}", layer.name().to_lowercase(), i);
                layer
                    .parameters()
                    .into_iter()
                    .map(move |p| (format!("{}.{}", prefix, p.name), p))
            })
            .collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.num_parameters()).sum()
    }

    /// Writes all parameters into an npz archive.
    pub fn save_weights<P: AsRef<Path>>(&mut self, path: P) -> ModelResult<()> {
        let mut npz = NpzWriter::new(File::create(path)?);
        for (name, param) in self.parameters() {
            npz.add_array(name, &param.value)?;
        }
        npz.finish()?;
        Ok(())
    }

    /// Replaces all parameters with the ones stored under the same names.
    pub fn load_weights(&mut self, loader: &mut impl WeightLoader) -> ModelResult<()> {
        for (name, mut param) in self.parameters() {
            let weight = loader.get_weight(&name, param.value.shape())?;
            debug!("Loaded weight {} with shape {:?}", name, weight.shape());
            param.value.assign(&weight);
        }
        Ok(())
    }

    /// Keras style overview of the layers and their parameter counts
    pub fn summary(&self) -> ModelSummary {
        let mut shape = self.input_shape.clone();
        let rows = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                shape = layer.output_shape(&shape);
                SummaryRow {
                    name: format!("{}_{}", layer.name().to_lowercase(), i),
                    kind: layer.name(),
                    output_shape: shape.clone(),
                    parameters: layer.num_parameters(),
                }
            })
            .collect();
        ModelSummary { rows }
    }
}

struct SummaryRow {
    name: String,
    kind: &'static str,
    output_shape: Vec<usize>,
    parameters: usize,
}

pub struct ModelSummary {
    rows: Vec<SummaryRow>,
}

impl ModelSummary {
    pub fn total_parameters(&self) -> usize {
        self.rows.iter().map(|r| r.parameters).sum()
    }
}

impl Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "_".repeat(65);
        writeln!(f, "Model: \"sequential\"")?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "{:<29}{:<26}{}", "Layer (type)", "Output Shape", "Param #")?;
        writeln!(f, "{}", "=".repeat(65))?;
        for row in &self.rows {
            let shape = row
                .output_shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                f,
                "{:<29}{:<26}{}",
                format!("{} ({})", row.name, row.kind),
                format!("(None, {})", shape),
                row.parameters
            )?;
        }
        writeln!(f, "{}", "=".repeat(65))?;
        writeln!(f, "Total params: {}", self.total_parameters())?;
        write!(f, "{}", rule)
    }
}

/// The small convnet used for the artist classification:
///
/// Rescaling(1/255) -> [3x3conv,16 -> relu -> maxpool] -> [3x3conv,32 -> relu -> maxpool]
/// -> [3x3conv,64 -> relu -> maxpool] -> flatten -> dense,128 -> relu -> dense,num_classes
///
/// The rescaling layer is left out if `rescale` is false. The output are logits.
pub fn artist_classifier<R: Rng + ?Sized>(
    img_height: usize,
    img_width: usize,
    num_classes: usize,
    rescale: bool,
    rng: &mut R,
) -> Sequential {
    let mut model = Sequential::new(&[3, img_height, img_width]);
    if rescale {
        model.add(RescalingLayer::new(1. / 255.));
    }

    let mut channels = 3;
    for &filters in &[16, 32, 64] {
        model
            .add(ConvolutionLayer::glorot(channels, filters, 3, rng))
            .add(ReluLayer::new())
            .add(MaxPoolingLayer::new());
        channels = filters;
    }
    model.add(FlattenLayer::new());

    let flat_dimension = model.output_shape()[0];
    model
        .add(FeedforwardLayer::glorot(flat_dimension, 128, rng))
        .add(ReluLayer::new())
        .add(FeedforwardLayer::glorot(128, num_classes, rng));
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weight_loader::NpzWeightLoader;
    use ndarray_rand::rand::{rngs::StdRng, SeedableRng};
    use tempfile::tempdir;

    #[test]
    fn test_artist_classifier_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = artist_classifier(180, 180, 10, true, &mut rng);

        assert_eq!(model.output_shape(), vec![10]);
        let summary = model.summary();
        // 448 + 4640 + 18496 + (22 * 22 * 64 * 128 + 128) + (128 * 10 + 10)
        assert_eq!(summary.total_parameters(), 3_989_930);
        assert_eq!(summary.total_parameters(), model.num_parameters());
        let printed = summary.to_string();
        assert!(printed.contains("conv2d_1 (Conv2D)"));
        assert!(printed.contains("(None, 64, 22, 22)"));
    }

    #[test]
    fn test_predict_in_batches() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut model = artist_classifier(8, 8, 3, false, &mut rng);
        let images = Array4::from_shape_fn((5, 3, 8, 8), |(n, c, h, w)| {
            ((n + c + h * w) % 7) as f32 / 7.
        });

        let batched = model.predict(&images, 2).unwrap();
        let whole = model.predict(&images, 5).unwrap();

        assert_eq!(batched.dim(), (5, 3));
        for (a, b) in batched.iter().zip(whole.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_weights_survive_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weights.npz");
        let images = Array4::from_elem((1, 3, 8, 8), 0.5);

        let mut model = artist_classifier(8, 8, 2, false, &mut StdRng::seed_from_u64(1));
        model.save_weights(&path).unwrap();
        let expected = model.predict(&images, 1).unwrap();

        let mut other = artist_classifier(8, 8, 2, false, &mut StdRng::seed_from_u64(2));
        assert_ne!(other.predict(&images, 1).unwrap(), expected);
        other
            .load_weights(&mut NpzWeightLoader::from_path(&path).unwrap())
            .unwrap();
        assert_eq!(other.predict(&images, 1).unwrap(), expected);

        dir.close().unwrap();
    }

    #[test]
    fn test_loading_into_wrong_topology_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weights.npz");
        artist_classifier(8, 8, 2, false, &mut StdRng::seed_from_u64(1))
            .save_weights(&path)
            .unwrap();

        let mut other = artist_classifier(8, 8, 5, false, &mut StdRng::seed_from_u64(1));
        assert!(other
            .load_weights(&mut NpzWeightLoader::from_path(&path).unwrap())
            .is_err());
    }
}
