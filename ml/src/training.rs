//! Mini-batch training of a sequential model on an image dataset.
use std::fs::File;
use std::path::Path;

use log::{debug, info};
use ndarray::Ix2;
use ndarray_rand::rand::{seq::SliceRandom, Rng};
use serde_derive::{Deserialize, Serialize};

use crate::{
    dataset::ImageDataset,
    errors::ModelResult,
    losses::{accuracy, argmax, sparse_categorical_crossentropy},
    models::Sequential,
    optimizers::Adam,
};

/// Stops training once the monitored loss did not improve by more than
/// `min_delta` for `patience` epochs in a row. The validation loss is
/// monitored if there is a validation set, the training loss otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyStopping {
    pub patience: usize,
    pub min_delta: f32,
}

impl Default for EarlyStopping {
    fn default() -> Self {
        EarlyStopping {
            patience: 3,
            min_delta: 0.,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub early_stopping: Option<EarlyStopping>,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            epochs: 10,
            batch_size: 32,
            early_stopping: None,
        }
    }
}

/// Loss and accuracy per epoch. The validation vectors stay empty without a
/// validation set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub loss: Vec<f32>,
    pub accuracy: Vec<f32>,
    pub val_loss: Vec<f32>,
    pub val_accuracy: Vec<f32>,
}

impl History {
    /// Number of epochs that actually ran
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ModelResult<()> {
        serde_json::to_writer_pretty(File::create(path)?, self)?;
        Ok(())
    }
}

struct EarlyStoppingMonitor {
    config: EarlyStopping,
    best: f32,
    wait: usize,
}

impl EarlyStoppingMonitor {
    fn new(config: EarlyStopping) -> Self {
        EarlyStoppingMonitor {
            config,
            best: f32::INFINITY,
            wait: 0,
        }
    }

    /// Records the loss of an epoch, returns true if training should stop.
    fn should_stop(&mut self, loss: f32) -> bool {
        if loss + self.config.min_delta < self.best {
            self.best = loss;
            self.wait = 0;
            false
        } else {
            self.wait += 1;
            self.wait >= self.config.patience
        }
    }
}

/// Trains the model with sparse categorical cross entropy on logits.
/// The training set is reshuffled every epoch.
pub fn fit<R: Rng + ?Sized>(
    model: &mut Sequential,
    optimizer: &mut Adam,
    train: &ImageDataset,
    validation: Option<&ImageDataset>,
    config: &FitConfig,
    rng: &mut R,
) -> ModelResult<History> {
    let mut history = History::default();
    let mut order: Vec<usize> = (0..train.len()).collect();
    let mut monitor = config.early_stopping.map(EarlyStoppingMonitor::new);
    let num_samples = train.len().max(1) as f32;

    for epoch in 1..=config.epochs {
        order.shuffle(rng);
        let (mut loss_sum, mut correct) = (0., 0.);

        for (step, indices) in order.chunks(config.batch_size.max(1)).enumerate() {
            let images = train.batch(indices).into_dyn();
            let labels = train.labels_of(indices);

            let logits = model.forward(&images, true)?.into_dimensionality::<Ix2>()?;
            let (loss, grad) = sparse_categorical_crossentropy(&logits.view(), &labels)?;
            let batch_accuracy = accuracy(&logits.view(), &labels)?;

            model.backward(&grad.into_dyn())?;
            optimizer.step(model.parameters().into_iter().map(|(_, p)| p).collect());

            debug!("Epoch {} step {}: loss {:.4}", epoch, step + 1, loss);
            loss_sum += loss * labels.len() as f32;
            correct += batch_accuracy * labels.len() as f32;
        }

        history.loss.push(loss_sum / num_samples);
        history.accuracy.push(correct / num_samples);

        let monitored = match validation {
            Some(validation) => {
                let (val_loss, val_accuracy) = evaluate(model, validation, config.batch_size)?;
                history.val_loss.push(val_loss);
                history.val_accuracy.push(val_accuracy);
                info!(
                    "Epoch {}/{} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
                    epoch,
                    config.epochs,
                    loss_sum / num_samples,
                    correct / num_samples,
                    val_loss,
                    val_accuracy
                );
                val_loss
            }
            None => {
                info!(
                    "Epoch {}/{} - loss: {:.4} - accuracy: {:.4}",
                    epoch,
                    config.epochs,
                    loss_sum / num_samples,
                    correct / num_samples
                );
                loss_sum / num_samples
            }
        };

        if let Some(monitor) = monitor.as_mut() {
            if monitor.should_stop(monitored) {
                info!("Epoch {}: early stopping", epoch);
                break;
            }
        }
    }
    Ok(history)
}

/// Mean loss and accuracy of the model on a dataset, without training.
pub fn evaluate(
    model: &mut Sequential,
    dataset: &ImageDataset,
    batch_size: usize,
) -> ModelResult<(f32, f32)> {
    let indices: Vec<usize> = (0..dataset.len()).collect();
    let (mut loss_sum, mut correct) = (0., 0.);
    for chunk in indices.chunks(batch_size.max(1)) {
        let labels = dataset.labels_of(chunk);
        let logits = model
            .forward(&dataset.batch(chunk).into_dyn(), false)?
            .into_dimensionality::<Ix2>()?;
        let (loss, _) = sparse_categorical_crossentropy(&logits.view(), &labels)?;
        loss_sum += loss * labels.len() as f32;
        correct += accuracy(&logits.view(), &labels)? * labels.len() as f32;
    }
    let n = dataset.len().max(1) as f32;
    Ok((loss_sum / n, correct / n))
}

/// Predicted class of every sample. Only one batch is converted to floats at
/// a time.
pub fn predict_labels(
    model: &mut Sequential,
    dataset: &ImageDataset,
    batch_size: usize,
) -> ModelResult<Vec<usize>> {
    let indices: Vec<usize> = (0..dataset.len()).collect();
    let mut labels = Vec::with_capacity(dataset.len());
    for chunk in indices.chunks(batch_size.max(1)) {
        let logits = model
            .forward(&dataset.batch(chunk).into_dyn(), false)?
            .into_dimensionality::<Ix2>()?;
        labels.extend(argmax(&logits.view()));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        activation_functions::RescalingLayer,
        fully_connected::{FeedforwardLayer, FlattenLayer},
        models::artist_classifier,
    };
    use ndarray::Array4;
    use ndarray_rand::rand::{rngs::StdRng, SeedableRng};
    use tempfile::tempdir;

    /// Dark images are class 0, bright images class 1
    fn dark_and_bright(n: usize, size: usize) -> ImageDataset {
        let images = Array4::from_shape_fn((n, 3, size, size), |(i, c, h, w)| {
            let noise = ((i * 13 + c * 7 + h * 3 + w) % 40) as u8;
            if i % 2 == 0 {
                noise
            } else {
                215 + noise
            }
        });
        let labels = (0..n).map(|i| i % 2).collect();
        ImageDataset::from_arrays(images, labels, vec!["dark".into(), "bright".into()])
    }

    fn linear_model(rng: &mut StdRng) -> Sequential {
        let mut model = Sequential::new(&[3, 2, 2]);
        model
            .add(RescalingLayer::new(1. / 255.))
            .add(FlattenLayer::new())
            .add(FeedforwardLayer::glorot(12, 2, rng));
        model
    }

    #[test]
    fn test_fit_separable_problem() {
        let mut rng = StdRng::seed_from_u64(1);
        let train = dark_and_bright(16, 2);
        let mut model = linear_model(&mut rng);
        let config = FitConfig {
            epochs: 40,
            batch_size: 4,
            early_stopping: None,
        };

        let mut adam = Adam::new(0.05);
        let history = fit(&mut model, &mut adam, &train, None, &config, &mut rng).unwrap();

        assert_eq!(history.epochs(), 40);
        assert!(history.val_loss.is_empty());
        assert_eq!(*history.accuracy.last().unwrap(), 1.);
        assert!(history.loss.last().unwrap() < history.loss.first().unwrap());
    }

    #[test]
    fn test_early_stopping_without_progress() {
        let mut rng = StdRng::seed_from_u64(1);
        let train = dark_and_bright(8, 2);
        let validation = dark_and_bright(4, 2);
        let mut model = linear_model(&mut rng);
        let config = FitConfig {
            epochs: 10,
            batch_size: 4,
            early_stopping: Some(EarlyStopping {
                patience: 2,
                min_delta: 0.,
            }),
        };

        // a learning rate of zero never changes the validation loss
        let history = fit(
            &mut model,
            &mut Adam::new(0.),
            &train,
            Some(&validation),
            &config,
            &mut rng,
        )
        .unwrap();

        assert_eq!(history.epochs(), 3);
        assert_eq!(history.val_loss.len(), 3);
    }

    #[test]
    fn test_small_improvements_count_as_no_progress() {
        let mut monitor = EarlyStoppingMonitor::new(EarlyStopping {
            patience: 2,
            min_delta: 0.5,
        });

        assert!(!monitor.should_stop(1.0));
        assert!(!monitor.should_stop(0.9));
        assert!(monitor.should_stop(0.8));
    }

    #[test]
    fn test_large_improvements_reset_patience() {
        let mut monitor = EarlyStoppingMonitor::new(EarlyStopping {
            patience: 2,
            min_delta: 0.1,
        });

        assert!(!monitor.should_stop(1.0));
        assert!(!monitor.should_stop(0.95));
        assert!(!monitor.should_stop(0.8));
        assert!(!monitor.should_stop(0.75));
        assert!(monitor.should_stop(0.71));
    }

    #[test]
    fn test_min_delta_stops_slow_training() {
        let mut rng = StdRng::seed_from_u64(1);
        let train = dark_and_bright(8, 2);
        let mut model = linear_model(&mut rng);
        let config = FitConfig {
            epochs: 10,
            batch_size: 4,
            early_stopping: Some(EarlyStopping {
                patience: 2,
                min_delta: 10.,
            }),
        };

        let history = fit(&mut model, &mut Adam::new(1e-4), &train, None, &config, &mut rng).unwrap();

        assert_eq!(history.epochs(), 3);
    }

    #[test]
    fn test_predict_labels_in_batches() {
        let mut rng = StdRng::seed_from_u64(3);
        let dataset = dark_and_bright(7, 2);
        let mut model = linear_model(&mut rng);

        let logits = model.predict(&dataset.images(), 7).unwrap();
        let labels = predict_labels(&mut model, &dataset, 3).unwrap();

        assert_eq!(labels.len(), 7);
        assert_eq!(labels, argmax(&logits.view()));
    }

    #[test]
    fn test_conv_net_loss_decreases() {
        let mut rng = StdRng::seed_from_u64(5);
        let train = dark_and_bright(8, 8);
        let mut model = artist_classifier(8, 8, 2, true, &mut rng);
        let config = FitConfig {
            epochs: 15,
            batch_size: 4,
            early_stopping: None,
        };

        let mut adam = Adam::new(0.01);
        let history = fit(&mut model, &mut adam, &train, Some(&train), &config, &mut rng).unwrap();

        assert!(history.val_loss.last().unwrap() < history.val_loss.first().unwrap());
    }

    #[test]
    fn test_history_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = History {
            loss: vec![0.5, 0.25],
            accuracy: vec![0.5, 1.],
            val_loss: vec![],
            val_accuracy: vec![],
        };

        history.save_json(&path).unwrap();

        let restored: History = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(restored, history);
        dir.close().unwrap();
    }
}
