//! This crate ties the classifier and the letter detection together and provides
//! a command line interface for both.

use edges::{letters::LetterParams, roi::Roi, EdgeDetection};
use env_logger::Builder;
use log::{info, warn};
use ml::{
    dataset::{DatasetResult, ImageDataset},
    metrics::ClassificationReport,
    models::artist_classifier,
    optimizers::Adam,
    training::{fit, predict_labels, EarlyStopping, FitConfig},
    weight_loader::NpzWeightLoader,
};
use quicli::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use std::{fs, path::PathBuf};
use structopt::StructOpt;
use visual::{
    logging::{progress_level, PROGRESS_MODULES},
    paths::{self, or_default},
};

const FAREWELL: &str = "DONE! Have a nice day. :-)";

/// Trains a convolutional network that tells painters apart
#[derive(Debug, StructOpt)]
struct ClassifyOpts {
    /// Random state for shuffling and weight initialisation
    #[structopt(long = "rs", default_value = "1")]
    random_state: u64,
    /// Number of training samples held out for validation if there is no validation directory
    #[structopt(long = "ts", default_value = "2500")]
    test_size: usize,
    /// Standardizes every image to zero mean and unit variance
    #[structopt(long = "s")]
    scaling: bool,
    /// Feeds raw pixel values to the network instead of scaling them to [0, 1]
    #[structopt(long = "no-mm")]
    no_min_max: bool,
    /// Number of training epochs
    #[structopt(long = "e", default_value = "100")]
    epochs: usize,
    /// Trains for all epochs, even if the validation loss stops improving
    #[structopt(long = "no-es")]
    no_early_stopping: bool,
    /// Epochs without improvement before training stops early
    #[structopt(long = "patience", default_value = "3")]
    patience: usize,
    /// Training directory with one subdirectory per painter
    #[structopt(long = "td", parse(from_os_str))]
    train_dir: Option<PathBuf>,
    /// Validation directory with one subdirectory per painter
    #[structopt(long = "vd", parse(from_os_str))]
    val_dir: Option<PathBuf>,
    /// Output directory for the training history and the weights
    #[structopt(long = "od", parse(from_os_str))]
    out_dir: Option<PathBuf>,
    /// Images are resized to this height
    #[structopt(long = "height", default_value = "180")]
    img_height: u32,
    /// Images are resized to this width
    #[structopt(long = "width", default_value = "180")]
    img_width: u32,
    #[structopt(long = "bs", default_value = "32")]
    batch_size: usize,
    /// Weights (.npz) to start training from
    #[structopt(long = "weights", parse(from_os_str))]
    weights: Option<PathBuf>,
    #[structopt(flatten)]
    verbosity: Verbosity,
}

/// Marks, crops and outlines the letters on a photograph
#[derive(Debug, StructOpt)]
struct EdgesOpts {
    /// Data directory
    #[structopt(long = "dd", parse(from_os_str))]
    data_dir: Option<PathBuf>,
    /// Output directory
    #[structopt(long = "od", parse(from_os_str))]
    out_dir: Option<PathBuf>,
    /// Path of the target image
    #[structopt(long = "tif", parse(from_os_str))]
    target_image: Option<PathBuf>,
    /// Output path of the image with the green region of interest
    #[structopt(long = "opROI", parse(from_os_str))]
    roi_output: Option<PathBuf>,
    /// Output path of the cropped image
    #[structopt(long = "opc", parse(from_os_str))]
    cropped_output: Option<PathBuf>,
    /// Output path of the image with the letter contours
    #[structopt(long = "opl", parse(from_os_str))]
    letters_output: Option<PathBuf>,
    /// Region of interest as "x0,y0,x1,y1"
    #[structopt(long = "roi")]
    roi: Option<Roi>,
    /// Lower threshold of the Canny edge detection
    #[structopt(long = "low", default_value = "90")]
    low_threshold: f32,
    /// Upper threshold of the Canny edge detection
    #[structopt(long = "high", default_value = "150")]
    high_threshold: f32,
    #[structopt(flatten)]
    verbosity: Verbosity,
}

/// Classify paintings and find letters on photographs.
#[derive(Debug, StructOpt)]
#[structopt(name = "visual")]
enum Visual {
    #[structopt(
        name = "classify",
        about = "Trains a convolutional neural network on paintings and prints a classification report."
    )]
    Classify(ClassifyOpts),
    #[structopt(
        name = "edges",
        about = "Draws the region of interest, crops it and outlines the letters in it."
    )]
    Edges(EdgesOpts),
}

/// Trait for the subcommands of visual
trait VisualOpts {
    /// Performs the subcommand
    fn run(&self) -> CliResult;
    /// Returns the verbosity command
    fn get_verbosity(&self) -> &Verbosity;
    /// Sets up logging. Progress messages are shown even without `-v`.
    fn setup_env_logger(&self) -> CliResult {
        let mut builder = Builder::from_default_env();
        let level = self.get_verbosity().log_level().to_level_filter();

        builder.filter(None, level);
        for &module in PROGRESS_MODULES {
            builder.filter(Some(module), progress_level(level));
        }
        builder.init();

        Ok(())
    }
}

impl ClassifyOpts {
    fn fit_config(&self) -> FitConfig {
        FitConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            early_stopping: if self.no_early_stopping {
                None
            } else {
                Some(EarlyStopping {
                    patience: self.patience,
                    ..EarlyStopping::default()
                })
            },
        }
    }

    /// Training and validation set. Without a validation directory the last
    /// `test_size` training samples are used for validation.
    fn load_datasets(&self) -> DatasetResult<(ImageDataset, ImageDataset)> {
        let train_dir = or_default(&self.train_dir, "Training directory", paths::training_dir);
        let val_dir = or_default(&self.val_dir, "Validation directory", paths::validation_dir);

        let load = |dir: &PathBuf| {
            ImageDataset::from_directory(dir, self.img_height, self.img_width, self.random_state)
                .map(|d| d.with_standardization(self.scaling))
        };

        let mut train = load(&train_dir)?;
        let validation = if val_dir.is_dir() {
            let validation = load(&val_dir)?;
            train.check_same_classes(&validation)?;
            validation
        } else {
            warn!(
                "Validation directory {} not found, holding out {} training samples.",
                val_dir.display(),
                self.test_size
            );
            train.split_off(self.test_size)?
        };
        Ok((train, validation))
    }
}

impl VisualOpts for ClassifyOpts {
    fn run(&self) -> CliResult {
        println!("Initiating some awesome convolutional neural networks!");

        let out_dir = or_default(&self.out_dir, "Output directory", paths::out_dir);
        fs::create_dir_all(&out_dir)?;

        let (train, validation) = self.load_datasets()?;
        info!(
            "Training on {} images, validating on {} images of {} painters.",
            train.len(),
            validation.len(),
            train.num_classes()
        );

        let mut rng = StdRng::seed_from_u64(self.random_state);
        let mut model = artist_classifier(
            self.img_height as usize,
            self.img_width as usize,
            train.num_classes(),
            !self.no_min_max,
            &mut rng,
        );
        if let Some(weights) = &self.weights {
            model.load_weights(&mut NpzWeightLoader::from_path(weights)?)?;
            info!("Starting from weights {}", weights.display());
        }
        println!("{}", model.summary());

        let history = fit(
            &mut model,
            &mut Adam::default(),
            &train,
            Some(&validation),
            &self.fit_config(),
            &mut rng,
        )?;
        history.save_json(out_dir.join(paths::HISTORY_FILE))?;
        model.save_weights(out_dir.join(paths::WEIGHTS_FILE))?;
        info!("Saved history and weights of {} epochs to {}", history.epochs(), out_dir.display());

        let predictions = predict_labels(&mut model, &validation, self.batch_size)?;
        let report =
            ClassificationReport::new(validation.labels(), &predictions, validation.class_names())?;
        println!("{}", report);

        println!("{}", FAREWELL);
        Ok(())
    }

    fn get_verbosity(&self) -> &Verbosity {
        &self.verbosity
    }
}

impl VisualOpts for EdgesOpts {
    fn run(&self) -> CliResult {
        println!("Initiating some awesome image search!");

        let data_dir = or_default(&self.data_dir, "Data directory", paths::edges_data_dir);
        let out_dir = or_default(&self.out_dir, "Output directory", paths::out_dir);
        let target = or_default(&self.target_image, "Target image filepath", || {
            data_dir.join(paths::TARGET_IMAGE)
        });

        let detection = EdgeDetection::new(&out_dir)?
            .with_roi(self.roi.unwrap_or_default())
            .with_letter_params(LetterParams {
                low_threshold: self.low_threshold,
                high_threshold: self.high_threshold,
                ..LetterParams::default()
            });

        let roi_output = or_default(&self.roi_output, "Output image ROI filepath", || {
            detection.out_path(paths::ROI_IMAGE)
        });
        let cropped_output = or_default(&self.cropped_output, "Output cropped image filepath", || {
            detection.out_path(paths::CROPPED_IMAGE)
        });
        let letters_output = or_default(&self.letters_output, "Output letters image filepath", || {
            detection.out_path(paths::LETTERS_IMAGE)
        });

        detection.create_image_roi(&target, &roi_output)?;
        let cropped = detection.crop_image(&target, &cropped_output)?;
        detection.find_letters(&cropped, &letters_output)?;

        println!("{}", FAREWELL);
        Ok(())
    }

    fn get_verbosity(&self) -> &Verbosity {
        &self.verbosity
    }
}

impl VisualOpts for Visual {
    fn run(&self) -> CliResult {
        match self {
            Visual::Classify(c) => c.run(),
            Visual::Edges(c) => c.run(),
        }
    }

    fn get_verbosity(&self) -> &Verbosity {
        match self {
            Visual::Classify(c) => c.get_verbosity(),
            Visual::Edges(c) => c.get_verbosity(),
        }
    }
}

fn main() -> CliResult {
    let args = Visual::from_args();
    args.setup_env_logger()?;
    args.run()
}
