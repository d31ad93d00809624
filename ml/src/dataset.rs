//! Loading of labelled image datasets from a directory tree.
//!
//! The expected layout is one subdirectory per class:
//!
//! ```text
//! training/
//!     Cezanne/
//!         a.jpg
//!         ...
//!     Degas/
//!         ...
//! ```
//!
//! Classes are sorted alphabetically, the label of an image is the position of its
//! class in that order.
use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, io::Reader as ImageReader};
use log::{debug, info};
use ndarray::*;
use ndarray_rand::rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use nshare::ToNdarray3;
use thiserror::Error;

use crate::ImagePrecision;

/// File extensions that are picked up as images (case insensitive)
pub const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png"];

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Dataset directory {0} does not exist or is not a directory")]
    NotADirectoryError(PathBuf),
    #[error("No class subdirectories found in {0}")]
    NoClassesError(PathBuf),
    #[error("No images found in the class subdirectories of {0}")]
    NoImagesError(PathBuf),
    #[error("Dataset not readable. Filesystem reported error\n {0}.")]
    DatasetIoError(#[from] std::io::Error),
    #[error("Could not decode image {0}: {1}")]
    ImageDecodeError(PathBuf, image::ImageError),
    #[error("Cannot hold out {0} samples of a dataset with {1} samples")]
    SplitSizeError(usize, usize),
    #[error("Datasets have different classes: {0:?} and {1:?}")]
    ClassMismatchError(Vec<String>, Vec<String>),
}

/// Images of a directory dataset, resized to a common size and kept as raw
/// pixels in (N, C, H, W) layout.
pub struct ImageDataset {
    images: Array4<u8>,
    labels: Vec<usize>,
    class_names: Vec<String>,
    standardize: bool,
}

impl ImageDataset {
    /// Reads all images below `dir`, resizes them to `img_height` x `img_width`
    /// and shuffles them with the given seed.
    pub fn from_directory<P: AsRef<Path>>(
        dir: P,
        img_height: u32,
        img_width: u32,
        seed: u64,
    ) -> DatasetResult<ImageDataset> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(DatasetError::NotADirectoryError(dir.to_path_buf()));
        }

        let class_names = class_directories(dir)?;
        if class_names.is_empty() {
            return Err(DatasetError::NoClassesError(dir.to_path_buf()));
        }

        let mut files = Vec::new();
        for (label, class) in class_names.iter().enumerate() {
            for path in image_files(&dir.join(class))? {
                files.push((path, label));
            }
        }
        if files.is_empty() {
            return Err(DatasetError::NoImagesError(dir.to_path_buf()));
        }
        files.shuffle(&mut StdRng::seed_from_u64(seed));

        info!(
            "Found {} files belonging to {} classes in {}.",
            files.len(),
            class_names.len(),
            dir.display()
        );

        let mut images = Array4::zeros((files.len(), 3, img_height as usize, img_width as usize));
        for ((path, _), mut slot) in files.iter().zip(images.outer_iter_mut()) {
            debug!("Loading {}", path.display());
            slot.assign(&load_resized(path, img_height, img_width)?);
        }

        Ok(ImageDataset {
            images,
            labels: files.into_iter().map(|(_, label)| label).collect(),
            class_names,
            standardize: false,
        })
    }

    pub fn from_arrays(images: Array4<u8>, labels: Vec<usize>, class_names: Vec<String>) -> Self {
        debug_assert_eq!(images.len_of(Axis(0)), labels.len());
        ImageDataset {
            images,
            labels,
            class_names,
            standardize: false,
        }
    }

    /// Switches per-image standardization (zero mean, unit variance) of the
    /// batches on or off.
    pub fn with_standardization(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    /// Moves the last `test_size` samples into a new dataset. Both parts must
    /// keep at least one sample.
    pub fn split_off(&mut self, test_size: usize) -> DatasetResult<ImageDataset> {
        let len = self.len();
        if test_size == 0 || test_size >= len {
            return Err(DatasetError::SplitSizeError(test_size, len));
        }
        let keep = len - test_size;

        let held_out = self.images.slice(s![keep.., .., .., ..]).to_owned();
        self.images = self.images.slice(s![..keep, .., .., ..]).to_owned();
        let held_out_labels = self.labels.split_off(keep);

        Ok(ImageDataset {
            images: held_out,
            labels: held_out_labels,
            class_names: self.class_names.clone(),
            standardize: self.standardize,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Labels are only comparable between datasets with the same classes.
    pub fn check_same_classes(&self, other: &ImageDataset) -> DatasetResult<()> {
        if self.class_names != other.class_names {
            return Err(DatasetError::ClassMismatchError(
                self.class_names.clone(),
                other.class_names.clone(),
            ));
        }
        Ok(())
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn labels_of(&self, indices: &[usize]) -> Vec<usize> {
        indices.iter().map(|&i| self.labels[i]).collect()
    }

    /// The selected images as floats, either raw pixel values in [0, 255] or
    /// standardized.
    pub fn batch(&self, indices: &[usize]) -> Array4<ImagePrecision> {
        let mut batch = self
            .images
            .select(Axis(0), indices)
            .mapv(|a| a as ImagePrecision);
        if self.standardize {
            for mut image in batch.outer_iter_mut() {
                standardize(&mut image);
            }
        }
        batch
    }

    /// All images, see `batch`
    pub fn images(&self) -> Array4<ImagePrecision> {
        let indices: Vec<usize> = (0..self.len()).collect();
        self.batch(&indices)
    }
}

/// Linearly scales the image to zero mean and unit variance. The standard
/// deviation is bounded below by 1/sqrt(#pixels), so uniform images don't blow up.
fn standardize(image: &mut ArrayViewMut3<ImagePrecision>) {
    let n = image.len() as ImagePrecision;
    let mean = image.sum() / n;
    let variance = image.fold(0., |acc, &a| acc + (a - mean).powi(2)) / n;
    let std = variance.sqrt().max(1. / n.sqrt());
    image.mapv_inplace(|a| (a - mean) / std);
}

fn class_directories(dir: &Path) -> DatasetResult<Vec<String>> {
    let mut classes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            classes.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    classes.sort();
    Ok(classes)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn image_files(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Returns the image as RGB (C, H, W) array, resized with bilinear filtering.
fn load_resized(path: &Path, img_height: u32, img_width: u32) -> DatasetResult<Array3<u8>> {
    let img = ImageReader::open(path)?
        .decode()
        .map_err(|e| DatasetError::ImageDecodeError(path.to_path_buf(), e))?;
    let resized =
        image::imageops::resize(&img.to_rgb8(), img_width, img_height, FilterType::Triangle);
    Ok(resized.into_ndarray3())
}
