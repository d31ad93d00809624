//! Small convolutional network toolkit on top of ndarray.
//!
//! Data flows through the layers as dynamically shaped arrays. Images are
//! kept in Pytorch layout (batch, channels, height, width).
pub mod activation_functions;
pub mod convolutions;
pub mod dataset;
pub mod errors;
pub mod fully_connected;
pub mod layers;
pub mod losses;
pub mod metrics;
pub mod models;
pub mod optimizers;
pub mod pooling;
pub mod training;
pub mod weight_loader;

pub type WeightPrecision = f32;
pub type ImagePrecision = f32;

/// Representation of the data that is passed between layers.
pub type InternalDataRepresentation = ndarray::ArrayD<ImagePrecision>;
