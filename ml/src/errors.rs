use ndarray::ShapeError;
use thiserror::Error;

use crate::weight_loader::WeightError;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Wrong shape for tensor:\n {0}.")]
    ShapeError(#[from] ShapeError),
    #[error("Layer {0} received input of rank {1}, expected rank {2}")]
    RankError(&'static str, usize, usize),
    #[error("Layer {0} received {1} channels, expected {2}")]
    ChannelError(&'static str, usize, usize),
    #[error("Backward pass of layer {0} called before a forward pass")]
    MissingForwardPassError(&'static str),
    #[error("Batch has {0} samples but {1} labels")]
    LabelCountError(usize, usize),
    #[error("Label {0} is out of range for {1} classes")]
    LabelRangeError(usize, usize),
    #[error("Could not write weights: {0}")]
    WeightWriteError(#[from] ndarray_npy::WriteNpzError),
    #[error("Could not create file: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Could not serialize training history: {0}")]
    HistoryError(#[from] serde_json::Error),
    #[error(transparent)]
    WeightError(#[from] WeightError),
}
