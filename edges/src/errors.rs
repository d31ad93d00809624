use thiserror::Error;

use crate::roi::Roi;

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("Could not parse region of interest {0:?}, expected \"x0,y0,x1,y1\".")]
    RoiParseError(String),
    #[error("Region of interest {0} does not overlap the {1}x{2} image.")]
    EmptyCropError(Roi, u32, u32),
    #[error("Invalid Canny thresholds: low {0} must be nonnegative and at most high {1}.")]
    ThresholdError(f32, f32),
    #[error("Image could not be read or written:\n {0}")]
    ImageError(#[from] image::ImageError),
    #[error("Filesystem reported error\n {0}.")]
    EdgeIoError(#[from] std::io::Error),
}
