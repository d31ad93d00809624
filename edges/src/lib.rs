//! This crate finds the letters on a photograph of a document.
//!
//! The pipeline marks a region of interest on the photograph, crops it out
//! and then traces the outer contours of the Canny edges of the crop. Every
//! stage reads an image file and writes a JPEG, see [`EdgeDetection`].

mod errors;
pub mod letters;
pub mod roi;

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::info;

pub use errors::EdgeError;
use letters::{find_letters, LetterParams};
use roi::{crop, draw_roi, Roi, GREEN};

pub type EdgeResult<T> = std::result::Result<T, EdgeError>;

/// Thickness of the drawn region of interest
pub const ROI_THICKNESS: u32 = 3;

/// The three stages of the letter detection. Each stage reads an image and
/// writes the result to the given path.
#[derive(Debug, Clone)]
pub struct EdgeDetection {
    out_dir: PathBuf,
    roi: Roi,
    letter_params: LetterParams,
}

impl EdgeDetection {
    /// Creates the output directory if it does not exist yet.
    pub fn new<P: AsRef<Path>>(out_dir: P) -> EdgeResult<EdgeDetection> {
        let out_dir = out_dir.as_ref().to_path_buf();
        fs::create_dir_all(&out_dir)?;
        Ok(EdgeDetection {
            out_dir,
            roi: Roi::default(),
            letter_params: LetterParams::default(),
        })
    }

    pub fn with_roi(mut self, roi: Roi) -> Self {
        self.roi = roi;
        self
    }

    pub fn with_letter_params(mut self, letter_params: LetterParams) -> Self {
        self.letter_params = letter_params;
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn roi(&self) -> &Roi {
        &self.roi
    }

    /// Path of a file in the output directory
    pub fn out_path<P: AsRef<Path>>(&self, file_name: P) -> PathBuf {
        self.out_dir.join(file_name)
    }

    /// Draws the region of interest onto the image and saves it.
    pub fn create_image_roi<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> EdgeResult<PathBuf> {
        let mut image = load_image(input.as_ref())?;
        draw_roi(&mut image, &self.roi, GREEN, ROI_THICKNESS);

        let output = output.as_ref().to_path_buf();
        image.save(&output)?;
        info!("Saved image with region of interest {} to {}", self.roi, output.display());
        Ok(output)
    }

    /// Saves the region of interest of the image.
    pub fn crop_image<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> EdgeResult<PathBuf> {
        let cropped = crop(&load_image(input.as_ref())?, &self.roi)?;

        let output = output.as_ref().to_path_buf();
        cropped.save(&output)?;
        info!(
            "Saved {}x{} crop to {}",
            cropped.width(),
            cropped.height(),
            output.display()
        );
        Ok(output)
    }

    /// Draws the contours of the letters onto the image and saves it.
    pub fn find_letters<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> EdgeResult<PathBuf> {
        let (letters, contours) = find_letters(&load_image(input.as_ref())?, &self.letter_params)?;

        let output = output.as_ref().to_path_buf();
        letters.save(&output)?;
        info!("Saved {} letter contours to {}", contours.len(), output.display());
        Ok(output)
    }
}

fn load_image(path: &Path) -> EdgeResult<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    /// White page with a dark bar at [20, 40) x [10, 20)
    fn write_page(path: &Path) {
        RgbImage::from_fn(64, 48, |x, y| {
            if (20..40).contains(&x) && (10..20).contains(&y) {
                Rgb([10, 10, 10])
            } else {
                Rgb([250, 250, 250])
            }
        })
        .save(path)
        .unwrap();
    }

    #[test]
    fn test_creates_out_dir() {
        let dir = tempdir().unwrap();
        let out_dir = dir.path().join("nested").join("out");

        let detection = EdgeDetection::new(&out_dir).unwrap();

        assert!(out_dir.is_dir());
        assert_eq!(detection.out_dir(), out_dir.as_path());
        assert_eq!(*detection.roi(), Roi::default());
    }

    #[test]
    fn test_pipeline() {
        let dir = tempdir().unwrap();
        let page = dir.path().join("page.png");
        write_page(&page);
        let detection = EdgeDetection::new(dir.path().join("out"))
            .unwrap()
            .with_roi(Roi::new(50, 30, 10, 5));

        let with_roi = detection
            .create_image_roi(&page, detection.out_path("image_with_ROI.jpg"))
            .unwrap();
        let cropped = detection
            .crop_image(&page, detection.out_path("image_cropped.jpg"))
            .unwrap();
        let letters = detection
            .find_letters(&cropped, detection.out_path("image_letters.jpg"))
            .unwrap();

        assert_eq!(with_roi, dir.path().join("out").join("image_with_ROI.jpg"));
        assert_eq!(image::open(&with_roi).unwrap().to_rgb8().dimensions(), (64, 48));
        assert_eq!(image::open(&cropped).unwrap().to_rgb8().dimensions(), (40, 25));
        assert_eq!(image::open(&letters).unwrap().to_rgb8().dimensions(), (40, 25));
    }

    #[test]
    fn test_missing_input() {
        let dir = tempdir().unwrap();
        let detection = EdgeDetection::new(dir.path()).unwrap();

        assert!(detection
            .crop_image(dir.path().join("missing.jpg"), detection.out_path("out.jpg"))
            .is_err());
    }

    #[test]
    fn test_crop_outside_image() {
        let dir = tempdir().unwrap();
        let page = dir.path().join("page.png");
        write_page(&page);
        let detection = EdgeDetection::new(dir.path()).unwrap();

        // the default region lies far outside the small page
        assert!(matches!(
            detection.crop_image(&page, detection.out_path("cropped.jpg")),
            Err(EdgeError::EmptyCropError(_, 64, 48))
        ));
    }
}
