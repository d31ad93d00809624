//! Rectangular regions of interest: parsing, drawing and cropping.
use std::fmt::{self, Display};
use std::str::FromStr;

use image::{imageops, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{EdgeError, EdgeResult};

/// Green, the colour of all annotations
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// A rectangle given by two opposite corners, in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Roi {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Roi { x0, y0, x1, y1 }
    }

    pub fn left(&self) -> u32 {
        self.x0.min(self.x1)
    }

    pub fn right(&self) -> u32 {
        self.x0.max(self.x1)
    }

    pub fn top(&self) -> u32 {
        self.y0.min(self.y1)
    }

    pub fn bottom(&self) -> u32 {
        self.y0.max(self.y1)
    }

    /// The same region with (x0, y0) as top left corner.
    pub fn normalized(&self) -> Self {
        Roi::new(self.left(), self.top(), self.right(), self.bottom())
    }
}

impl Default for Roi {
    /// The area of the letters on the test photograph
    fn default() -> Self {
        Roi::new(2900, 2800, 1400, 875)
    }
}

impl Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x0, self.y0, self.x1, self.y1)
    }
}

impl FromStr for Roi {
    type Err = EdgeError;

    fn from_str(s: &str) -> EdgeResult<Roi> {
        let parse_error = || EdgeError::RoiParseError(s.to_string());
        let coords = s
            .split(',')
            .map(|c| c.trim().parse::<u32>().map_err(|_| parse_error()))
            .collect::<EdgeResult<Vec<u32>>>()?;
        match coords[..] {
            [x0, y0, x1, y1] => Ok(Roi::new(x0, y0, x1, y1)),
            _ => Err(parse_error()),
        }
    }
}

/// Draws the border of the region onto the image. Both corners are part of
/// the border, which is `thickness` pixels wide and centred on it. Parts
/// outside the image are clipped.
pub fn draw_roi(image: &mut RgbImage, roi: &Roi, color: Rgb<u8>, thickness: u32) {
    let width = (roi.right() - roi.left() + 1) as i64;
    let height = (roi.bottom() - roi.top() + 1) as i64;
    let thickness = thickness as i64;

    for grow in -((thickness - 1) / 2)..=(thickness / 2) {
        let (w, h) = (width + 2 * grow, height + 2 * grow);
        if w <= 0 || h <= 0 {
            continue;
        }
        let rect = Rect::at(roi.left() as i32 - grow as i32, roi.top() as i32 - grow as i32)
            .of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Copies the rows `top..bottom` and columns `left..right` of the image.
/// The region is clamped to the image first, an empty result is an error.
pub fn crop(image: &RgbImage, roi: &Roi) -> EdgeResult<RgbImage> {
    let (img_width, img_height) = image.dimensions();
    let (left, right) = (roi.left().min(img_width), roi.right().min(img_width));
    let (top, bottom) = (roi.top().min(img_height), roi.bottom().min(img_height));

    if left == right || top == bottom {
        return Err(EdgeError::EmptyCropError(*roi, img_width, img_height));
    }
    Ok(imageops::crop_imm(image, left, top, right - left, bottom - top).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_color(image: &RgbImage, color: Rgb<u8>) -> usize {
        image.pixels().filter(|&&p| p == color).count()
    }

    #[test]
    fn test_parse() {
        assert_eq!("1,2,3,4".parse::<Roi>().unwrap(), Roi::new(1, 2, 3, 4));
        assert_eq!(" 10, 20 ,5,7".parse::<Roi>().unwrap(), Roi::new(10, 20, 5, 7));
        for bad in &["1,2,3", "1,2,3,4,5", "a,b,c,d", "-1,0,2,2", ""] {
            assert!(matches!(bad.parse::<Roi>(), Err(EdgeError::RoiParseError(_))));
        }
        let roi = Roi::new(9, 8, 7, 6);
        assert_eq!(roi.to_string().parse::<Roi>().unwrap(), roi);
    }

    #[test]
    fn test_normalized() {
        let roi = Roi::default();
        assert_eq!(roi.normalized(), Roi::new(1400, 875, 2900, 2800));
        assert_eq!((roi.left(), roi.top(), roi.right(), roi.bottom()), (1400, 875, 2900, 2800));
    }

    #[test]
    fn test_draw_thin_roi() {
        let mut image = RgbImage::new(10, 10);
        draw_roi(&mut image, &Roi::new(6, 5, 2, 1), GREEN, 1);

        // 5x5 border includes both corners
        assert_eq!(count_color(&image, GREEN), 16);
        assert_eq!(*image.get_pixel(2, 1), GREEN);
        assert_eq!(*image.get_pixel(6, 5), GREEN);
        assert_eq!(*image.get_pixel(4, 3), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_thick_roi_is_centred_and_clipped() {
        let mut image = RgbImage::new(20, 20);
        draw_roi(&mut image, &Roi::new(5, 5, 14, 14), GREEN, 3);

        assert_eq!(*image.get_pixel(4, 10), GREEN);
        assert_eq!(*image.get_pixel(6, 10), GREEN);
        assert_eq!(*image.get_pixel(3, 10), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(7, 10), Rgb([0, 0, 0]));

        let mut small = RgbImage::new(4, 4);
        draw_roi(&mut small, &Roi::default(), GREEN, 3);
        assert_eq!(count_color(&small, GREEN), 0);
    }

    #[test]
    fn test_crop() {
        let image = RgbImage::from_fn(8, 6, |x, y| Rgb([x as u8, y as u8, 0]));

        let cropped = crop(&image, &Roi::new(5, 4, 2, 1)).unwrap();
        assert_eq!(cropped.dimensions(), (3, 3));
        assert_eq!(*cropped.get_pixel(0, 0), Rgb([2, 1, 0]));
        assert_eq!(*cropped.get_pixel(2, 2), Rgb([4, 3, 0]));

        // clamped like array slicing
        let clamped = crop(&image, &Roi::new(6, 3, 100, 100)).unwrap();
        assert_eq!(clamped.dimensions(), (2, 3));
        assert_eq!(*clamped.get_pixel(1, 2), Rgb([7, 5, 0]));
    }

    #[test]
    fn test_empty_crop() {
        let image = RgbImage::new(8, 6);
        assert!(matches!(
            crop(&image, &Roi::new(10, 0, 20, 5)),
            Err(EdgeError::EmptyCropError(_, 8, 6))
        ));
        assert!(matches!(
            crop(&image, &Roi::new(3, 2, 3, 5)),
            Err(EdgeError::EmptyCropError(_, 8, 6))
        ));
    }
}
