//! Letter detection: Canny edges of the gray image, traced into outer
//! contours and drawn back onto the colour image. `canny` smooths the image
//! with a gaussian of σ = 1.4 first, there is no separate blur pass.
use image::{imageops, Rgb, RgbImage};
use imageproc::{
    contours::{find_contours, Contour},
    drawing::draw_line_segment_mut,
    edges::canny,
    point::Point,
};
use log::debug;

use crate::{roi::GREEN, EdgeError, EdgeResult};

/// Parameters of the letter detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterParams {
    pub low_threshold: f32,
    pub high_threshold: f32,
    pub color: Rgb<u8>,
    pub thickness: u32,
}

impl Default for LetterParams {
    fn default() -> Self {
        LetterParams {
            low_threshold: 90.,
            high_threshold: 150.,
            color: GREEN,
            thickness: 2,
        }
    }
}

/// Finds the outer contours of all edges in the image and returns a copy of
/// the image with the contours drawn on, together with the contours.
pub fn find_letters(
    image: &RgbImage,
    params: &LetterParams,
) -> EdgeResult<(RgbImage, Vec<Vec<Point<u32>>>)> {
    // also rejects NaN, which `canny` would panic on
    if !(params.low_threshold >= 0. && params.low_threshold <= params.high_threshold) {
        return Err(EdgeError::ThresholdError(
            params.low_threshold,
            params.high_threshold,
        ));
    }

    let gray = imageops::grayscale(image);
    let edges = canny(&gray, params.low_threshold, params.high_threshold);

    let contours: Vec<Vec<Point<u32>>> = external_contours(find_contours::<u32>(&edges))
        .map(|points| approx_simple(&points))
        .collect();
    debug!(
        "Found {} outer contours with {} points",
        contours.len(),
        contours.iter().map(Vec::len).sum::<usize>()
    );

    let mut annotated = image.clone();
    draw_contours(&mut annotated, &contours, params.color, params.thickness);
    Ok((annotated, contours))
}

fn external_contours(contours: Vec<Contour<u32>>) -> impl Iterator<Item = Vec<Point<u32>>> {
    contours
        .into_iter()
        .filter(|c| c.parent.is_none())
        .map(|c| c.points)
}

/// Compresses horizontal, vertical and diagonal runs of a closed contour to
/// their end points.
pub fn approx_simple(points: &[Point<u32>]) -> Vec<Point<u32>> {
    let mut points = points.to_vec();
    points.dedup();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    let n = points.len();
    if n < 3 {
        return points;
    }
    let step = |a: Point<u32>, b: Point<u32>| {
        (
            (b.x as i64 - a.x as i64).signum(),
            (b.y as i64 - a.y as i64).signum(),
        )
    };

    let corners: Vec<Point<u32>> = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect();

    if corners.is_empty() {
        vec![points[0]]
    } else {
        corners
    }
}

/// Draws every contour as closed polygon. Thick lines are drawn as parallel
/// one pixel lines.
pub fn draw_contours(
    image: &mut RgbImage,
    contours: &[Vec<Point<u32>>],
    color: Rgb<u8>,
    thickness: u32,
) {
    let thickness = thickness as i64;
    let offsets: Vec<f32> = (-((thickness - 1) / 2)..=(thickness / 2))
        .map(|o| o as f32)
        .collect();

    for contour in contours {
        for (i, start) in contour.iter().enumerate() {
            let end = contour[(i + 1) % contour.len()];
            for &dx in &offsets {
                for &dy in &offsets {
                    draw_line_segment_mut(
                        image,
                        (start.x as f32 + dx, start.y as f32 + dy),
                        (end.x as f32 + dx, end.y as f32 + dy),
                        color,
                    );
                }
            }
        }
    }
}
