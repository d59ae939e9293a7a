//! Grid output against `imageproc`'s sequential border follower.
//!
//! The two tracers start and orient contours differently, so shapes are
//! compared by the set of pixels each border visits. Shapes stay off
//! the image edge.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gridtrace_core::{BinaryImage, Contour, ContourTracer, PixelPoint, TraceConfig, TracerKind};

fn mask(rows: &[&str]) -> BinaryImage {
    let height = u32::try_from(rows.len()).unwrap();
    let width = u32::try_from(rows[0].len()).unwrap();
    BinaryImage::from_fn(width, height, |x, y| {
        rows[y as usize].as_bytes()[x as usize] == b'#'
    })
}

fn pixel_sets(contours: &[Contour]) -> Vec<Vec<PixelPoint>> {
    let mut sets: Vec<Vec<PixelPoint>> = contours
        .iter()
        .map(|c| {
            let mut points = c.points().to_vec();
            points.sort_unstable();
            points.dedup();
            points
        })
        .collect();
    sets.sort();
    sets
}

fn assert_same_borders(image: &BinaryImage) {
    let config = TraceConfig::default();
    let grid = TracerKind::Grid.trace(image, &config).unwrap();
    let reference = TracerKind::BorderFollowing.trace(image, &config).unwrap();
    assert_eq!(grid.len(), reference.len());
    assert_eq!(pixel_sets(&grid), pixel_sets(&reference));
}

#[test]
fn single_pixel() {
    assert_same_borders(&mask(&[
        "...", //
        ".#.",
        "...",
    ]));
}

#[test]
fn solid_block() {
    assert_same_borders(&mask(&[
        ".......", //
        ".#####.",
        ".#####.",
        ".#####.",
        ".#####.",
        ".......",
    ]));
}

#[test]
fn thick_frame_with_hole() {
    assert_same_borders(&mask(&[
        "........", //
        ".######.",
        ".######.",
        ".##..##.",
        ".##..##.",
        ".######.",
        ".######.",
        "........",
    ]));
}

#[test]
fn separate_blobs() {
    assert_same_borders(&mask(&[
        "..........",
        ".##....#..",
        ".##...###.",
        "......###.",
        "..#.......",
        "..........",
    ]));
}

#[test]
fn l_shape() {
    assert_same_borders(&mask(&[
        ".......", //
        ".##....",
        ".##....",
        ".#####.",
        ".#####.",
        ".......",
    ]));
}
