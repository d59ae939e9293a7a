//! gridtrace-core: divide-and-conquer border following (sans-IO).
//!
//! Extracts every closed border of a binary image by seeding single-pixel
//! fragments for each pixel, then merging neighbouring grid cells in
//! parallel, alternating horizontal and vertical passes, until one cell
//! holds the finished contours.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! images and byte slices and returns structured data.

pub mod buffer;
pub mod combine;
pub mod contour;
pub mod diagnostics;
pub mod geometry;
pub mod grid;
pub mod region;
pub mod run;
pub mod seed;
pub mod types;

pub use contour::{ContourTracer, TracerKind};
pub use geometry::{ChainDirection, PixelPoint, PixelSize};
pub use grid::ReduceDirection;
pub use region::PatternKind;
pub use seed::{BinaryImage, SeederKind};
pub use types::{Contour, Dimensions, GrayImage, TraceConfig, TraceError, TraceResult};

/// Trace every closed border in a grayscale image.
///
/// Pixels brighter than `config.threshold` are foreground (the reverse
/// when `config.invert` is set). Pixels outside the image count as
/// background, so borders along the image edge close normally.
///
/// # Errors
///
/// Returns [`TraceError::InvalidConfig`] for a rejected configuration,
/// [`TraceError::EmptyImage`] for a zero-sized image, and the tracer's
/// own errors otherwise.
pub fn trace_image(gray: &GrayImage, config: &TraceConfig) -> Result<TraceResult, TraceError> {
    config.validate()?;
    if gray.width() == 0 || gray.height() == 0 {
        return Err(TraceError::EmptyImage);
    }

    let binary = BinaryImage::from_gray(gray, config.threshold, config.invert);
    if binary.foreground_count() == 0 {
        log::warn!("image has no foreground pixels at threshold {}", config.threshold);
    }

    let contours = config.tracer.trace(&binary, config)?;
    log::info!("traced {} contours", contours.len());
    Ok(TraceResult {
        contours,
        dimensions: Dimensions {
            width: gray.width(),
            height: gray.height(),
        },
    })
}

/// Decode raw image bytes (PNG, JPEG, BMP, WebP) and trace them.
///
/// # Errors
///
/// Returns [`TraceError::EmptyInput`] if `image_bytes` is empty,
/// [`TraceError::ImageDecode`] if the format is unrecognized, and the
/// errors of [`trace_image`] otherwise.
pub fn process(image_bytes: &[u8], config: &TraceConfig) -> Result<TraceResult, TraceError> {
    let gray = decode_grayscale(image_bytes)?;
    trace_image(&gray, config)
}

/// Decode raw image bytes and convert to 8-bit luma.
///
/// # Errors
///
/// Returns [`TraceError::EmptyInput`] if `bytes` is empty and
/// [`TraceError::ImageDecode`] if the data cannot be decoded.
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage, TraceError> {
    if bytes.is_empty() {
        return Err(TraceError::EmptyInput);
    }
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_luma8())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A PNG with a white square on black.
    fn square_png(size: u32, inset: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(size, size, |x, y| {
            let inside = (inset..size - inset).contains(&x) && (inset..size - inset).contains(&y);
            if inside {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn process_empty_input() {
        let result = process(&[], &TraceConfig::default());
        assert!(matches!(result, Err(TraceError::EmptyInput)));
    }

    #[test]
    fn process_corrupt_input() {
        let result = process(&[0xFF, 0x00], &TraceConfig::default());
        assert!(matches!(result, Err(TraceError::ImageDecode(_))));
    }

    #[test]
    fn process_square_finds_one_border() {
        let png = square_png(12, 3);
        let result = process(&png, &TraceConfig::default()).unwrap();
        assert_eq!(result.contours.len(), 1);
        assert_eq!(result.total_points(), 2 * (6 + 6) - 4);
        assert_eq!(
            result.dimensions,
            Dimensions {
                width: 12,
                height: 12
            }
        );
    }

    #[test]
    fn process_inverted_square_traces_the_frame() {
        let png = square_png(12, 3);
        let config = TraceConfig {
            invert: true,
            ..TraceConfig::default()
        };
        // The frame has an outer border and a hole border.
        let result = process(&png, &config).unwrap();
        assert_eq!(result.contours.len(), 2);
    }

    #[test]
    fn uniform_image_has_no_contours() {
        let gray = GrayImage::from_pixel(9, 7, image::Luma([10]));
        let result = trace_image(&gray, &TraceConfig::default()).unwrap();
        assert!(result.contours.is_empty());
    }

    #[test]
    fn full_image_has_one_border_along_the_edge() {
        let gray = GrayImage::from_pixel(9, 7, image::Luma([200]));
        let result = trace_image(&gray, &TraceConfig::default()).unwrap();
        assert_eq!(result.contours.len(), 1);
        assert_eq!(result.total_points(), 2 * (9 + 7) - 4);
    }

    #[test]
    fn trace_image_rejects_empty_image() {
        let gray = GrayImage::new(0, 3);
        assert!(matches!(
            trace_image(&gray, &TraceConfig::default()),
            Err(TraceError::EmptyImage)
        ));
    }

    #[test]
    fn trace_image_rejects_low_density() {
        let gray = GrayImage::new(3, 3);
        let config = TraceConfig {
            density: 0,
            ..TraceConfig::default()
        };
        assert!(matches!(
            trace_image(&gray, &config),
            Err(TraceError::InvalidConfig(_))
        ));
    }
}
