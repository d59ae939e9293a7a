//! Integration test: encode an image, trace it, and export the borders to SVG.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gridtrace_core::TraceConfig;
use gridtrace_export::{SvgMetadata, to_svg};

/// A PNG with a bright ring (outer and hole border) and a lone dot.
fn ring_and_dot_png() -> Vec<u8> {
    let img = image::GrayImage::from_fn(16, 12, |x, y| {
        let square = |lo, hi| (lo..hi).contains(&x) && (lo..hi).contains(&y);
        let ring = square(2, 9) && !square(4, 7);
        let dot = x == 12 && y == 5;
        image::Luma([if ring || dot { 230 } else { 20 }])
    });
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::L8,
    )
    .unwrap();
    buf
}

#[test]
fn traced_borders_become_paths() {
    let result = gridtrace_core::process(&ring_and_dot_png(), &TraceConfig::default())
        .expect("trace should succeed");
    assert_eq!(result.contours.len(), 3);

    let metadata = SvgMetadata {
        title: Some("ring-and-dot"),
        description: Some("threshold=127"),
    };
    let svg = to_svg(&result.contours, result.dimensions, &metadata);

    assert!(svg.contains(r#"viewBox="0 0 16 12""#));
    assert!(svg.contains("<title>ring-and-dot</title>"));
    assert_eq!(svg.matches("<path").count(), 3);
    assert!(svg.contains(r#"d="M12,5"#));
    assert!(svg.trim_end().ends_with("</svg>"));
}
