//! SVG export serializer.
//!
//! Converts traced contours into an SVG string with one `<path>` element
//! per border, using the [`svg`] crate for document construction, XML
//! escaping, and path data formatting.
//!
//! Contours are closed rings, so each path is `M`, then `L` for every
//! further point, then a close command. Coordinates are pixel indices,
//! and the `viewBox` matches the source image so the drawing overlays it.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Path, Title};
use svg::node::{Text, Value};

use gridtrace_core::{Contour, Dimensions, PixelPoint};

/// Metadata to embed in the SVG document.
///
/// Both fields are optional. When present, a `<title>` and/or `<desc>`
/// element is emitted immediately after the opening `<svg>` tag.
///
/// Text values are XML-escaped automatically by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    ///
    /// Typically the source image filename (without extension).
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    ///
    /// Typically the trace parameters so exported files are
    /// distinguishable.
    pub description: Option<&'a str>,
}

/// Build an SVG path `d` attribute string from a contour.
///
/// Uses `M` for the first point, `L` for the rest, and closes the ring.
/// A single-point contour becomes a zero-length closed path, which
/// renders as a dot with round caps. Returns an empty string for an
/// empty contour.
///
/// # Examples
///
/// ```
/// use gridtrace_core::{Contour, PixelPoint};
/// use gridtrace_export::build_path_data;
///
/// let contour = Contour::new(vec![PixelPoint::new(1, 2), PixelPoint::new(2, 2)]);
/// let d = build_path_data(&contour);
/// assert!(d.starts_with("M1,2 L2,2"));
/// ```
#[must_use]
pub fn build_path_data(contour: &Contour) -> String {
    let Some((first, rest)) = contour.points().split_first() else {
        return String::new();
    };

    let coords = |p: &PixelPoint| (f64::from(p.x), f64::from(p.y));
    let mut data = Data::new().move_to(coords(first));
    for p in rest {
        data = data.line_to(coords(p));
    }
    String::from(Value::from(data.close()))
}

/// Serialize contours into an SVG document string.
///
/// Each non-empty [`Contour`] becomes a `<path>` element. The `viewBox`
/// is `0 0 width height` from [`Dimensions`], so the SVG coordinate
/// space matches the source image pixel grid.
///
/// # Examples
///
/// ```
/// use gridtrace_core::{Contour, Dimensions, PixelPoint};
/// use gridtrace_export::{SvgMetadata, to_svg};
///
/// let contours = vec![Contour::new(vec![PixelPoint::new(10, 15), PixelPoint::new(11, 15)])];
/// let dims = Dimensions { width: 800, height: 600 };
/// let metadata = SvgMetadata {
///     title: Some("blobs"),
///     description: Some("threshold=127"),
/// };
/// let svg = to_svg(&contours, dims, &metadata);
/// assert!(svg.contains("<title>blobs</title>"));
/// assert!(svg.contains("<desc>threshold=127</desc>"));
/// assert!(svg.contains("M10,15 L11,15"));
/// ```
#[must_use]
pub fn to_svg(contours: &[Contour], dimensions: Dimensions, metadata: &SvgMetadata<'_>) -> String {
    let w = dimensions.width;
    let h = dimensions.height;
    let mut doc = Document::new()
        .set("width", w)
        .set("height", h)
        .set("viewBox", (0, 0, w, h));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    for contour in contours {
        let d = build_path_data(contour);
        if d.is_empty() {
            continue;
        }
        let path = Path::new()
            .set("d", d)
            .set("fill", "none")
            .set("stroke", "black")
            .set("stroke-width", 1)
            .set("stroke-linecap", "round")
            .set("stroke-linejoin", "round");
        doc = doc.add(path);
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
