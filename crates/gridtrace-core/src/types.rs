//! Shared types for the gridtrace engine.

use serde::{Deserialize, Serialize};

use crate::contour::TracerKind;
use crate::geometry::PixelPoint;
use crate::grid::ReduceDirection;
use crate::region::PatternKind;
use crate::seed::SeederKind;

/// Re-export `GrayImage` so downstream crates can hand raster data to
/// the tracer without depending on `image` directly.
pub use image::GrayImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// A closed border: an ordered ring of pixel coordinates.
///
/// The first point follows the last. A single-pixel contour has one
/// point; a border that passes through a pixel twice (a one-pixel-wide
/// line, for example) repeats that pixel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contour(Vec<PixelPoint>);

impl Contour {
    /// Create a contour from its ordered points.
    #[must_use]
    pub const fn new(points: Vec<PixelPoint>) -> Self {
        Self(points)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of points in the contour.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[PixelPoint] {
        &self.0
    }

    /// Consumes the contour and returns its points.
    #[must_use]
    pub fn into_points(self) -> Vec<PixelPoint> {
        self.0
    }

    /// The same ring rotated to start at its smallest point.
    ///
    /// Two contours describe the same border iff their normalized forms
    /// are equal. When the smallest point occurs more than once, the
    /// rotation that yields the lexicographically smallest sequence wins.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let Some(&min) = self.0.iter().min() else {
            return Self(Vec::new());
        };
        let n = self.0.len();
        let rotated = |start: usize| self.0[start..].iter().chain(&self.0[..start]);
        let best = (0..n)
            .filter(|&i| self.0[i] == min)
            .min_by(|&a, &b| rotated(a).cmp(rotated(b)))
            .unwrap_or(0);
        Self(rotated(best).copied().collect())
    }
}

/// Result of tracing one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceResult {
    /// Every closed border found, outer borders and hole borders alike.
    pub contours: Vec<Contour>,
    /// Dimensions of the traced image in pixels.
    pub dimensions: Dimensions,
}

impl TraceResult {
    /// Total points across all contours.
    #[must_use]
    pub fn total_points(&self) -> usize {
        self.contours.iter().map(Contour::len).sum()
    }

    /// All contours normalized and sorted, for order-insensitive comparison.
    #[must_use]
    pub fn canonical_contours(&self) -> Vec<Contour> {
        let mut contours: Vec<Contour> = self.contours.iter().map(Contour::normalized).collect();
        contours.sort_by(|a, b| a.points().cmp(b.points()));
        contours
    }
}

/// Configuration for a trace.
///
/// All parameters have defaults matching the densest 1x1 seeding
/// pattern. Use [`validate`](Self::validate) before running a trace
/// with hand-built values; the entry points call it for you.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Luma values strictly above this are foreground.
    pub threshold: u8,

    /// Swap foreground and background after thresholding.
    pub invert: bool,

    /// Seeding core: how many pixels each initial grid cell covers.
    pub pattern: PatternKind,

    /// Buffer slots reserved per pixel.
    ///
    /// Must be at least [`PatternKind::min_density`] of `pattern`.
    /// Larger values waste memory but do not change the result.
    pub density: u32,

    /// Axis of the first reduction pass.
    pub start_direction: ReduceDirection,

    /// How initial fragments are produced for each pixel.
    pub seeder: SeederKind,

    /// Which contour tracing algorithm to use.
    pub tracer: TracerKind,

    /// Worker pool size. `0` uses one worker per available core.
    pub threads: usize,
}

impl TraceConfig {
    /// Default luma threshold.
    pub const DEFAULT_THRESHOLD: u8 = 127;
    /// Default buffer slots per pixel; enough for every pattern.
    pub const DEFAULT_DENSITY: u32 = PatternKind::W1H1.min_density();
    /// Default first reduction axis.
    pub const DEFAULT_START_DIRECTION: ReduceDirection = ReduceDirection::Vertical;
    /// Default worker count (automatic).
    pub const DEFAULT_THREADS: usize = 0;

    /// Check invariants that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvalidConfig`] if `density` is too small
    /// for the densest cell of `pattern`.
    pub fn validate(&self) -> Result<(), TraceError> {
        let min = self.pattern.min_density();
        if self.density < min {
            return Err(TraceError::InvalidConfig(format!(
                "density {} is below the {min} fragments per pixel a {} core can seed",
                self.density, self.pattern
            )));
        }
        Ok(())
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            invert: false,
            pattern: PatternKind::default(),
            density: Self::DEFAULT_DENSITY,
            start_direction: Self::DEFAULT_START_DIRECTION,
            seeder: SeederKind::default(),
            tracer: TracerKind::default(),
            threads: Self::DEFAULT_THREADS,
        }
    }
}

/// Errors that can occur while tracing.
///
/// None of these are retried: tracing is deterministic, so a failure
/// recurs identically for the same input.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The image has zero width or height.
    #[error("image has no pixels")]
    EmptyImage,

    /// Configuration is invalid.
    #[error("invalid trace configuration: {0}")]
    InvalidConfig(String),

    /// A buffer's backing store could not be reserved.
    #[error("failed to allocate {count} {what}")]
    AllocationFailure {
        /// What was being allocated.
        what: &'static str,
        /// Number of elements requested.
        count: usize,
    },

    /// Fragment data contradicts the border geometry.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An offset or range falls outside its buffer or overlaps another.
    #[error("offset {offset} out of range for buffer of length {len}")]
    BoundsDefect {
        /// Offending offset.
        offset: usize,
        /// Length of the buffer (or bound) it was checked against.
        len: usize,
    },

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Serde-compatible proxy for `TraceError`.
#[derive(Serialize, Deserialize)]
enum TraceErrorProxy {
    ImageDecode(String),
    EmptyInput,
    EmptyImage,
    InvalidConfig(String),
    AllocationFailure { what: String, count: usize },
    InvariantViolation(String),
    BoundsDefect { offset: usize, len: usize },
    ThreadPool(String),
}

impl Serialize for TraceError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => TraceErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => TraceErrorProxy::EmptyInput,
            Self::EmptyImage => TraceErrorProxy::EmptyImage,
            Self::InvalidConfig(s) => TraceErrorProxy::InvalidConfig(s.clone()),
            Self::AllocationFailure { what, count } => TraceErrorProxy::AllocationFailure {
                what: (*what).to_string(),
                count: *count,
            },
            Self::InvariantViolation(s) => TraceErrorProxy::InvariantViolation(s.clone()),
            Self::BoundsDefect { offset, len } => TraceErrorProxy::BoundsDefect {
                offset: *offset,
                len: *len,
            },
            Self::ThreadPool(s) => TraceErrorProxy::ThreadPool(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TraceError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = TraceErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image error cannot be rebuilt; keep its message.
            TraceErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            TraceErrorProxy::EmptyInput => Self::EmptyInput,
            TraceErrorProxy::EmptyImage => Self::EmptyImage,
            TraceErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            // Allocation labels are static, so a deserialized label is not preserved.
            TraceErrorProxy::AllocationFailure { count, .. } => Self::AllocationFailure {
                what: "elements",
                count,
            },
            TraceErrorProxy::InvariantViolation(s) => Self::InvariantViolation(s),
            TraceErrorProxy::BoundsDefect { offset, len } => Self::BoundsDefect { offset, len },
            TraceErrorProxy::ThreadPool(s) => Self::ThreadPool(s),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pts(coords: &[(i32, i32)]) -> Vec<PixelPoint> {
        coords.iter().map(|&(x, y)| PixelPoint::new(x, y)).collect()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(TraceConfig::default().validate().is_ok());
    }

    #[test]
    fn low_density_is_rejected() {
        let config = TraceConfig {
            density: 3,
            ..TraceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TraceError::InvalidConfig(_))
        ));
    }

    #[test]
    fn density_floor_follows_the_pattern() {
        let wide = TraceConfig {
            pattern: PatternKind::W2H1,
            density: 3,
            ..TraceConfig::default()
        };
        assert!(wide.validate().is_ok());
        let square = TraceConfig {
            pattern: PatternKind::W2H2,
            density: 2,
            ..TraceConfig::default()
        };
        assert!(square.validate().is_ok());
        let cramped = TraceConfig {
            density: 2,
            ..wide
        };
        let err = cramped.validate().unwrap_err();
        assert!(err.to_string().contains("2x1"), "{err}");
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = TraceConfig {
            threshold: 10,
            invert: true,
            pattern: PatternKind::W2H2,
            density: 6,
            start_direction: ReduceDirection::Horizontal,
            seeder: SeederKind::Kernel,
            tracer: TracerKind::BorderFollowing,
            threads: 3,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: TraceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn partial_config_json_fills_defaults() {
        let config: TraceConfig = serde_json::from_str(r#"{"density": 8}"#).unwrap();
        assert_eq!(config.density, 8);
        assert_eq!(config.threshold, TraceConfig::DEFAULT_THRESHOLD);
    }

    #[test]
    fn normalized_rotates_to_smallest_point() {
        let c = Contour::new(pts(&[(2, 0), (1, 1), (0, 1), (1, 0)]));
        assert_eq!(
            c.normalized().points(),
            pts(&[(0, 1), (1, 0), (2, 0), (1, 1)]).as_slice()
        );
    }

    #[test]
    fn rotations_normalize_equal() {
        // A one-pixel-wide line visits its middle pixel twice.
        let a = Contour::new(pts(&[(1, 0), (2, 0), (1, 0), (0, 0)]));
        let b = Contour::new(pts(&[(2, 0), (1, 0), (0, 0), (1, 0)]));
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn normalized_breaks_ties_on_repeated_minimum() {
        let c = Contour::new(pts(&[(0, 0), (1, 0), (0, 0), (0, 1)]));
        assert_eq!(
            c.normalized().points(),
            pts(&[(0, 0), (0, 1), (0, 0), (1, 0)]).as_slice()
        );
    }

    #[test]
    fn normalized_empty_is_empty() {
        assert!(Contour::new(Vec::new()).normalized().is_empty());
    }

    #[test]
    fn error_display_messages() {
        let err = TraceError::BoundsDefect { offset: 10, len: 4 };
        assert_eq!(err.to_string(), "offset 10 out of range for buffer of length 4");
        let err = TraceError::InvariantViolation("two tails match".to_string());
        assert!(err.to_string().contains("two tails match"));
    }

    #[test]
    fn error_round_trips_through_json() {
        let err = TraceError::BoundsDefect { offset: 7, len: 3 };
        let json = serde_json::to_string(&err).unwrap();
        let back: TraceError = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, TraceError::BoundsDefect { offset: 7, len: 3 }));
    }
}
