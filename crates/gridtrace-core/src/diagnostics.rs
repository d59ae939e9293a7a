//! Trace diagnostics: timing and counts for every stage and every
//! reduction step.
//!
//! Timing goes through the [`Clock`] trait so this crate stays free of
//! platform time sources; callers supply their own clock.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::contour::{ContourTracer, TracerKind, trace_grid};
use crate::grid::StepStats;
use crate::seed::BinaryImage;
use crate::types::{Contour, Dimensions, TraceConfig, TraceError, TraceResult};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A monotonic time source.
pub trait Clock {
    /// A point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceDiagnostics {
    /// Image decoding (only for the byte-level entry point).
    pub decode: Option<StageDiagnostics>,
    /// Thresholding into a foreground mask.
    pub binarize: StageDiagnostics,
    /// Initial fragment seeding (grid tracer only).
    pub seeding: Option<StageDiagnostics>,
    /// One entry per reduction step (grid tracer only).
    pub steps: Vec<StepDiagnostics>,
    /// Contour extraction, or the whole reference trace.
    pub tracing: StageDiagnostics,
    /// Total wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    pub summary: TraceSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub metrics: StageMetrics,
}

/// Diagnostics for one reduction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDiagnostics {
    /// Wall-clock duration of this step (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub stats: StepStats,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        width: u32,
        height: u32,
    },
    Binarize {
        threshold: u8,
        invert: bool,
        /// Pixels classified as foreground.
        foreground_pixels: usize,
        /// Total pixel count.
        pixel_count: usize,
    },
    Seeding {
        /// Which seeder produced the triads.
        seeder: String,
        /// Seeding core, e.g. `2x1`.
        pattern: String,
        /// Slots reserved per pixel.
        density: u32,
        /// Slots in each buffer generation.
        buffer_slots: usize,
        /// Runs seeded.
        runs: usize,
        /// Points seeded.
        points: usize,
    },
    Tracing {
        /// Which tracer produced the contours.
        tracer: String,
        contour_count: usize,
        total_point_count: usize,
        min_contour_points: usize,
        max_contour_points: usize,
        mean_contour_points: f64,
    },
}

/// High-level summary counts for a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSummary {
    pub image_width: u32,
    pub image_height: u32,
    pub foreground_pixels: usize,
    pub contour_count: usize,
    pub total_points: usize,
    /// Reduction steps taken (zero for the reference tracer).
    pub step_count: usize,
}

impl TraceDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Trace Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} foreground pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.foreground_pixels,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let percent = |d: Duration| {
            if total_ms > 0.0 {
                duration_ms(d) / total_ms * 100.0
            } else {
                0.0
            }
        };

        let mut stages: Vec<(String, Duration, String)> = Vec::new();
        if let Some(ref decode) = self.decode {
            stages.push(("Decode".to_string(), decode.duration, format_metrics(&decode.metrics)));
        }
        stages.push((
            "Binarize".to_string(),
            self.binarize.duration,
            format_metrics(&self.binarize.metrics),
        ));
        if let Some(ref seeding) = self.seeding {
            stages.push(("Seeding".to_string(), seeding.duration, format_metrics(&seeding.metrics)));
        }
        for (i, step) in self.steps.iter().enumerate() {
            stages.push((
                format!("Step {} ({})", i + 1, step.stats.direction),
                step.duration,
                format_step(&step.stats),
            ));
        }
        stages.push((
            "Tracing".to_string(),
            self.tracing.duration,
            format_metrics(&self.tracing.metrics),
        ));

        for (name, duration, details) in &stages {
            let ms = duration_ms(*duration);
            let pct = percent(*duration);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Contours: {}  |  Points: {}  |  Steps: {}",
            self.summary.contour_count, self.summary.total_points, self.summary.step_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_step(stats: &StepStats) -> String {
    format!(
        "{} -> {} regions, {} merged, {} carried, {} runs, {} pts",
        stats.before, stats.after, stats.pairs_merged, stats.pass_throughs, stats.runs, stats.points,
    )
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Binarize {
            threshold,
            invert,
            foreground_pixels,
            pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let fill = if *pixel_count > 0 {
                *foreground_pixels as f64 / *pixel_count as f64 * 100.0
            } else {
                0.0
            };
            let inv = if *invert { " inverted" } else { "" };
            format!("threshold={threshold}{inv} foreground={foreground_pixels} ({fill:.1}%)")
        }
        StageMetrics::Seeding {
            seeder,
            pattern,
            density,
            buffer_slots,
            runs,
            points,
        } => format!(
            "{seeder} core={pattern} density={density} slots={buffer_slots} runs={runs} pts={points}"
        ),
        StageMetrics::Tracing {
            tracer,
            contour_count,
            total_point_count,
            min_contour_points,
            max_contour_points,
            mean_contour_points,
        } => format!(
            "{tracer} {contour_count} contours, {total_point_count} pts (min={min_contour_points} max={max_contour_points} mean={mean_contour_points:.1})",
        ),
    }
}

/// Statistics for a set of contours.
struct ContourStats {
    total: usize,
    min: usize,
    max: usize,
    mean: f64,
}

fn contour_stats(contours: &[Contour]) -> ContourStats {
    let total: usize = contours.iter().map(Contour::len).sum();
    let min = contours.iter().map(Contour::len).min().unwrap_or(0);
    let max = contours.iter().map(Contour::len).max().unwrap_or(0);
    #[allow(clippy::cast_precision_loss)]
    let mean = if contours.is_empty() {
        0.0
    } else {
        total as f64 / contours.len() as f64
    };
    ContourStats {
        total,
        min,
        max,
        mean,
    }
}

/// Trace `gray`, collecting diagnostics for every stage.
///
/// # Errors
///
/// Returns the same errors as [`trace_image`](crate::trace_image).
pub fn trace_with_diagnostics<C: Clock>(
    gray: &GrayImage,
    config: &TraceConfig,
    clock: &C,
) -> Result<(TraceResult, TraceDiagnostics), TraceError> {
    trace_timed(gray, config, clock, clock.now(), None)
}

/// Decode and trace `image_bytes`, collecting diagnostics for every stage.
///
/// # Errors
///
/// Returns the same errors as [`process`](crate::process).
pub fn process_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &TraceConfig,
    clock: &C,
) -> Result<(TraceResult, TraceDiagnostics), TraceError> {
    let total_start = clock.now();

    let start = clock.now();
    let gray = crate::decode_grayscale(image_bytes)?;
    let decode = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Decode {
            input_bytes: image_bytes.len(),
            width: gray.width(),
            height: gray.height(),
        },
    };

    trace_timed(&gray, config, clock, total_start, Some(decode))
}

fn trace_timed<C: Clock>(
    gray: &GrayImage,
    config: &TraceConfig,
    clock: &C,
    total_start: C::Instant,
    decode: Option<StageDiagnostics>,
) -> Result<(TraceResult, TraceDiagnostics), TraceError> {
    config.validate()?;
    if gray.width() == 0 || gray.height() == 0 {
        return Err(TraceError::EmptyImage);
    }

    let start = clock.now();
    let binary = BinaryImage::from_gray(gray, config.threshold, config.invert);
    let foreground_pixels = binary.foreground_count();
    let binarize = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Binarize {
            threshold: config.threshold,
            invert: config.invert,
            foreground_pixels,
            pixel_count: binary.size().area(),
        },
    };
    if foreground_pixels == 0 {
        log::warn!("image has no foreground pixels at threshold {}", config.threshold);
    }

    let (contours, seeding, steps, tracing_duration) = match config.tracer {
        TracerKind::Grid => {
            let traced = trace_grid(&binary, config, clock)?;
            (traced.contours, Some(traced.seeding), traced.steps, traced.extraction)
        }
        TracerKind::BorderFollowing => {
            let start = clock.now();
            let contours = TracerKind::BorderFollowing.trace(&binary, config)?;
            (contours, None, Vec::new(), clock.elapsed(&start))
        }
    };

    let stats = contour_stats(&contours);
    let tracing = StageDiagnostics {
        duration: tracing_duration,
        metrics: StageMetrics::Tracing {
            tracer: format!("{:?}", config.tracer),
            contour_count: contours.len(),
            total_point_count: stats.total,
            min_contour_points: stats.min,
            max_contour_points: stats.max,
            mean_contour_points: stats.mean,
        },
    };

    let dimensions = Dimensions {
        width: gray.width(),
        height: gray.height(),
    };
    let summary = TraceSummary {
        image_width: dimensions.width,
        image_height: dimensions.height,
        foreground_pixels,
        contour_count: contours.len(),
        total_points: stats.total,
        step_count: steps.len(),
    };
    log::info!(
        "traced {} contours ({} points) in a {}x{} image",
        contours.len(),
        stats.total,
        dimensions.width,
        dimensions.height
    );

    let diagnostics = TraceDiagnostics {
        decode,
        binarize,
        seeding,
        steps,
        tracing,
        total_duration: clock.elapsed(&total_start),
        summary,
    };
    Ok((
        TraceResult {
            contours,
            dimensions,
        },
        diagnostics,
    ))
}
