//! Contour tracing strategies.
//!
//! [`TracerKind::Grid`] is the parallel grid-merge engine in this crate.
//! [`TracerKind::BorderFollowing`] is the classical sequential
//! Suzuki-Abe border follower from `imageproc`, kept as a reference to
//! compare output and timing against.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Clock, StageDiagnostics, StageMetrics, StepDiagnostics};
use crate::geometry::PixelPoint;
use crate::grid::{Buffers, Grid, worker_pool};
use crate::seed::{BinaryImage, seed};
use crate::types::{Contour, TraceConfig, TraceError};

/// Selects which contour tracing algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TracerKind {
    /// Seed per-pixel fragments, then merge grid cells until one remains.
    #[default]
    Grid,
    /// Suzuki-Abe border following via `imageproc::contours::find_contours`.
    BorderFollowing,
}

/// Trait for contour tracing strategies.
///
/// Input: a foreground mask. Output: every closed border, outer borders
/// and hole borders alike.
pub trait ContourTracer {
    /// Trace all borders in `image`.
    ///
    /// # Errors
    ///
    /// Returns a [`TraceError`] if the image is empty, the configuration
    /// is unusable, or the tracer detects inconsistent fragment data.
    fn trace(&self, image: &BinaryImage, config: &TraceConfig) -> Result<Vec<Contour>, TraceError>;
}

impl ContourTracer for TracerKind {
    fn trace(&self, image: &BinaryImage, config: &TraceConfig) -> Result<Vec<Contour>, TraceError> {
        match *self {
            Self::Grid => trace_grid(image, config, &NoClock).map(|traced| traced.contours),
            Self::BorderFollowing => trace_border_following(image),
        }
    }
}

/// Output of a grid trace with its per-stage timings.
pub(crate) struct GridTrace {
    pub contours: Vec<Contour>,
    pub seeding: StageDiagnostics,
    pub steps: Vec<StepDiagnostics>,
    pub extraction: Duration,
}

/// Seed, reduce and extract, timing each stage with `clock`.
pub(crate) fn trace_grid<C: Clock>(
    image: &BinaryImage,
    config: &TraceConfig,
    clock: &C,
) -> Result<GridTrace, TraceError> {
    config.validate()?;
    let pool = worker_pool(config.threads)?;
    let pattern = config.pattern.with_density(config.density);

    let start = clock.now();
    let seeded = seed(image, &config.seeder, pattern, &pool)?;
    let (mut buffers, regions) = Buffers::new(seeded)?;
    let mut grid = Grid::new(image.size(), pattern, regions, config.start_direction, &buffers)?;
    let seeding = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Seeding {
            seeder: format!("{:?}", config.seeder),
            pattern: config.pattern.to_string(),
            density: pattern.density,
            buffer_slots: buffers.runs.len(),
            runs: grid.regions().iter().flatten().map(|r| r.runs_count as usize).sum(),
            points: grid.total_points(),
        },
    };

    let mut steps = Vec::new();
    loop {
        let start = clock.now();
        let Some(stats) = grid.next_step(&mut buffers, &pool)? else {
            break;
        };
        steps.push(StepDiagnostics {
            duration: clock.elapsed(&start),
            stats,
        });
    }

    let start = clock.now();
    let contours = grid.contours(&buffers)?;
    Ok(GridTrace {
        contours,
        seeding,
        steps,
        extraction: clock.elapsed(&start),
    })
}

/// Suzuki-Abe border following via `imageproc::contours::find_contours`.
fn trace_border_following(image: &BinaryImage) -> Result<Vec<Contour>, TraceError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(TraceError::EmptyImage);
    }
    let contours: Vec<imageproc::contours::Contour<i32>> =
        imageproc::contours::find_contours(&image.to_gray());

    Ok(contours
        .into_iter()
        .map(|c| {
            let points = c
                .points
                .into_iter()
                .map(|p| PixelPoint::new(p.x, p.y))
                .collect();
            Contour::new(points)
        })
        .collect())
}

/// A clock that never advances, for untimed traces.
struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}
