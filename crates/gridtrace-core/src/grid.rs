//! The reduction driver.
//!
//! A [`Grid`] starts with one region per seeded core and halves its region
//! count along one axis per step, alternating axes, until a single
//! region covers the image. Each step:
//!
//! 1. pairs up neighbouring regions along the active axis (a trailing
//!    region with no partner is carried through unchanged),
//! 2. runs every merge concurrently, each writing its own disjoint span
//!    of the destination run buffer,
//! 3. records the relocations and bulk-copies the points,
//! 4. compacts the region array and doubles the cell along the axis,
//! 5. flips both buffers and the axis.
//!
//! The total number of points never changes; this is checked after
//! every step.

use std::fmt;
use std::ops::Range;

use rayon::ThreadPool;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buffer::{DoubleBuffer, blit, carve};
use crate::combine::{Combiner, Merged};
use crate::geometry::{PixelPoint, PixelSize};
use crate::region::{PatternSize, Region};
use crate::run::Run;
use crate::seed::Seeded;
use crate::types::{Contour, TraceError};

/// Axis a reduction step merges along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReduceDirection {
    /// Merge column pairs; cells double in width.
    Horizontal,
    /// Merge row pairs; cells double in height.
    #[default]
    Vertical,
}

impl ReduceDirection {
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Horizontal => Self::Vertical,
            Self::Vertical => Self::Horizontal,
        }
    }

    /// `cell` doubled along this axis.
    #[must_use]
    pub const fn grow(self, cell: PixelSize) -> PixelSize {
        match self {
            Self::Horizontal => PixelSize::new(cell.width * 2, cell.height),
            Self::Vertical => PixelSize::new(cell.width, cell.height * 2),
        }
    }
}

impl fmt::Display for ReduceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Horizontal => f.write_str("horizontal"),
            Self::Vertical => f.write_str("vertical"),
        }
    }
}

/// Rows and columns of the region array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// What one reduction step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    pub direction: ReduceDirection,
    pub before: GridShape,
    pub after: GridShape,
    /// Region pairs joined by the combiner.
    pub pairs_merged: usize,
    /// Partnerless regions carried through.
    pub pass_throughs: usize,
    /// Live runs after the step.
    pub runs: usize,
    /// Points covered by those runs.
    pub points: usize,
}

/// Point and run storage for a whole trace.
#[derive(Debug)]
pub struct Buffers {
    pub points: DoubleBuffer<PixelPoint>,
    pub runs: DoubleBuffer<Run>,
}

impl Buffers {
    /// Wrap seeded buffers, allocating their second generations.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::AllocationFailure`] if a generation cannot
    /// be allocated.
    pub fn new(seeded: Seeded) -> Result<(Self, Vec<Vec<Region>>), TraceError> {
        let buffers = Self {
            points: DoubleBuffer::new(seeded.points)?,
            runs: DoubleBuffer::new(seeded.runs)?,
        };
        Ok((buffers, seeded.regions))
    }
}

/// One unit of work in a step.
#[derive(Debug, Clone, Copy)]
enum Job {
    Merge {
        slot: (usize, usize),
        a: Region,
        b: Region,
    },
    PassThrough {
        slot: (usize, usize),
        region: Region,
    },
}

impl Job {
    const fn anchor(&self) -> &Region {
        match self {
            Self::Merge { a, .. } => a,
            Self::PassThrough { region, .. } => region,
        }
    }

    const fn slot(&self) -> (usize, usize) {
        match *self {
            Self::Merge { slot, .. } | Self::PassThrough { slot, .. } => slot,
        }
    }

    fn run(&self, combiner: &Combiner<'_>, dst: &mut [Run]) -> Result<Merged, TraceError> {
        match self {
            Self::Merge { a, b, .. } => combiner.merge(a, b, dst),
            Self::PassThrough { region, .. } => combiner.pass_through(region, dst),
        }
    }
}

/// The region array and the cell size that addresses it.
#[derive(Debug, Clone)]
pub struct Grid {
    image: PixelSize,
    cell: PixelSize,
    pattern: PatternSize,
    /// `regions[row][col]`.
    regions: Vec<Vec<Region>>,
    direction: ReduceDirection,
    total_points: usize,
}

impl Grid {
    /// A grid of freshly seeded regions, one per pattern core, over
    /// `buffers`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvalidConfig`] if the pattern is unsupported
    /// or the region array does not have one region per core, and
    /// [`TraceError::BoundsDefect`] if a region's runs fall outside the
    /// buffers.
    pub fn new(
        image: PixelSize,
        pattern: PatternSize,
        regions: Vec<Vec<Region>>,
        start: ReduceDirection,
        buffers: &Buffers,
    ) -> Result<Self, TraceError> {
        pattern.validate()?;
        let cores = pattern.cores(image);
        let rows_ok = regions.len() == cores.height as usize;
        let cols_ok = regions.iter().all(|row| row.len() == cores.width as usize);
        if image.area() == 0 || !rows_ok || !cols_ok {
            return Err(TraceError::InvalidConfig(format!(
                "region grid does not cover a {image} image"
            )));
        }
        if buffers.runs.len() < pattern.buffer_len(image) || buffers.points.len() < pattern.buffer_len(image) {
            return Err(TraceError::BoundsDefect {
                offset: pattern.buffer_len(image),
                len: buffers.runs.len().min(buffers.points.len()),
            });
        }

        let mut grid = Self {
            image,
            cell: pattern.core,
            pattern,
            regions,
            direction: start,
            total_points: 0,
        };
        grid.total_points = grid.count_points(buffers.runs.src())?;
        Ok(grid)
    }

    #[must_use]
    pub fn shape(&self) -> GridShape {
        GridShape {
            rows: self.regions.len(),
            cols: self.regions.first().map_or(0, Vec::len),
        }
    }

    #[must_use]
    pub const fn cell_size(&self) -> PixelSize {
        self.cell
    }

    #[must_use]
    pub const fn direction(&self) -> ReduceDirection {
        self.direction
    }

    #[must_use]
    pub fn regions(&self) -> &[Vec<Region>] {
        &self.regions
    }

    /// Points covered by all runs; constant across steps.
    #[must_use]
    pub const fn total_points(&self) -> usize {
        self.total_points
    }

    /// Whether a single region remains.
    #[must_use]
    pub fn is_reduced(&self) -> bool {
        self.shape() == GridShape { rows: 1, cols: 1 }
    }

    /// Run the next step that merges anything.
    ///
    /// An axis already down to one cell is skipped. Returns `None` once
    /// the grid is fully reduced.
    ///
    /// # Errors
    ///
    /// Any error aborts the trace; the buffers are left mid-step.
    pub fn next_step(
        &mut self,
        buffers: &mut Buffers,
        pool: &ThreadPool,
    ) -> Result<Option<StepStats>, TraceError> {
        if self.is_reduced() {
            return Ok(None);
        }
        if self.axis_len(self.direction) == 1 {
            self.direction = self.direction.flip();
        }
        self.step(buffers, pool).map(Some)
    }

    /// Reduce to a single region.
    ///
    /// # Errors
    ///
    /// See [`step`](Self::step).
    pub fn reduce(
        &mut self,
        buffers: &mut Buffers,
        pool: &ThreadPool,
    ) -> Result<Vec<StepStats>, TraceError> {
        let mut steps = Vec::new();
        while let Some(stats) = self.next_step(buffers, pool)? {
            steps.push(stats);
        }
        Ok(steps)
    }

    /// Merge along the current axis once, then flip the axis.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvariantViolation`] if a merge finds an
    /// ambiguous or half-closed chain or the point total changes, and
    /// [`TraceError::BoundsDefect`] if any computed range leaves its
    /// buffer or two destination ranges overlap.
    pub fn step(&mut self, buffers: &mut Buffers, pool: &ThreadPool) -> Result<StepStats, TraceError> {
        let direction = self.direction;
        let before = self.shape();
        let new_cell = direction.grow(self.cell);

        let jobs = self.jobs();
        let combiner_len = buffers.runs.len();
        let mut planned = jobs
            .into_iter()
            .map(|job| {
                let span = self.target_span(&job, new_cell, combiner_len)?;
                Ok((job, span))
            })
            .collect::<Result<Vec<(Job, Range<usize>)>, TraceError>>()?;
        planned.sort_unstable_by_key(|(_, span)| span.start);
        let spans: Vec<Range<usize>> = planned.iter().map(|(_, span)| span.clone()).collect();

        let (src_runs, dst_runs) = buffers.runs.split();
        let outcomes = {
            let combiner = Combiner {
                image: self.image,
                cell: self.cell,
                new_cell,
                pattern: self.pattern,
                direction,
                src_points: buffers.points.src(),
                src_runs: &*src_runs,
            };
            let targets = carve(dst_runs, &spans)?;
            pool.install(|| {
                planned
                    .par_iter()
                    .zip(targets.into_par_iter())
                    .map(|((job, _), dst)| -> Result<_, TraceError> {
                        Ok((job.slot(), job.run(&combiner, dst)?))
                    })
                    .collect::<Result<Vec<_>, TraceError>>()
            })?
        };

        let mut copies = Vec::new();
        let mut points = 0;
        let mut runs = 0;
        for ((row, col), merged) in &outcomes {
            for relocation in &merged.relocations {
                let len = src_runs.len();
                let run = src_runs.get_mut(relocation.run).ok_or(TraceError::BoundsDefect {
                    offset: relocation.run,
                    len,
                })?;
                run.new_tail = relocation.new_tail;
                run.new_head = relocation.new_head;
                copies.push(relocation.run);
            }
            points += merged.points;
            runs += merged.region.runs_count as usize;
            let slot = self
                .regions
                .get_mut(*row)
                .and_then(|r| r.get_mut(*col))
                .ok_or(TraceError::BoundsDefect {
                    offset: *row,
                    len: before.rows,
                })?;
            *slot = merged.region;
        }

        if points != self.total_points {
            return Err(TraceError::InvariantViolation(format!(
                "{direction} step left {points} points, expected {}",
                self.total_points
            )));
        }

        let (src_points, dst_points) = buffers.points.split();
        pool.install(|| blit(&copies, &*src_runs, src_points, dst_points))?;

        self.compact(direction);
        self.cell = new_cell;
        self.direction = direction.flip();
        buffers.points.flip();
        buffers.runs.flip();

        let pairs_merged = planned
            .iter()
            .filter(|(job, _)| matches!(job, Job::Merge { .. }))
            .count();
        let stats = StepStats {
            direction,
            before,
            after: self.shape(),
            pairs_merged,
            pass_throughs: planned.len() - pairs_merged,
            runs,
            points,
        };
        log::debug!(
            "{direction} step: {} -> {} regions, {pairs_merged} merges, {} pass-throughs, {runs} runs, {points} points",
            stats.before,
            stats.after,
            stats.pass_throughs,
        );
        Ok(stats)
    }

    /// The closed contours of a fully reduced grid.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvariantViolation`] if the grid is not yet
    /// reduced or any surviving run is not closed.
    pub fn contours(&self, buffers: &Buffers) -> Result<Vec<Contour>, TraceError> {
        let Some(region) = self.regions.first().and_then(|row| row.first()).filter(|_| self.is_reduced()) else {
            return Err(TraceError::InvariantViolation(format!(
                "grid is {} regions, not fully reduced",
                self.shape()
            )));
        };

        let src_runs = buffers.runs.src();
        let src_points = buffers.points.src();
        let range = region.run_range(self.image, self.cell, &self.pattern, src_runs.len())?;
        src_runs
            .get(range)
            .unwrap_or_default()
            .iter()
            .map(|run| {
                if !run.is_closed()? {
                    return Err(TraceError::InvariantViolation(format!(
                        "run {run} is still open after reduction"
                    )));
                }
                let points = run.old_range()?;
                let end = points.end;
                src_points
                    .get(points)
                    .map(|p| Contour::new(p.to_vec()))
                    .ok_or(TraceError::BoundsDefect {
                        offset: end,
                        len: src_points.len(),
                    })
            })
            .collect()
    }

    fn axis_len(&self, direction: ReduceDirection) -> usize {
        let shape = self.shape();
        match direction {
            ReduceDirection::Horizontal => shape.cols,
            ReduceDirection::Vertical => shape.rows,
        }
    }

    fn jobs(&self) -> Vec<Job> {
        let shape = self.shape();
        let mut jobs = Vec::new();
        match self.direction {
            ReduceDirection::Horizontal => {
                for (row, regions) in self.regions.iter().enumerate() {
                    for (pair, chunk) in regions.chunks(2).enumerate() {
                        let slot = (row, pair * 2);
                        jobs.push(match *chunk {
                            [a, b] => Job::Merge { slot, a, b },
                            [region, ..] => Job::PassThrough { slot, region },
                            [] => continue,
                        });
                    }
                }
            }
            ReduceDirection::Vertical => {
                for (pair, rows) in self.regions.chunks(2).enumerate() {
                    for col in 0..shape.cols {
                        let slot = (pair * 2, col);
                        let job = match rows {
                            [top, bottom] => top
                                .get(col)
                                .zip(bottom.get(col))
                                .map(|(&a, &b)| Job::Merge { slot, a, b }),
                            [top, ..] => top
                                .get(col)
                                .map(|&region| Job::PassThrough { slot, region }),
                            [] => None,
                        };
                        jobs.extend(job);
                    }
                }
            }
        }
        jobs
    }

    fn target_span(&self, job: &Job, new_cell: PixelSize, len: usize) -> Result<Range<usize>, TraceError> {
        let anchor = job.anchor();
        let size = anchor.merged_size(self.image, new_cell, self.direction);
        let target = Region::new(size, anchor.halved_pos(self.direction), 0);
        target.span(self.image, new_cell, &self.pattern, len)
    }

    fn compact(&mut self, direction: ReduceDirection) {
        let halve = |r: &Region| Region {
            grid_pos: r.halved_pos(direction),
            ..*r
        };
        match direction {
            ReduceDirection::Horizontal => {
                for row in &mut self.regions {
                    *row = row.iter().step_by(2).map(halve).collect();
                }
            }
            ReduceDirection::Vertical => {
                self.regions = self
                    .regions
                    .iter()
                    .step_by(2)
                    .map(|row| row.iter().map(halve).collect())
                    .collect();
            }
        }
    }

    fn count_points(&self, runs: &[Run]) -> Result<usize, TraceError> {
        let mut total = 0;
        for region in self.regions.iter().flatten() {
            let range = region.run_range(self.image, self.cell, &self.pattern, runs.len())?;
            total += runs.get(range).unwrap_or_default().iter().map(Run::len).sum::<usize>();
        }
        Ok(total)
    }
}

/// Build the worker pool. `threads == 0` uses one worker per core.
///
/// # Errors
///
/// Returns [`TraceError::ThreadPool`] if the pool cannot be created.
pub fn worker_pool(threads: usize) -> Result<ThreadPool, TraceError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| TraceError::ThreadPool(e.to_string()))
}
