//! Grid cells and the addressing function that locates their data.
//!
//! A [`Region`] never stores where its runs and points live. Both are
//! found by [`base_offset`], which depends only on the image size, the
//! current cell size, the region's own size and its grid position. Runs
//! and points of a region share the same base; the region may use
//! `density * width * height` slots of each buffer from there.
//!
//! Merging two regions horizontally keeps the first region's base, and
//! the union of the two spans is exactly the merged span. A vertical
//! merge re-tiles its band of rows. Either way the merged spans of one
//! step are pairwise disjoint, which is what lets every merge write its
//! output without coordinating with any other merge in the same step.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::geometry::{GridPosition, PixelSize};
use crate::grid::ReduceDirection;
use crate::seed::MAX_TRIADS_PER_PIXEL;
use crate::types::TraceError;

/// The shipped seeding cores.
///
/// Every pixel is seeded on its own; a wider core then joins the
/// fragments of its pixels before the grid starts merging, so there are
/// fewer, longer runs to merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PatternKind {
    /// One pixel per cell.
    #[default]
    W1H1,
    /// Two pixels side by side.
    W2H1,
    /// A 2x2 block.
    W2H2,
    /// A 4x2 block.
    W4H2,
}

impl PatternKind {
    pub const ALL: [Self; 4] = [Self::W1H1, Self::W2H1, Self::W2H2, Self::W4H2];

    #[must_use]
    pub const fn core(self) -> PixelSize {
        match self {
            Self::W1H1 => PixelSize::new(1, 1),
            Self::W2H1 => PixelSize::new(2, 1),
            Self::W2H2 => PixelSize::new(2, 2),
            Self::W4H2 => PixelSize::new(4, 2),
        }
    }

    /// Smallest density that holds the densest cell of this core.
    ///
    /// A 1x1 cell seeds at most 4 triads, a 2x1 cell 6 and a 2x2 cell 8.
    /// A 4x2 cell is two 2x2 cells. Cells clipped at the image edge have
    /// background outside and never seed more per pixel than this.
    #[must_use]
    pub const fn min_density(self) -> u32 {
        match self {
            Self::W1H1 => MAX_TRIADS_PER_PIXEL,
            Self::W2H1 => 3,
            Self::W2H2 | Self::W4H2 => 2,
        }
    }

    /// The kind whose core is `core`, if one ships.
    #[must_use]
    pub fn from_core(core: PixelSize) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.core() == core)
    }

    /// This core with `density` slots per pixel.
    #[must_use]
    pub const fn with_density(self, density: u32) -> PatternSize {
        PatternSize {
            core: self.core(),
            density,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core();
        write!(f, "{}x{}", core.width, core.height)
    }
}

/// The seeding pattern: the smallest cell the grid starts from, and how
/// many buffer slots are reserved per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSize {
    /// Size of one seeded cell.
    pub core: PixelSize,
    /// Slots reserved per pixel in both the point and run buffers.
    pub density: u32,
}

impl PatternSize {
    pub const W1H1: Self = PatternKind::W1H1.with_density(PatternKind::W1H1.min_density());
    pub const W2H1: Self = PatternKind::W2H1.with_density(PatternKind::W2H1.min_density());
    pub const W2H2: Self = PatternKind::W2H2.with_density(PatternKind::W2H2.min_density());
    pub const W4H2: Self = PatternKind::W4H2.with_density(PatternKind::W4H2.min_density());

    /// The same core with `density` slots per pixel.
    #[must_use]
    pub const fn with_density(self, density: u32) -> Self {
        Self {
            core: self.core,
            density,
        }
    }

    /// Reject patterns the grid cannot address.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvalidConfig`] for a core that does not
    /// ship or a density too small to hold its densest cell.
    pub fn validate(&self) -> Result<(), TraceError> {
        let Some(kind) = PatternKind::from_core(self.core) else {
            return Err(TraceError::InvalidConfig(format!(
                "unsupported pattern core {}",
                self.core
            )));
        };
        if self.density < kind.min_density() {
            return Err(TraceError::InvalidConfig(format!(
                "pattern density {} is below {} for a {kind} core",
                self.density,
                kind.min_density()
            )));
        }
        Ok(())
    }

    /// Cores needed to cover `image`.
    #[must_use]
    pub const fn cores(&self, image: PixelSize) -> PixelSize {
        PixelSize::new(
            image.width.div_ceil(self.core.width),
            image.height.div_ceil(self.core.height),
        )
    }

    /// Image width rounded up to whole cores.
    #[must_use]
    pub const fn padded_width(&self, image: PixelSize) -> usize {
        self.cores(image).width as usize * self.core.width as usize
    }

    /// Slots needed in each buffer for an image of `image` pixels.
    #[must_use]
    pub const fn buffer_len(&self, image: PixelSize) -> usize {
        self.density as usize * self.padded_width(image) * image.height as usize
    }

    /// Slots available to a region of `size` pixels.
    #[must_use]
    pub const fn capacity(&self, size: PixelSize) -> usize {
        self.density as usize * size.area()
    }
}

impl Default for PatternSize {
    fn default() -> Self {
        Self::W1H1
    }
}

/// Offset of a region's first run and first point.
///
/// `density * (ceil(image.width / core.width) * core.width * cell.height * row
///             + cell.width * region.height * col)`
///
/// Each band of grid rows reserves the image width rounded up to whole
/// cores; for a 1x1 core that is the image width itself.
#[must_use]
pub const fn base_offset(
    image: PixelSize,
    cell: PixelSize,
    region: PixelSize,
    pos: GridPosition,
    pattern: &PatternSize,
) -> usize {
    let row_offset = pattern.padded_width(image) * cell.height as usize * pos.row as usize;
    let col_offset = cell.width as usize * region.height as usize * pos.col as usize;
    pattern.density as usize * (row_offset + col_offset)
}

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Pixel size, clipped at the image's right and bottom edges.
    pub size: PixelSize,
    /// Position in the current grid.
    pub grid_pos: GridPosition,
    /// Live runs starting at the region's base offset.
    pub runs_count: u32,
}

impl Region {
    #[must_use]
    pub const fn new(size: PixelSize, grid_pos: GridPosition, runs_count: u32) -> Self {
        Self {
            size,
            grid_pos,
            runs_count,
        }
    }

    /// This region's base offset in a grid of `cell`-sized cells.
    #[must_use]
    pub const fn base(&self, image: PixelSize, cell: PixelSize, pattern: &PatternSize) -> usize {
        base_offset(image, cell, self.size, self.grid_pos, pattern)
    }

    /// Every slot the region owns, checked against a buffer of `len`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::BoundsDefect`] if the span ends past `len`.
    pub fn span(
        &self,
        image: PixelSize,
        cell: PixelSize,
        pattern: &PatternSize,
        len: usize,
    ) -> Result<Range<usize>, TraceError> {
        let base = self.base(image, cell, pattern);
        checked(base, pattern.capacity(self.size), len)
    }

    /// Indices of the region's live runs, checked against a buffer of `len`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::BoundsDefect`] if the range ends past `len`,
    /// and [`TraceError::InvariantViolation`] if the region holds more
    /// runs than it has slots.
    pub fn run_range(
        &self,
        image: PixelSize,
        cell: PixelSize,
        pattern: &PatternSize,
        len: usize,
    ) -> Result<Range<usize>, TraceError> {
        let count = self.runs_count as usize;
        if count > pattern.capacity(self.size) {
            return Err(TraceError::InvariantViolation(format!(
                "region {self} holds {count} runs but has {} slots",
                pattern.capacity(self.size)
            )));
        }
        checked(self.base(image, cell, pattern), count, len)
    }

    /// Size of the region formed by merging this region with its partner
    /// along `direction`, in a grid whose cells are now `new_cell`.
    ///
    /// The last column (or row) is clipped to the image edge.
    #[must_use]
    pub const fn merged_size(
        &self,
        image: PixelSize,
        new_cell: PixelSize,
        direction: ReduceDirection,
    ) -> PixelSize {
        match direction {
            ReduceDirection::Horizontal => {
                let half = self.grid_pos.col / 2;
                let right = (half + 1) * new_cell.width;
                let width = if right > image.width {
                    image.width - half * new_cell.width
                } else {
                    new_cell.width
                };
                PixelSize::new(width, self.size.height)
            }
            ReduceDirection::Vertical => {
                let half = self.grid_pos.row / 2;
                let bottom = (half + 1) * new_cell.height;
                let height = if bottom > image.height {
                    image.height - half * new_cell.height
                } else {
                    new_cell.height
                };
                PixelSize::new(self.size.width, height)
            }
        }
    }

    /// Grid position after the merge axis has been compacted.
    #[must_use]
    pub const fn halved_pos(&self, direction: ReduceDirection) -> GridPosition {
        match direction {
            ReduceDirection::Horizontal => GridPosition::new(self.grid_pos.row, self.grid_pos.col / 2),
            ReduceDirection::Vertical => GridPosition::new(self.grid_pos.row / 2, self.grid_pos.col),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} runs={}", self.grid_pos, self.size, self.runs_count)
    }
}

fn checked(base: usize, count: usize, len: usize) -> Result<Range<usize>, TraceError> {
    match base.checked_add(count) {
        Some(end) if end <= len => Ok(base..end),
        _ => Err(TraceError::BoundsDefect { offset: base, len }),
    }
}
