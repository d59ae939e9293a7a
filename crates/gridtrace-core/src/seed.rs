//! Initial fragments: one single-pixel run per border crossing.
//!
//! Every foreground pixel looks at its 8 neighbours. Walking the ring
//! clockwise, each maximal gap of background neighbours that contains at
//! least one 4-connected neighbour is a place where a border passes the
//! pixel. The border enters from the foreground neighbour before the gap
//! and leaves towards the foreground neighbour after it; that pair is a
//! [`Triad`]. Gaps made only of diagonal neighbours are not borders, so
//! fully interior pixels seed nothing. An isolated pixel is its own
//! closed border.
//!
//! Two interchangeable [`Seeder`]s compute this: [`KernelSeeder`] applies
//! the rule per pixel and [`LookupSeeder`] reads a table of all 256
//! neighbourhoods built once from the same rule.

use std::sync::LazyLock;

use image::GrayImage;
use rayon::ThreadPool;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buffer::Buffer;
use crate::combine::Joiner;
use crate::geometry::{ChainDirection, GridPosition, PixelPoint, PixelSize};
use crate::region::{PatternSize, Region};
use crate::run::{Run, to_offset};
use crate::types::TraceError;

/// Most triads a single pixel can seed: one per 4-connected gap.
pub const MAX_TRIADS_PER_PIXEL: u32 = 4;

/// Which 8-neighbours of a pixel are foreground.
///
/// Bit `i` is set when the neighbour in direction
/// [`ChainDirection::CLOCKWISE`]`[i]` is foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Neighborhood(u8);

impl Neighborhood {
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Build from a predicate over the 8 directions.
    pub fn from_fn(mut is_foreground: impl FnMut(ChainDirection) -> bool) -> Self {
        let bits = ChainDirection::CLOCKWISE
            .iter()
            .enumerate()
            .filter(|&(_, &dir)| is_foreground(dir))
            .fold(0u8, |acc, (i, _)| acc | (1 << i));
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether the neighbour at ring position `index` (mod 8) is set.
    #[must_use]
    pub const fn is_set(self, index: usize) -> bool {
        self.0 & (1 << (index % 8)) != 0
    }
}

/// The two directions one border passes through a pixel with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Triad {
    /// Direction of the previous pixel on the border.
    pub from: ChainDirection,
    /// Direction of the next pixel on the border.
    pub to: ChainDirection,
}

impl Triad {
    /// The border of an isolated pixel.
    pub const CLOSED: Self = Self {
        from: ChainDirection::Closed,
        to: ChainDirection::Closed,
    };
}

/// Up to [`MAX_TRIADS_PER_PIXEL`] triads, inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriadSet {
    triads: [Triad; MAX_TRIADS_PER_PIXEL as usize],
    len: u8,
}

impl TriadSet {
    pub const EMPTY: Self = Self {
        triads: [Triad::CLOSED; MAX_TRIADS_PER_PIXEL as usize],
        len: 0,
    };

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Triad] {
        &self.triads[..self.len()]
    }

    fn push(&mut self, triad: Triad) {
        let n = self.len();
        if let Some(slot) = self.triads.get_mut(n) {
            *slot = triad;
            self.len += 1;
        }
    }
}

/// Produces the initial triads of a foreground pixel.
pub trait Seeder: Sync {
    /// Triads of a foreground pixel whose neighbours are `neighborhood`.
    fn triads(&self, neighborhood: Neighborhood) -> TriadSet;
}

/// Applies the ring rule to each pixel as it is seeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelSeeder;

impl Seeder for KernelSeeder {
    fn triads(&self, neighborhood: Neighborhood) -> TriadSet {
        ring_triads(neighborhood)
    }
}

/// Reads triads from a table of every possible neighbourhood.
#[derive(Debug, Clone)]
pub struct LookupSeeder {
    table: Vec<TriadSet>,
}

impl LookupSeeder {
    #[must_use]
    pub fn new() -> Self {
        let table = (0..=u8::MAX)
            .map(|bits| ring_triads(Neighborhood::from_bits(bits)))
            .collect();
        Self { table }
    }
}

impl Default for LookupSeeder {
    fn default() -> Self {
        Self::new()
    }
}

impl Seeder for LookupSeeder {
    fn triads(&self, neighborhood: Neighborhood) -> TriadSet {
        self.table
            .get(usize::from(neighborhood.bits()))
            .copied()
            .unwrap_or(TriadSet::EMPTY)
    }
}

static LOOKUP: LazyLock<LookupSeeder> = LazyLock::new(LookupSeeder::new);

/// Selects which seeder to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SeederKind {
    /// Precomputed table of all 256 neighbourhoods.
    #[default]
    Lookup,
    /// Rule evaluated per pixel.
    Kernel,
}

impl Seeder for SeederKind {
    fn triads(&self, neighborhood: Neighborhood) -> TriadSet {
        match *self {
            Self::Lookup => LOOKUP.triads(neighborhood),
            Self::Kernel => KernelSeeder.triads(neighborhood),
        }
    }
}

fn ring_triads(neighborhood: Neighborhood) -> TriadSet {
    let ring = ChainDirection::CLOCKWISE;
    let mut set = TriadSet::EMPTY;

    // Begin at the first foreground neighbour clockwise of Up, so every
    // gap is entered from its leading edge.
    let Some(start) = (1..=ring.len()).find(|&i| neighborhood.is_set(i)) else {
        set.push(Triad::CLOSED);
        return set;
    };

    let mut from = ChainDirection::Closed;
    let mut crossed = false;
    for step in 0..ring.len() {
        let cur = (start + step) % ring.len();
        let next = (cur + 1) % ring.len();
        if neighborhood.is_set(cur) {
            if !neighborhood.is_set(next) {
                from = ring[cur];
                crossed = false;
            }
        } else {
            crossed |= ring[cur].is_cardinal();
            if neighborhood.is_set(next) && crossed {
                set.push(Triad {
                    from,
                    to: ring[next],
                });
            }
        }
    }
    set
}

/// A foreground mask. Pixels outside the image are background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryImage {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl BinaryImage {
    /// Build from a predicate over `(x, y)`.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Foreground where luma is above `threshold`, or at or below it
    /// when `invert` is set.
    #[must_use]
    pub fn from_gray(gray: &GrayImage, threshold: u8, invert: bool) -> Self {
        Self::from_fn(gray.width(), gray.height(), |x, y| {
            (gray.get_pixel(x, y).0[0] > threshold) != invert
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn size(&self) -> PixelSize {
        PixelSize::new(self.width, self.height)
    }

    /// Whether the pixel at `point` is foreground.
    #[must_use]
    pub fn is_foreground(&self, point: PixelPoint) -> bool {
        let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) else {
            return false;
        };
        if x >= self.width || y >= self.height {
            return false;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .unwrap_or(false)
    }

    /// The neighbourhood of `point`.
    #[must_use]
    pub fn neighborhood(&self, point: PixelPoint) -> Neighborhood {
        Neighborhood::from_fn(|dir| point.neighbor(dir).is_some_and(|n| self.is_foreground(n)))
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn foreground_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }

    /// As an 8-bit image: foreground 255, background 0.
    #[must_use]
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let on = self.is_foreground(PixelPoint::new(x.cast_signed(), y.cast_signed()));
            image::Luma([if on { u8::MAX } else { 0 }])
        })
    }
}

/// Seeded buffers and the one-region-per-core grid that addresses them.
#[derive(Debug)]
pub struct Seeded {
    pub points: Buffer<PixelPoint>,
    pub runs: Buffer<Run>,
    /// `regions[row][col]`.
    pub regions: Vec<Vec<Region>>,
}

/// Fill the initial point and run buffers, one cell per pattern core.
///
/// Every foreground pixel of a core contributes one single-point run per
/// triad. The core's runs are then joined into chains, so a core holds
/// one run per border piece crossing it. The runs sit at the core's base
/// offset; unused slots hold [`Run::ABSENT`]. Bands of cores are seeded
/// concurrently on `pool`.
///
/// # Errors
///
/// Returns [`TraceError::EmptyImage`] for a zero-sized image,
/// [`TraceError::InvalidConfig`] for an unsupported pattern,
/// [`TraceError::AllocationFailure`] if a buffer cannot be allocated, and
/// [`TraceError::InvariantViolation`] if a core seeds more points than
/// the pattern density leaves room for.
pub fn seed(
    image: &BinaryImage,
    seeder: &dyn Seeder,
    pattern: PatternSize,
    pool: &ThreadPool,
) -> Result<Seeded, TraceError> {
    if image.width == 0 || image.height == 0 {
        return Err(TraceError::EmptyImage);
    }
    pattern.validate()?;

    let size = image.size();
    let len = pattern.buffer_len(size);
    let mut points = Buffer::<PixelPoint>::new(len)?;
    let mut runs = Buffer::<Run>::new(len)?;
    let cores = pattern.cores(size);
    let band_len = pattern.density as usize * pattern.padded_width(size) * pattern.core.height as usize;

    let regions = pool.install(|| {
        points
            .as_mut_slice()
            .par_chunks_mut(band_len)
            .zip(runs.as_mut_slice().par_chunks_mut(band_len))
            .enumerate()
            .map(|(band, (band_points, band_runs))| {
                let row = u32::try_from(band).map_err(|_| TraceError::BoundsDefect {
                    offset: band,
                    len: cores.height as usize,
                })?;
                let band_start = band * band_len;
                let band_end = band_start + band_runs.len();
                let mut scratch = CoreScratch::default();
                (0..cores.width)
                    .map(|col| {
                        let region = core_region(size, &pattern, GridPosition::new(row, col));
                        let span = region.span(size, pattern.core, &pattern, len)?;
                        let local = span.start.checked_sub(band_start).map(|start| start..start + span.len());
                        let (Some(cell_points), Some(cell_runs)) = (
                            local.clone().and_then(|r| band_points.get_mut(r)),
                            local.and_then(|r| band_runs.get_mut(r)),
                        ) else {
                            return Err(TraceError::BoundsDefect {
                                offset: span.start,
                                len: band_end,
                            });
                        };
                        let origin = PixelPoint::new(
                            (col * pattern.core.width).cast_signed(),
                            (row * pattern.core.height).cast_signed(),
                        );
                        let count = seed_core(
                            image,
                            seeder,
                            &region,
                            origin,
                            span.start,
                            cell_points,
                            cell_runs,
                            &mut scratch,
                        )?;
                        Ok(Region { runs_count: count, ..region })
                    })
                    .collect::<Result<Vec<Region>, TraceError>>()
            })
            .collect::<Result<Vec<Vec<Region>>, TraceError>>()
    })?;

    Ok(Seeded {
        points,
        runs,
        regions,
    })
}

/// The empty region covering the core at `pos`, clipped to the image.
fn core_region(image: PixelSize, pattern: &PatternSize, pos: GridPosition) -> Region {
    let core = pattern.core;
    let size = PixelSize::new(
        core.width.min(image.width - pos.col * core.width),
        core.height.min(image.height - pos.row * core.height),
    );
    Region::new(size, pos, 0)
}

/// Single-point runs of one core, before joining.
#[derive(Debug, Default)]
struct CoreScratch {
    points: Vec<PixelPoint>,
    runs: Vec<Run>,
}

/// Seed one core into its slots; returns how many runs were written.
///
/// `origin` is the core's top-left pixel and `base` the buffer offset of
/// the first slot in `points` and `runs`.
#[allow(clippy::too_many_arguments)]
fn seed_core(
    image: &BinaryImage,
    seeder: &dyn Seeder,
    region: &Region,
    origin: PixelPoint,
    base: usize,
    points: &mut [PixelPoint],
    runs: &mut [Run],
    scratch: &mut CoreScratch,
) -> Result<u32, TraceError> {
    scratch.points.clear();
    scratch.runs.clear();
    for dy in 0..region.size.height.cast_signed() {
        for dx in 0..region.size.width.cast_signed() {
            let pixel = PixelPoint::new(origin.x + dx, origin.y + dy);
            if !image.is_foreground(pixel) {
                continue;
            }
            for triad in seeder.triads(image.neighborhood(pixel)).as_slice() {
                let idx = scratch.points.len();
                scratch.points.push(pixel);
                scratch
                    .runs
                    .push(Run::new(to_offset(idx)?, to_offset(idx + 1)?, triad.from, triad.to));
            }
        }
    }
    if scratch.points.len() > runs.len() {
        return Err(TraceError::InvariantViolation(format!(
            "core {region} seeds {} points but has {} slots",
            scratch.points.len(),
            runs.len()
        )));
    }

    let joiner = Joiner {
        src_points: &scratch.points,
        src_runs: &scratch.runs,
    };
    let pool = (0..scratch.runs.len()).rev().collect();
    let joined = joiner.join_all(pool, base, runs)?;

    let slots = points.len();
    for relocation in &joined.relocations {
        let from = joiner.run(relocation.run)?.old_range()?;
        let to = usize::try_from(relocation.new_tail)
            .ok()
            .and_then(|tail| tail.checked_sub(base))
            .map(|start| start..start + from.len());
        let (Some(src), Some(dst)) = (scratch.points.get(from), to.and_then(|r| points.get_mut(r))) else {
            return Err(TraceError::BoundsDefect {
                offset: relocation.run,
                len: slots,
            });
        };
        dst.copy_from_slice(src);
    }

    u32::try_from(joined.runs).map_err(|_| TraceError::BoundsDefect {
        offset: joined.runs,
        len: runs.len(),
    })
}
