//! Flat, offset-addressed storage for points and runs, plus bulk copy.
//!
//! Every region's data lives at a computed offset in one of these
//! buffers (see [`crate::region::base_offset`]). Each reduction step
//! reads one generation of a [`DoubleBuffer`] and writes the other, so
//! a step never aliases its own source.
//!
//! Concurrent writers are handed disjoint `&mut` sub-slices via
//! [`carve`], which checks that the requested spans really are
//! disjoint and in bounds instead of trusting the caller.

use std::ops::Range;

use rayon::prelude::*;

use crate::geometry::PixelPoint;
use crate::run::Run;
use crate::types::TraceError;

/// Element type stored in a [`Buffer`].
pub trait Slot: Copy + Send + Sync {
    /// Value of a slot that holds nothing.
    const EMPTY: Self;
    /// Name used in allocation errors.
    const NAME: &'static str;
}

impl Slot for Run {
    const EMPTY: Self = Self::ABSENT;
    const NAME: &'static str = "runs";
}

impl Slot for PixelPoint {
    const EMPTY: Self = Self::new(-1, -1);
    const NAME: &'static str = "points";
}

/// A fixed-length array addressed by integer offset.
#[derive(Debug, Clone)]
pub struct Buffer<T> {
    data: Vec<T>,
}

impl<T: Slot> Buffer<T> {
    /// Allocate `count` empty slots.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::AllocationFailure`] if the backing store
    /// cannot be reserved.
    pub fn new(count: usize) -> Result<Self, TraceError> {
        let mut data = Vec::new();
        data.try_reserve_exact(count)
            .map_err(|_| TraceError::AllocationFailure {
                what: T::NAME,
                count,
            })?;
        data.resize(count, T::EMPTY);
        Ok(Self { data })
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Two generations of the same buffer: one read, one written.
#[derive(Debug, Clone)]
pub struct DoubleBuffer<T> {
    generations: [Buffer<T>; 2],
    current: usize,
}

impl<T: Slot> DoubleBuffer<T> {
    /// Use `seeded` as the first source generation and allocate an
    /// empty destination of the same length.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::AllocationFailure`] if the second
    /// generation cannot be allocated.
    pub fn new(seeded: Buffer<T>) -> Result<Self, TraceError> {
        let other = Buffer::new(seeded.len())?;
        Ok(Self {
            generations: [seeded, other],
            current: 0,
        })
    }

    /// Number of slots in each generation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.generations[0].len()
    }

    /// Whether the generations have no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The generation the next step reads.
    #[must_use]
    pub fn src(&self) -> &[T] {
        self.generations[self.current].as_slice()
    }

    /// `(source, destination)` for the current step.
    pub fn split(&mut self) -> (&mut [T], &mut [T]) {
        let [a, b] = &mut self.generations;
        if self.current == 0 {
            (a.as_mut_slice(), b.as_mut_slice())
        } else {
            (b.as_mut_slice(), a.as_mut_slice())
        }
    }

    /// Make the destination the next step's source.
    pub const fn flip(&mut self) {
        self.current = 1 - self.current;
    }
}

/// Split `buf` into one sub-slice per span.
///
/// `spans` must be sorted by start, pairwise disjoint, and within
/// `buf`. The gaps between spans are left untouched.
///
/// # Errors
///
/// Returns [`TraceError::BoundsDefect`] if a span overlaps its
/// predecessor, is reversed, or runs past the end of `buf`.
pub fn carve<'a, T>(
    buf: &'a mut [T],
    spans: &[Range<usize>],
) -> Result<Vec<&'a mut [T]>, TraceError> {
    let len = buf.len();
    let mut rest = buf;
    let mut consumed = 0;
    let mut pieces = Vec::with_capacity(spans.len());
    for span in spans {
        if span.start < consumed || span.end < span.start {
            return Err(TraceError::BoundsDefect {
                offset: span.start,
                len: consumed,
            });
        }
        if span.end > len {
            return Err(TraceError::BoundsDefect {
                offset: span.end,
                len,
            });
        }
        let (_, tail) = std::mem::take(&mut rest).split_at_mut(span.start - consumed);
        let (piece, tail) = tail.split_at_mut(span.len());
        pieces.push(piece);
        rest = tail;
        consumed = span.end;
    }
    Ok(pieces)
}

/// Copy each listed run's points from `[old_tail, old_head)` in
/// `src_points` to `[new_tail, new_head)` in `dst_points`.
///
/// Copies run concurrently, one task per run. Destination ranges must
/// not overlap; this is checked, not assumed.
///
/// # Errors
///
/// Returns [`TraceError::BoundsDefect`] if an index or range is out of
/// bounds or two destination ranges overlap, and
/// [`TraceError::InvariantViolation`] if a run's source and destination
/// lengths differ.
pub fn blit(
    run_indices: &[usize],
    src_runs: &[Run],
    src_points: &[PixelPoint],
    dst_points: &mut [PixelPoint],
) -> Result<(), TraceError> {
    let mut copies = run_indices
        .iter()
        .map(|&idx| {
            let run = src_runs.get(idx).ok_or(TraceError::BoundsDefect {
                offset: idx,
                len: src_runs.len(),
            })?;
            let from = run.old_range()?;
            let to = run.new_range()?;
            if from.len() != to.len() {
                return Err(TraceError::InvariantViolation(format!(
                    "run {idx} {run} changes length when relocated"
                )));
            }
            if from.end > src_points.len() {
                return Err(TraceError::BoundsDefect {
                    offset: from.end,
                    len: src_points.len(),
                });
            }
            Ok((to, from))
        })
        .collect::<Result<Vec<_>, TraceError>>()?;

    copies.sort_unstable_by_key(|(to, _)| to.start);
    let spans: Vec<Range<usize>> = copies.iter().map(|(to, _)| to.clone()).collect();
    let targets = carve(dst_points, &spans)?;

    targets
        .into_par_iter()
        .zip(copies.par_iter())
        .for_each(|(dst, (_, from))| dst.copy_from_slice(&src_points[from.clone()]));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::ChainDirection;

    fn relocated(old: Range<i32>, new: Range<i32>) -> Run {
        let mut run = Run::new(old.start, old.end, ChainDirection::Up, ChainDirection::Down);
        run.new_tail = new.start;
        run.new_head = new.end;
        run
    }

    #[test]
    fn new_buffer_is_filled_with_empty_slots() {
        let buf = Buffer::<Run>::new(3).unwrap();
        assert_eq!(buf.len(), 3);
        assert!(buf.as_slice().iter().all(|r| !r.is_valid()));
    }

    #[test]
    fn huge_allocation_fails_cleanly() {
        let result = Buffer::<Run>::new(usize::MAX / 2);
        assert!(matches!(
            result,
            Err(TraceError::AllocationFailure { what: "runs", .. })
        ));
    }

    #[test]
    fn double_buffer_flips_generations() {
        let mut seeded = Buffer::<PixelPoint>::new(2).unwrap();
        seeded.as_mut_slice()[0] = PixelPoint::new(9, 9);
        let mut double = DoubleBuffer::new(seeded).unwrap();
        assert_eq!(double.src()[0], PixelPoint::new(9, 9));

        let (_, dst) = double.split();
        dst[1] = PixelPoint::new(4, 4);
        double.flip();
        assert_eq!(double.src()[1], PixelPoint::new(4, 4));
        assert_eq!(double.src()[0], PixelPoint::EMPTY);
    }

    #[test]
    fn carve_hands_out_disjoint_pieces() {
        let mut data = [0u8; 10];
        let pieces = carve(&mut data, &[1..3, 3..4, 7..10]).unwrap();
        assert_eq!(pieces.len(), 3);
        for (n, piece) in pieces.into_iter().enumerate() {
            piece.fill(u8::try_from(n + 1).unwrap());
        }
        assert_eq!(data, [0, 1, 1, 2, 0, 0, 0, 3, 3, 3]);
    }

    #[test]
    fn carve_rejects_overlap() {
        let mut data = [0u8; 10];
        assert!(matches!(
            carve(&mut data, &[0..4, 3..5]),
            Err(TraceError::BoundsDefect { offset: 3, len: 4 })
        ));
    }

    #[test]
    fn carve_rejects_span_past_end() {
        let mut data = [0u8; 4];
        assert!(carve(&mut data, &[2..5]).is_err());
    }

    #[test]
    fn blit_moves_each_run_to_its_destination() {
        let src_points: Vec<PixelPoint> = (0..6).map(|i| PixelPoint::new(i, 0)).collect();
        let runs = vec![relocated(0..2, 4..6), relocated(4..6, 0..2), relocated(2..3, 2..3)];
        let mut dst = vec![PixelPoint::EMPTY; 6];

        blit(&[0, 1, 2], &runs, &src_points, &mut dst).unwrap();

        let xs: Vec<i32> = dst.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![4, 5, 2, -1, 0, 1]);
    }

    #[test]
    fn blit_rejects_overlapping_destinations() {
        let src_points = vec![PixelPoint::new(0, 0); 4];
        let runs = vec![relocated(0..2, 0..2), relocated(2..4, 1..3)];
        let mut dst = vec![PixelPoint::EMPTY; 4];
        assert!(matches!(
            blit(&[0, 1], &runs, &src_points, &mut dst),
            Err(TraceError::BoundsDefect { .. })
        ));
    }

    #[test]
    fn blit_rejects_unassigned_destination() {
        let src_points = vec![PixelPoint::new(0, 0); 2];
        let runs = vec![Run::new(0, 2, ChainDirection::Up, ChainDirection::Up)];
        let mut dst = vec![PixelPoint::EMPTY; 2];
        assert!(blit(&[0], &runs, &src_points, &mut dst).is_err());
    }
}
