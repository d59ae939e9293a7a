//! Joining the runs of two adjacent regions.
//!
//! The runs of both regions form a pool. Each run taken from the pool is
//! grown into a chain by repeatedly attaching the pooled run whose tail
//! sits where the chain's head points (walking forward), then the pooled
//! run whose head sits where the chain's tail points (walking backward).
//! The chain becomes one run in the merged region and its constituents
//! are assigned consecutive destination point ranges, so after the bulk
//! copy the whole chain is contiguous in the point buffer.
//!
//! A chain whose head points back at its own tail is a complete border;
//! both of its ends become [`ChainDirection::Closed`].
//!
//! The combiner only reads the source generation. Merged runs go into a
//! destination slice owned by the caller, and the new point ranges of
//! the input runs are returned as [`Relocation`]s for the caller to
//! record before the bulk copy.

use std::collections::VecDeque;

use crate::geometry::{ChainDirection, PixelPoint, PixelSize};
use crate::grid::ReduceDirection;
use crate::region::{PatternSize, Region};
use crate::run::{Run, to_offset};
use crate::types::TraceError;

/// New destination point range for one source run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Index of the run in the source run buffer.
    pub run: usize,
    pub new_tail: i32,
    pub new_head: i32,
}

/// What one merge (or pass-through) produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    /// The surviving region, sized for the new cell but still at its
    /// pre-compaction grid position.
    pub region: Region,
    /// Point moves the caller must apply and copy.
    pub relocations: Vec<Relocation>,
    /// Points covered by the region's runs.
    pub points: usize,
}

/// Joins regions for one reduction step.
#[derive(Debug, Clone, Copy)]
pub struct Combiner<'a> {
    pub image: PixelSize,
    /// Cell size before the step.
    pub cell: PixelSize,
    /// Cell size after the step.
    pub new_cell: PixelSize,
    pub pattern: PatternSize,
    pub direction: ReduceDirection,
    pub src_points: &'a [PixelPoint],
    pub src_runs: &'a [Run],
}

impl Combiner<'_> {
    /// Merge `b` into `a`, writing the merged runs to `dst`.
    ///
    /// `dst` must be exactly the merged region's span of the destination
    /// run buffer.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvariantViolation`] if more than one run
    /// matches an endpoint or a chain is closed at one end only, and
    /// [`TraceError::BoundsDefect`] if an offset falls outside a buffer or
    /// the merged region's span.
    pub fn merge(&self, a: &Region, b: &Region, dst: &mut [Run]) -> Result<Merged, TraceError> {
        let (size, base) = self.target(a);
        let len = self.src_runs.len();
        let pool: Vec<usize> = a
            .run_range(self.image, self.cell, &self.pattern, len)?
            .chain(b.run_range(self.image, self.cell, &self.pattern, len)?)
            .collect();

        let joined = self.joiner().join_all(pool, base, dst)?;
        let region = Region::new(size, a.grid_pos, count(joined.runs)?);
        log::trace!(
            "{:?} merge {a} + {b} -> {region} ({} points)",
            self.direction,
            joined.points
        );
        Ok(Merged {
            region,
            relocations: joined.relocations,
            points: joined.points,
        })
    }

    /// Carry a partnerless region into the next generation unchanged.
    ///
    /// Its runs and points keep their offsets; only the cell around it
    /// grows.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::BoundsDefect`] if the region's runs do not
    /// fit in `dst` or the source buffer.
    pub fn pass_through(&self, region: &Region, dst: &mut [Run]) -> Result<Merged, TraceError> {
        let (size, _) = self.target(region);
        let range = region.run_range(self.image, self.cell, &self.pattern, self.src_runs.len())?;
        let count_runs = range.len();
        if count_runs > dst.len() {
            return Err(TraceError::BoundsDefect {
                offset: count_runs,
                len: dst.len(),
            });
        }

        let mut relocations = Vec::with_capacity(count_runs);
        let mut points = 0;
        let joiner = self.joiner();
        for (slot, idx) in dst.iter_mut().zip(range) {
            let run = joiner.run(idx)?;
            *slot = Run::new(run.old_tail, run.old_head, run.tail_from, run.head_to);
            relocations.push(Relocation {
                run: idx,
                new_tail: run.old_tail,
                new_head: run.old_head,
            });
            points += run.len();
        }
        if let Some(rest) = dst.get_mut(count_runs..) {
            rest.fill(Run::ABSENT);
        }

        Ok(Merged {
            region: Region::new(size, region.grid_pos, region.runs_count),
            relocations,
            points,
        })
    }

    /// Size and base offset of the region `anchor` becomes after this step.
    #[must_use]
    pub const fn target(&self, anchor: &Region) -> (PixelSize, usize) {
        let size = anchor.merged_size(self.image, self.new_cell, self.direction);
        let pos = anchor.halved_pos(self.direction);
        let base = Region::new(size, pos, 0).base(self.image, self.new_cell, &self.pattern);
        (size, base)
    }

    /// Chain joining over this step's source generation.
    #[must_use]
    pub const fn joiner(&self) -> Joiner<'_> {
        Joiner {
            src_points: self.src_points,
            src_runs: self.src_runs,
        }
    }
}

/// Runs joined into chains by [`Joiner::join_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    /// New point ranges of every input run.
    pub relocations: Vec<Relocation>,
    /// Chains written to the destination.
    pub runs: usize,
    /// Points covered by those chains.
    pub points: usize,
}

/// Grows chains of runs by matching endpoints.
#[derive(Debug, Clone, Copy)]
pub struct Joiner<'a> {
    pub src_points: &'a [PixelPoint],
    pub src_runs: &'a [Run],
}

impl Joiner<'_> {
    /// Join every run in `pool` into chains, one output run per chain.
    ///
    /// Chains are written to `dst` from its first slot, and the rest of
    /// `dst` is cleared. `dst` starts at offset `base` of its buffer, and
    /// each chain's points are given consecutive ranges from `base`.
    /// Runs are taken from the back of `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvariantViolation`] if more than one run
    /// matches an endpoint or a chain is closed at one end only, and
    /// [`TraceError::BoundsDefect`] if an offset falls outside a buffer or
    /// the chains need more slots than `dst` has.
    pub fn join_all(&self, mut pool: Vec<usize>, base: usize, dst: &mut [Run]) -> Result<Joined, TraceError> {
        let mut relocations = Vec::with_capacity(pool.len());
        let mut next_run = 0;
        let mut next_point = 0;
        while let Some(start) = pool.pop() {
            let chain = self.join(start, &mut pool)?;

            let chain_start = next_point;
            for &idx in &chain {
                let run = self.run(idx)?;
                relocations.push(Relocation {
                    run: idx,
                    new_tail: to_offset(base + next_point)?,
                    new_head: to_offset(base + next_point + run.len())?,
                });
                next_point += run.len();
            }

            let (tail_from, head_to) = self.chain_ends(&chain)?;
            let dst_len = dst.len();
            let slot = dst
                .get_mut(next_run)
                .ok_or_else(|| TraceError::BoundsDefect {
                    offset: base + next_run,
                    len: base + dst_len,
                })?;
            *slot = Run::new(
                to_offset(base + chain_start)?,
                to_offset(base + next_point)?,
                tail_from,
                head_to,
            );
            next_run += 1;
        }

        if next_point > dst.len() {
            return Err(TraceError::BoundsDefect {
                offset: base + next_point,
                len: base + dst.len(),
            });
        }
        if let Some(rest) = dst.get_mut(next_run..) {
            rest.fill(Run::ABSENT);
        }

        Ok(Joined {
            relocations,
            runs: next_run,
            points: next_point,
        })
    }

    /// Grow `start` into the longest chain the pool allows.
    fn join(&self, start: usize, pool: &mut Vec<usize>) -> Result<VecDeque<usize>, TraceError> {
        let mut chain = VecDeque::from([start]);

        let mut last = self.run(start)?;
        while let Some((target, wanted)) = self.head_target(&last)? {
            let next = self.take_match(pool, |run| {
                Ok(run.tail_from == wanted && self.tail_point(run)? == target)
            })?;
            let Some(idx) = next else { break };
            chain.push_back(idx);
            last = self.run(idx)?;
        }

        let mut first = self.run(start)?;
        while let Some((target, wanted)) = self.tail_target(&first)? {
            let prev = self.take_match(pool, |run| {
                Ok(run.head_to == wanted && self.head_point(run)? == target)
            })?;
            let Some(idx) = prev else { break };
            chain.push_front(idx);
            first = self.run(idx)?;
        }

        Ok(chain)
    }

    /// Remove and return the single pooled run matching `pred`.
    fn take_match(
        &self,
        pool: &mut Vec<usize>,
        mut pred: impl FnMut(&Run) -> Result<bool, TraceError>,
    ) -> Result<Option<usize>, TraceError> {
        let mut found = None;
        for (pos, &idx) in pool.iter().enumerate() {
            if pred(&self.run(idx)?)? {
                if let Some((_, other)) = found {
                    return Err(TraceError::InvariantViolation(format!(
                        "runs {other} and {idx} both match the same endpoint"
                    )));
                }
                found = Some((pos, idx));
            }
        }
        Ok(found.map(|(pos, idx)| {
            pool.swap_remove(pos);
            idx
        }))
    }

    /// Directions of the chain's outer ends, closed if it loops.
    fn chain_ends(&self, chain: &VecDeque<usize>) -> Result<(ChainDirection, ChainDirection), TraceError> {
        let (Some(&first), Some(&last)) = (chain.front(), chain.back()) else {
            return Err(TraceError::InvariantViolation("empty chain".to_string()));
        };
        let first = self.run(first)?;
        let last = self.run(last)?;
        let (tail_from, head_to) = (first.tail_from, last.head_to);

        if tail_from.is_closed() || head_to.is_closed() {
            if tail_from != head_to {
                return Err(TraceError::InvariantViolation(format!(
                    "chain from {first} to {last} is closed at one end only"
                )));
            }
            return Ok((tail_from, head_to));
        }

        let loops = head_to.inverse() == Some(tail_from)
            && self.head_point(&last)?.neighbor(head_to) == Some(self.tail_point(&first)?);
        if loops {
            Ok((ChainDirection::Closed, ChainDirection::Closed))
        } else {
            Ok((tail_from, head_to))
        }
    }

    /// Where a run's head points, and the tail direction a match needs.
    fn head_target(&self, run: &Run) -> Result<Option<(PixelPoint, ChainDirection)>, TraceError> {
        let dir = run.head_to;
        let (Some(target), Some(wanted)) = (self.head_point(run)?.neighbor(dir), dir.inverse()) else {
            return Ok(None);
        };
        Ok(Some((target, wanted)))
    }

    /// Where a run's tail points, and the head direction a match needs.
    fn tail_target(&self, run: &Run) -> Result<Option<(PixelPoint, ChainDirection)>, TraceError> {
        let dir = run.tail_from;
        let (Some(target), Some(wanted)) = (self.tail_point(run)?.neighbor(dir), dir.inverse()) else {
            return Ok(None);
        };
        Ok(Some((target, wanted)))
    }

    /// The source run at `idx`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::BoundsDefect`] if `idx` is past the end.
    pub fn run(&self, idx: usize) -> Result<Run, TraceError> {
        self.src_runs.get(idx).copied().ok_or(TraceError::BoundsDefect {
            offset: idx,
            len: self.src_runs.len(),
        })
    }

    fn tail_point(&self, run: &Run) -> Result<PixelPoint, TraceError> {
        let range = run.old_range()?;
        self.point(range.start, run)
    }

    fn head_point(&self, run: &Run) -> Result<PixelPoint, TraceError> {
        let range = run.old_range()?;
        let last = range.end.checked_sub(1).filter(|&i| i >= range.start);
        match last {
            Some(i) => self.point(i, run),
            None => Err(TraceError::InvariantViolation(format!("run {run} has no points"))),
        }
    }

    fn point(&self, idx: usize, run: &Run) -> Result<PixelPoint, TraceError> {
        if run.is_empty() {
            return Err(TraceError::InvariantViolation(format!("run {run} has no points")));
        }
        self.src_points.get(idx).copied().ok_or(TraceError::BoundsDefect {
            offset: idx,
            len: self.src_points.len(),
        })
    }
}

fn count(runs: usize) -> Result<u32, TraceError> {
    u32::try_from(runs).map_err(|_| TraceError::BoundsDefect {
        offset: runs,
        len: u32::MAX as usize,
    })
}
