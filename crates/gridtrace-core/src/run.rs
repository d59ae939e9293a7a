//! Chain fragments.
//!
//! A [`Run`] indexes a contiguous stretch of the point buffer holding one
//! piece of a border chain, ordered tail to head:
//!
//! ```text
//!  ~~~~~~~~~~~>
//!  ^           ^
//!  tail        head (one past the end)
//! ```
//!
//! Each end records the direction it must connect through to continue
//! the chain. A fragment whose ends are both [`ChainDirection::Closed`]
//! is a complete border.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::geometry::ChainDirection;
use crate::types::TraceError;

/// One border-chain fragment.
///
/// Offsets are `i32` so the negative sentinel can mark an absent run
/// (`old_head < 0`) or an unassigned destination (`new_tail < 0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Start of the source range in the point buffer.
    pub old_tail: i32,
    /// One past the end of the source range.
    pub old_head: i32,
    /// Start of the destination range, once relocated.
    pub new_tail: i32,
    /// One past the end of the destination range, once relocated.
    pub new_head: i32,
    /// Direction the tail connects from.
    pub tail_from: ChainDirection,
    /// Direction the head connects to.
    pub head_to: ChainDirection,
}

impl Run {
    /// Placeholder for an empty buffer slot.
    pub const ABSENT: Self = Self {
        old_tail: -1,
        old_head: -1,
        new_tail: -1,
        new_head: -1,
        tail_from: ChainDirection::Closed,
        head_to: ChainDirection::Closed,
    };

    /// A fragment over `[tail, head)` with no destination assigned yet.
    #[must_use]
    pub const fn new(
        old_tail: i32,
        old_head: i32,
        tail_from: ChainDirection,
        head_to: ChainDirection,
    ) -> Self {
        Self {
            old_tail,
            old_head,
            new_tail: -1,
            new_head: -1,
            tail_from,
            head_to,
        }
    }

    /// Negative heads mark an absent run.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.old_head >= 0
    }

    /// Whether the fragment is a complete border.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvariantViolation`] if exactly one end is
    /// closed; a fragment closes at both ends or neither.
    pub fn is_closed(&self) -> Result<bool, TraceError> {
        match (self.tail_from.is_closed(), self.head_to.is_closed()) {
            (true, true) => Ok(true),
            (false, false) => Ok(false),
            _ => Err(TraceError::InvariantViolation(format!(
                "run {self} is closed at only one end"
            ))),
        }
    }

    /// Number of points covered by the source range.
    #[must_use]
    pub const fn len(&self) -> usize {
        if self.old_head > self.old_tail {
            (self.old_head - self.old_tail).unsigned_abs() as usize
        } else {
            0
        }
    }

    /// Whether the source range covers no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The source range as buffer indices.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::BoundsDefect`] for an absent or reversed range.
    pub fn old_range(&self) -> Result<Range<usize>, TraceError> {
        to_range(self.old_tail, self.old_head)
    }

    /// The destination range as buffer indices.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::BoundsDefect`] if no destination has been
    /// assigned or the range is reversed.
    pub fn new_range(&self) -> Result<Range<usize>, TraceError> {
        to_range(self.new_tail, self.new_head)
    }
}

impl Default for Run {
    fn default() -> Self {
        Self::ABSENT
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "([{}, {})->[{}, {}), {}->{})",
            self.old_tail, self.old_head, self.new_tail, self.new_head, self.tail_from, self.head_to
        )
    }
}

/// Convert a buffer offset to `i32`, the width runs store.
///
/// # Errors
///
/// Returns [`TraceError::BoundsDefect`] if the offset does not fit.
pub fn to_offset(index: usize) -> Result<i32, TraceError> {
    i32::try_from(index).map_err(|_| TraceError::BoundsDefect {
        offset: index,
        len: i32::MAX.unsigned_abs() as usize,
    })
}

fn to_range(tail: i32, head: i32) -> Result<Range<usize>, TraceError> {
    let start = usize::try_from(tail).map_err(|_| TraceError::BoundsDefect {
        offset: 0,
        len: 0,
    })?;
    let end = usize::try_from(head).map_err(|_| TraceError::BoundsDefect {
        offset: start,
        len: 0,
    })?;
    if end < start {
        return Err(TraceError::BoundsDefect {
            offset: start,
            len: end,
        });
    }
    Ok(start..end)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn absent_run_is_invalid() {
        assert!(!Run::ABSENT.is_valid());
        assert!(Run::ABSENT.old_range().is_err());
        assert!(Run::default().is_empty());
    }

    #[test]
    fn new_run_has_no_destination() {
        let run = Run::new(4, 7, ChainDirection::Left, ChainDirection::Right);
        assert!(run.is_valid());
        assert_eq!(run.len(), 3);
        assert_eq!(run.old_range().unwrap(), 4..7);
        assert!(run.new_range().is_err());
    }

    #[test]
    fn closure_requires_both_ends() {
        let closed = Run::new(0, 1, ChainDirection::Closed, ChainDirection::Closed);
        assert!(closed.is_closed().unwrap());

        let open = Run::new(0, 1, ChainDirection::Up, ChainDirection::Down);
        assert!(!open.is_closed().unwrap());

        let half = Run::new(0, 1, ChainDirection::Closed, ChainDirection::Down);
        assert!(matches!(
            half.is_closed(),
            Err(TraceError::InvariantViolation(_))
        ));
    }

    #[test]
    fn reversed_range_is_a_bounds_defect() {
        let run = Run::new(5, 2, ChainDirection::Up, ChainDirection::Up);
        assert!(matches!(
            run.old_range(),
            Err(TraceError::BoundsDefect { .. })
        ));
    }

    #[test]
    fn display_shows_both_ranges() {
        let mut run = Run::new(0, 2, ChainDirection::Right, ChainDirection::Left);
        run.new_tail = 8;
        run.new_head = 10;
        assert_eq!(run.to_string(), "([0, 2)->[8, 10), >-><)");
    }
}
