//! Pixel geometry: chain directions, integer pixel coordinates, and sizes.
//!
//! A border chain moves between 8-connected pixels. Each end of a
//! fragment records which neighbour it must connect through as a
//! [`ChainDirection`]; [`ChainDirection::Closed`] marks an end that
//! needs no further connection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction in which a fragment end connects to its neighbouring pixel.
///
/// Raw values are chosen so that opposite compass directions sum to 9,
/// which makes [`inverse`](Self::inverse) a subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChainDirection {
    /// The end needs no further connection (the chain is a complete loop).
    #[default]
    Closed = 0,
    Up = 1,
    TopRight = 2,
    Right = 3,
    BottomRight = 4,
    TopLeft = 5,
    Left = 6,
    BottomLeft = 7,
    Down = 8,
}

impl ChainDirection {
    /// The 8 compass directions, clockwise starting from [`Up`](Self::Up).
    pub const CLOCKWISE: [Self; 8] = [
        Self::Up,
        Self::TopRight,
        Self::Right,
        Self::BottomRight,
        Self::Down,
        Self::BottomLeft,
        Self::Left,
        Self::TopLeft,
    ];

    /// The opposite compass direction.
    ///
    /// Returns `None` for [`Closed`](Self::Closed), which has no inverse.
    #[must_use]
    pub const fn inverse(self) -> Option<Self> {
        match self {
            Self::Closed => None,
            dir => Self::from_raw(9 - dir.raw()),
        }
    }

    /// Pixel offset `(dx, dy)` of the neighbour in this direction.
    ///
    /// `y` grows downwards. Returns `None` for [`Closed`](Self::Closed).
    #[must_use]
    pub const fn offset(self) -> Option<(i32, i32)> {
        match self {
            Self::Closed => None,
            Self::Up => Some((0, -1)),
            Self::TopRight => Some((1, -1)),
            Self::Right => Some((1, 0)),
            Self::BottomRight => Some((1, 1)),
            Self::Down => Some((0, 1)),
            Self::BottomLeft => Some((-1, 1)),
            Self::Left => Some((-1, 0)),
            Self::TopLeft => Some((-1, -1)),
        }
    }

    /// Whether this is one of the 4 axis-aligned directions.
    #[must_use]
    pub const fn is_cardinal(self) -> bool {
        matches!(self, Self::Up | Self::Right | Self::Down | Self::Left)
    }

    /// Whether this end is closed.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Raw `u8` encoding.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Decode from the raw `u8` encoding.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Closed),
            1 => Some(Self::Up),
            2 => Some(Self::TopRight),
            3 => Some(Self::Right),
            4 => Some(Self::BottomRight),
            5 => Some(Self::TopLeft),
            6 => Some(Self::Left),
            7 => Some(Self::BottomLeft),
            8 => Some(Self::Down),
            _ => None,
        }
    }
}

impl fmt::Display for ChainDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self {
            Self::Closed => "o",
            Self::Up => "^",
            Self::TopRight => "/^",
            Self::Right => ">",
            Self::BottomRight => "\\v",
            Self::Down => "v",
            Self::BottomLeft => "v/",
            Self::Left => "<",
            Self::TopLeft => "^\\",
        };
        f.write_str(arrow)
    }
}

/// An integer pixel coordinate. `x` grows rightwards, `y` downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The 8-neighbour of this pixel in `direction`.
    ///
    /// Returns `None` for [`ChainDirection::Closed`].
    #[must_use]
    pub const fn neighbor(self, direction: ChainDirection) -> Option<Self> {
        match direction.offset() {
            Some((dx, dy)) => Some(Self {
                x: self.x + dx,
                y: self.y + dy,
            }),
            None => None,
        }
    }
}

impl fmt::Display for PixelPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}c{}", self.y, self.x)
    }
}

/// A width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `width * height`, widened so it cannot overflow.
    #[must_use]
    pub const fn area(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for PixelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}h{}", self.width, self.height)
    }
}

/// Where a region sits in the grid. Shrinks as regions merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPosition {
    pub row: u32,
    pub col: u32,
}

impl GridPosition {
    #[must_use]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gr{}gc{}", self.row, self.col)
    }
}
