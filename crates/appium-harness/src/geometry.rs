//! Bounding boxes and swipe vectors.
//!
//! Everything here is pure arithmetic; the session-facing helpers that feed it
//! live in [`crate::locator`].
//!
//! A swipe moves along one [`Axis`] and keeps the other axis pinned to the box
//! midpoint. Which end of the computed span becomes the start is decided by the
//! direction's [`TieBreak`]:
//!
//! ```text
//!   LEFT  = (X, prefer-max)     RIGHT = (X, prefer-min)
//!   UP    = (Y, prefer-max)     DOWN  = (Y, prefer-min)
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::result::{HarnessError, HarnessResult};

/// Viewport or element size in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Size {
    /// Create a new size
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Position and size of an element (or the whole viewport)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: i64,
    /// Top edge
    pub y: i64,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whole-viewport box anchored at the origin
    #[must_use]
    pub const fn viewport(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Horizontal midpoint
    #[must_use]
    pub fn mid_x(&self) -> f64 {
        self.x as f64 + f64::from(self.width) * 0.5
    }

    /// Vertical midpoint
    #[must_use]
    pub fn mid_y(&self) -> f64 {
        self.y as f64 + f64::from(self.height) * 0.5
    }

    /// Last pixel column inside the box
    #[must_use]
    pub const fn end_x(&self) -> i64 {
        self.x + self.width as i64 - 1
    }

    /// Last pixel row inside the box
    #[must_use]
    pub const fn end_y(&self) -> i64 {
        self.y + self.height as i64 - 1
    }

    /// Midpoint along an axis
    #[must_use]
    pub fn mid(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.mid_x(),
            Axis::Y => self.mid_y(),
        }
    }

    /// Extent along an axis
    #[must_use]
    pub fn extent(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => f64::from(self.width),
            Axis::Y => f64::from(self.height),
        }
    }
}

/// Screen axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Horizontal
    X,
    /// Vertical
    Y,
}

impl Axis {
    /// The other axis
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::X => Self::Y,
            Self::Y => Self::X,
        }
    }
}

/// Rule picking which end of a span becomes the swipe start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TieBreak {
    /// Take the smaller coordinate
    PreferMin,
    /// Take the larger coordinate
    PreferMax,
}

impl TieBreak {
    /// Apply the rule to a pair of coordinates
    #[must_use]
    pub fn pick(self, a: f64, b: f64) -> f64 {
        match self {
            Self::PreferMin => a.min(b),
            Self::PreferMax => a.max(b),
        }
    }

    /// The opposite rule
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::PreferMin => Self::PreferMax,
            Self::PreferMax => Self::PreferMin,
        }
    }
}

/// Swipe direction (the direction the finger travels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Right to left
    #[default]
    Left,
    /// Left to right
    Right,
    /// Bottom to top
    Up,
    /// Top to bottom
    Down,
}

impl Direction {
    /// All directions
    pub const ALL: [Self; 4] = [Self::Left, Self::Right, Self::Up, Self::Down];

    /// Axis the finger moves along
    #[must_use]
    pub const fn axis(self) -> Axis {
        match self {
            Self::Left | Self::Right => Axis::X,
            Self::Up | Self::Down => Axis::Y,
        }
    }

    /// Which end of the span the swipe starts from
    #[must_use]
    pub const fn tie_break(self) -> TieBreak {
        match self {
            Self::Left | Self::Up => TieBreak::PreferMax,
            Self::Right | Self::Down => TieBreak::PreferMin,
        }
    }

    /// Same axis, opposite tie-break
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Upper-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HarnessError::UnknownDirection { name: s.to_string() })
    }
}

impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Validated swipe coordinates; every component is non-negative by construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwipeVector {
    /// Start x
    pub start_x: u32,
    /// Start y
    pub start_y: u32,
    /// End x
    pub end_x: u32,
    /// End y
    pub end_y: u32,
}

impl SwipeVector {
    /// Validate raw coordinates
    ///
    /// # Errors
    ///
    /// [`HarnessError::NegativeSwipeCoordinate`] if any coordinate is below zero
    /// (or too large for a device pixel).
    pub fn try_new(start_x: i64, start_y: i64, end_x: i64, end_y: i64) -> HarnessResult<Self> {
        let fail = || HarnessError::NegativeSwipeCoordinate {
            start_x,
            start_y,
            end_x,
            end_y,
        };
        let coord = |v: i64| u32::try_from(v).map_err(|_| fail());
        Ok(Self {
            start_x: coord(start_x)?,
            start_y: coord(start_y)?,
            end_x: coord(end_x)?,
            end_y: coord(end_y)?,
        })
    }
}

/// Compute the swipe for `direction` across `fraction` of `bounds`.
///
/// Coordinates are truncated toward zero before validation.
///
/// # Errors
///
/// [`HarnessError::InvalidSwipeDistance`] for a non-finite fraction, or
/// [`HarnessError::NegativeSwipeCoordinate`] when the span leaves the screen.
pub fn swipe_vector(
    direction: Direction,
    bounds: &BoundingBox,
    fraction: f64,
) -> HarnessResult<SwipeVector> {
    if !fraction.is_finite() {
        return Err(HarnessError::InvalidSwipeDistance { distance: fraction });
    }

    let axis = direction.axis();
    let center = bounds.mid(axis);
    let half_span = bounds.extent(axis) * (fraction / 2.0);
    let from = center - half_span;
    let to = center + half_span;

    let tie_break = direction.tie_break();
    let start = tie_break.pick(from, to).trunc() as i64;
    let end = tie_break.inverse().pick(from, to).trunc() as i64;
    let constant = bounds.mid(axis.inverse()).trunc() as i64;

    match axis {
        Axis::X => SwipeVector::try_new(start, constant, end, constant),
        Axis::Y => SwipeVector::try_new(constant, start, constant, end),
    }
}
