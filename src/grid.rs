//! Grid geometry: positions, directions and bounds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A robot's location on the grid and whether it is carrying a crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
    pub has_crate: bool,
}

impl Position {
    pub fn new(x: u32, y: u32, has_crate: bool) -> Self {
        Self { x, y, has_crate }
    }

    /// Grid origin with no cargo.
    pub fn origin() -> Self {
        Self::default()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A single-step movement directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Parse an already-uppercased directive character.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'N' => Some(Self::North),
            'S' => Some(Self::South),
            'E' => Some(Self::East),
            'W' => Some(Self::West),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::North => 'N',
            Self::South => 'S',
            Self::East => 'E',
            Self::West => 'W',
        }
    }

    /// `(dx, dy)` applied by one step in this direction.
    pub fn delta(self) -> (i64, i64) {
        match self {
            Self::North => (0, 1),
            Self::South => (0, -1),
            Self::East => (1, 0),
            Self::West => (-1, 0),
        }
    }
}

/// Fixed dimensions of the warehouse floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub width: u32,
    pub height: u32,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
        }
    }
}

impl Grid {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Check `0 <= x < width` and `0 <= y < height`.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.width) && y < i64::from(self.height)
    }

    pub fn contains_position(&self, position: Position) -> bool {
        self.contains(i64::from(position.x), i64::from(position.y))
    }

    /// Raw coordinates after moving one step, which may lie off the grid.
    pub fn offset(position: Position, direction: Direction) -> (i64, i64) {
        let (dx, dy) = direction.delta();
        (i64::from(position.x) + dx, i64::from(position.y) + dy)
    }

    /// Move one step, or `None` if the step would leave the grid.
    pub fn step(&self, position: Position, direction: Direction) -> Option<Position> {
        let (x, y) = Self::offset(position, direction);
        if !self.contains(x, y) {
            return None;
        }
        Some(Position {
            x: u32::try_from(x).ok()?,
            y: u32::try_from(y).ok()?,
            has_crate: position.has_crate,
        })
    }
}
