//! Source positions on the program grid.

use std::fmt;

/// A cell on the two-dimensional program grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vec2i {
    pub x: i32,
    pub y: i32,
}

impl Vec2i {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Vec2i {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}|{})", self.x, self.y)
    }
}

/// Direction of the instruction pointer when a vertex was decoded.
///
/// Provenance only: no pass reads it to decide semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Right,
    Down,
    Left,
    Up,
}

/// Merge two position lists, keeping first-seen order and dropping duplicates.
pub fn merge_positions(into: &mut Vec<Vec2i>, from: &[Vec2i]) {
    for pos in from {
        if !into.contains(pos) {
            into.push(*pos);
        }
    }
}
