//! Side-effect classification shared by expressions and vertices.

use std::ops::{BitOr, BitOrAssign};

/// What an expression or vertex touches when it executes.
///
/// Emitters use the graph-wide union to decide whether a runtime stack, a
/// memory grid, or I/O scaffolding is needed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideEffects {
    /// Reads or writes the operand stack
    pub stack: bool,
    /// Reads or writes the memory grid
    pub grid: bool,
    /// Reads or writes a named variable
    pub variables: bool,
    /// Writes to the output stream
    pub output: bool,
    /// Blocks on the input stream
    pub input: bool,
    /// Picks a successor at random
    pub random: bool,
}

impl SideEffects {
    pub const NONE: SideEffects = SideEffects {
        stack: false,
        grid: false,
        variables: false,
        output: false,
        input: false,
        random: false,
    };

    pub const STACK: SideEffects = SideEffects {
        stack: true,
        ..SideEffects::NONE
    };

    pub const GRID: SideEffects = SideEffects {
        grid: true,
        ..SideEffects::NONE
    };

    pub const VARIABLES: SideEffects = SideEffects {
        variables: true,
        ..SideEffects::NONE
    };

    pub const OUTPUT: SideEffects = SideEffects {
        output: true,
        ..SideEffects::NONE
    };

    pub const INPUT: SideEffects = SideEffects {
        input: true,
        ..SideEffects::NONE
    };

    pub const RANDOM: SideEffects = SideEffects {
        random: true,
        ..SideEffects::NONE
    };

    /// True if nothing is touched
    pub fn is_pure(&self) -> bool {
        *self == SideEffects::NONE
    }
}

impl BitOr for SideEffects {
    type Output = SideEffects;

    fn bitor(self, rhs: SideEffects) -> SideEffects {
        SideEffects {
            stack: self.stack || rhs.stack,
            grid: self.grid || rhs.grid,
            variables: self.variables || rhs.variables,
            output: self.output || rhs.output,
            input: self.input || rhs.input,
            random: self.random || rhs.random,
        }
    }
}

impl BitOrAssign for SideEffects {
    fn bitor_assign(&mut self, rhs: SideEffects) {
        *self = *self | rhs;
    }
}

/// A single memory-grid access.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoryAccess {
    /// Both coordinates are literal constants
    Constant { x: i64, y: i64 },
    /// Coordinates are expressions, at least one of them not constant
    Expression {
        x: super::expression::Expr,
        y: super::expression::Expr,
    },
    /// Coordinates are popped from the operand stack at runtime
    Stack,
}

impl MemoryAccess {
    /// Classify an access given its coordinate expressions
    pub fn from_coordinates(x: &super::expression::Expr, y: &super::expression::Expr) -> Self {
        match (x.as_constant(), y.as_constant()) {
            (Some(x), Some(y)) => MemoryAccess::Constant { x, y },
            _ => MemoryAccess::Expression {
                x: x.clone(),
                y: y.clone(),
            },
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, MemoryAccess::Constant { .. })
    }
}
