//! Result and statistics types for the optimizer.

use std::collections::BTreeMap;
use std::fmt;

/// Statistics about optimizations performed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationStats {
    /// Outer fixed-point iterations run
    pub iterations: usize,
    /// Chain rewrites applied by the peephole catalog
    pub peephole_rewrites: usize,
    /// Decisions folded or merged
    pub branches_folded: usize,
    /// Vertices deleted because the root could no longer reach them
    pub unreachable_removed: usize,
    /// Grid cells promoted to variables
    pub cells_substituted: usize,
    /// Stack values promoted to variables
    pub values_unstackified: usize,
    /// Chain rewrites applied while fusing blocks
    pub blocks_combined: usize,
    /// Rewrites per rule name
    pub per_rule: BTreeMap<&'static str, usize>,
}

impl OptimizationStats {
    /// Total number of graph mutations
    pub fn total(&self) -> usize {
        self.peephole_rewrites
            + self.branches_folded
            + self.unreachable_removed
            + self.cells_substituted
            + self.values_unstackified
            + self.blocks_combined
    }

    pub(crate) fn record_rule(&mut self, rule: &'static str, count: usize) {
        *self.per_rule.entry(rule).or_default() += count;
    }

    /// Rewrites applied by the named rule
    pub fn rule_count(&self, rule: &str) -> usize {
        self.per_rule.get(rule).copied().unwrap_or(0)
    }
}

/// Outcome of stack-size prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSize {
    /// No execution path holds more than this many values
    Bounded(usize),
    /// Some loop grows the stack on every iteration
    Unbounded,
}

impl StackSize {
    pub fn bound(self) -> Option<usize> {
        match self {
            StackSize::Bounded(size) => Some(size),
            StackSize::Unbounded => None,
        }
    }

    pub fn is_bounded(self) -> bool {
        matches!(self, StackSize::Bounded(_))
    }
}

impl fmt::Display for StackSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackSize::Bounded(size) => write!(f, "{}", size),
            StackSize::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Everything `Optimizer::optimize` learned about the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationReport {
    pub stats: OptimizationStats,
    pub stack_size: StackSize,
    /// Every simplification fixed point was reached within
    /// `max_iterations` rounds
    pub converged: bool,
}
