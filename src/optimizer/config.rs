//! Optimizer configuration.

use serde::Deserialize;

use crate::ir::{GraphError, GraphResult};

/// Default cap on outer fixed-point iterations
pub const DEFAULT_MAX_ITERATIONS: usize = 1024;

/// Default number of distinct stack depths unstackify explores per vertex
pub const DEFAULT_UNSTACKIFY_DEPTH_LIMIT: usize = 32;

/// Which passes run and how far they may go.
///
/// Every field has a default, so a TOML document only needs to name the
/// settings it changes:
///
/// ```toml
/// unstackify = false
/// max_iterations = 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Cap on outer fixed-point iterations
    pub max_iterations: usize,
    /// Run the peephole rule catalog
    pub peephole: bool,
    /// Fold constant and uniform decisions
    pub fold_branches: bool,
    /// Promote constant grid cells to variables
    pub substitute_memory: bool,
    /// Replace operand-stack traffic with variables
    pub unstackify: bool,
    /// Fuse straight-line runs into blocks
    pub combine_blocks: bool,
    /// Validate the graph after every pass
    pub validate: bool,
    /// Distinct depths per vertex before unstackify gives up on it
    pub unstackify_depth_limit: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            peephole: true,
            fold_branches: true,
            substitute_memory: true,
            unstackify: true,
            combine_blocks: true,
            validate: true,
            unstackify_depth_limit: DEFAULT_UNSTACKIFY_DEPTH_LIMIT,
        }
    }
}

impl OptimizerConfig {
    /// Parse a configuration from TOML
    pub fn parse_toml(content: &str) -> GraphResult<Self> {
        toml::from_str(content).map_err(|e: toml::de::Error| GraphError::Config(e.to_string()))
    }

    /// Configuration that leaves the graph untouched apart from prediction
    pub fn disabled() -> Self {
        Self {
            peephole: false,
            fold_branches: false,
            substitute_memory: false,
            unstackify: false,
            combine_blocks: false,
            ..Default::default()
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_unstackify(mut self, enabled: bool) -> Self {
        self.unstackify = enabled;
        self
    }

    pub fn with_combine_blocks(mut self, enabled: bool) -> Self {
        self.combine_blocks = enabled;
        self
    }

    pub fn with_substitute_memory(mut self, enabled: bool) -> Self {
        self.substitute_memory = enabled;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }
}
