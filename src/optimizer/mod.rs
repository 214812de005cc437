//! Graph optimizer.
//!
//! Passes run in this order:
//!
//! 1. peephole rules, decision folding and constant memory promotion,
//!    repeated until a full round changes nothing;
//! 2. unstackify, followed by another peephole fixed point when it promoted
//!    anything;
//! 3. block fusion;
//! 4. stack-size prediction.
//!
//! Each pass mutates the graph in place. With [`OptimizerConfig::validate`]
//! set, the graph is checked after every pass that changed it and the first
//! violation aborts optimization.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = build_graph();
//! let report = Optimizer::new(OptimizerConfig::default()).optimize(&mut graph)?;
//! println!("stack size: {}", report.stack_size);
//! ```

mod branches;
mod config;
mod memory;
mod mod_rule;
mod rules;
mod stack_size;
mod types;
mod unstackify;

#[cfg(test)]
mod tests;

use tracing::{debug, trace, warn};

use crate::ir::{Graph, GraphResult};

pub use branches::fold_branches;
pub use config::{OptimizerConfig, DEFAULT_MAX_ITERATIONS, DEFAULT_UNSTACKIFY_DEPTH_LIMIT};
pub use memory::substitute_constant_memory;
pub use mod_rule::{Matcher, ModRule, Replacer};
pub use rules::{block_rules, peephole_rules};
pub use stack_size::predict_stack_size;
pub use types::{OptimizationReport, OptimizationStats, StackSize};
pub use unstackify::{unstackify, Access, UnstackifyState, UnstackifyValue, ValueId};

const TARGET: &str = "befungraph::optimizer";

/// Runs the configured passes over a graph
#[derive(Debug)]
pub struct Optimizer {
    config: OptimizerConfig,
    peephole: Vec<ModRule>,
    blocks: Vec<ModRule>,
    stats: OptimizationStats,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            peephole: peephole_rules(),
            blocks: block_rules(),
            stats: OptimizationStats::default(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Statistics accumulated over every `optimize` call
    pub fn stats(&self) -> &OptimizationStats {
        &self.stats
    }

    /// Optimize `graph` in place and predict its stack size
    pub fn optimize(&mut self, graph: &mut Graph) -> GraphResult<OptimizationReport> {
        self.check(graph, "input")?;
        let before = self.stats.clone();

        let mut converged = self.simplify(graph)?;

        if self.config.unstackify {
            let promoted = unstackify(graph, self.config.unstackify_depth_limit)?;
            if promoted > 0 {
                self.stats.values_unstackified += promoted;
                self.check(graph, "unstackify")?;
                converged &= self.simplify(graph)?;
            }
        }

        if self.config.combine_blocks {
            let mut combined = 0;
            for rule in &self.blocks {
                let applied = rule.apply_exhaustively(graph, self.config.max_iterations)?;
                if applied > 0 {
                    self.stats.record_rule(rule.name(), applied);
                    combined += applied;
                }
            }
            if combined > 0 {
                self.stats.blocks_combined += combined;
                self.check(graph, "combine_blocks")?;
            }
        }

        let stack_size = predict_stack_size(graph)?;
        debug!(
            target: TARGET,
            vertices = graph.len(),
            rewrites = self.stats.total() - before.total(),
            %stack_size,
            converged,
            "Optimization finished"
        );
        Ok(OptimizationReport {
            stats: self.stats.clone(),
            stack_size,
            converged,
        })
    }

    /// Peephole, branch folding and memory promotion to a fixed point;
    /// returns false if `max_iterations` ran out first
    fn simplify(&mut self, graph: &mut Graph) -> GraphResult<bool> {
        let mut converged = false;
        for iteration in 0..self.config.max_iterations {
            self.stats.iterations += 1;
            let mut changed = false;

            if self.config.peephole {
                for rule in &self.peephole {
                    let applied = rule.apply(graph)?;
                    if applied > 0 {
                        self.stats.peephole_rewrites += applied;
                        self.stats.record_rule(rule.name(), applied);
                        changed = true;
                        check(&self.config, graph, rule.name())?;
                    }
                }
            }

            if self.config.fold_branches {
                let vertices = graph.len();
                let folded = fold_branches(graph)?;
                if folded > 0 {
                    self.stats.branches_folded += folded;
                    self.stats.unreachable_removed += vertices.saturating_sub(graph.len());
                    changed = true;
                    self.check(graph, "fold_branches")?;
                }
            }

            if self.config.substitute_memory {
                let cells = substitute_constant_memory(graph)?;
                if cells > 0 {
                    self.stats.cells_substituted += cells;
                    changed = true;
                    self.check(graph, "substitute_memory")?;
                }
            }

            trace!(target: TARGET, iteration, changed, "Simplification round");
            if !changed {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                target: TARGET,
                max_iterations = self.config.max_iterations,
                "Optimizer stopped before reaching a fixed point"
            );
        }
        Ok(converged)
    }

    fn check(&self, graph: &Graph, pass: &str) -> GraphResult<()> {
        check(&self.config, graph, pass)
    }
}

fn check(config: &OptimizerConfig, graph: &Graph, pass: &str) -> GraphResult<()> {
    if config.validate {
        graph.test_graph().inspect_err(|e| {
            warn!(target: TARGET, pass, error = %e, "Graph invalid after pass");
        })?;
    }
    Ok(())
}

/// Optimize with the default configuration
pub fn optimize_graph(graph: &mut Graph) -> GraphResult<OptimizationReport> {
    Optimizer::new(OptimizerConfig::default()).optimize(graph)
}
