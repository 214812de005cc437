//! Worst-case operand-stack depth.
//!
//! The predictor explores program states `(vertex, depth)` from the root.
//! A vertex may be visited at several depths; reaching it again at a depth
//! already recorded stops that path. Reaching it at a greater depth than a
//! state this path already passed through means a loop grows the stack on
//! every iteration, and the answer is [`StackSize::Unbounded`].
//!
//! Growth only counts when no state between the two visits popped past the
//! bottom of the stack. A clamped pop adds depth that the next iteration
//! does not repeat, so a loop with zero net effect entered on an empty stack
//! still gets a finite bound.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::types::StackSize;
use crate::ir::{Graph, GraphError, GraphResult, VertexId};

const TARGET: &str = "befungraph::optimizer::stack_size";

/// A recorded `(vertex, depth)` pair and the states that led to it
#[derive(Debug, Clone)]
struct ProgramState {
    vertex: VertexId,
    depth: usize,
    /// Executing the vertex from `depth` popped an empty stack
    clamped: bool,
    sources: Vec<usize>,
}

/// Maximum stack depth reachable from the root
pub fn predict_stack_size(graph: &Graph) -> GraphResult<StackSize> {
    let root = graph.root().ok_or(GraphError::MissingRoot)?;
    let mut states: Vec<ProgramState> = Vec::new();
    let mut by_vertex: HashMap<VertexId, Vec<usize>> = HashMap::new();
    let mut work: Vec<(VertexId, usize, Option<usize>)> = vec![(root, 0, None)];
    let mut max_depth = 0;

    while let Some((id, depth, source)) = work.pop() {
        let recorded = by_vertex.get(&id).map(Vec::as_slice).unwrap_or(&[]);

        if let Some(&same) = recorded.iter().find(|&&s| states[s].depth == depth) {
            if let Some(source) = source {
                if !states[same].sources.contains(&source) {
                    states[same].sources.push(source);
                }
            }
            continue;
        }

        if let Some(source) = source {
            let growing = recorded
                .iter()
                .find(|&&s| states[s].depth < depth && reaches_unclamped(&states, s, source));
            if let Some(&earlier) = growing {
                debug!(
                    target: TARGET,
                    vertex = %states[earlier].vertex,
                    from = states[earlier].depth,
                    to = depth,
                    "Stack grows on every loop iteration"
                );
                return Ok(StackSize::Unbounded);
            }
        }

        let vertex = graph.vertex(id)?;
        let Some(delta) = vertex.stack_size_delta() else {
            debug!(target: TARGET, vertex = %id, "Stack effect cannot be bounded");
            return Ok(StackSize::Unbounded);
        };
        let (after, peak) = vertex.apply_depth(depth);
        let clamped = after as i64 != depth as i64 + delta;
        max_depth = max_depth.max(peak);
        trace!(target: TARGET, vertex = %id, depth, after, peak, clamped, "Visited state");

        let index = states.len();
        states.push(ProgramState {
            vertex: id,
            depth,
            clamped,
            sources: source.into_iter().collect(),
        });
        by_vertex.entry(id).or_default().push(index);
        for &child in &vertex.children {
            work.push((child, after, Some(index)));
        }
    }

    debug!(target: TARGET, states = states.len(), max_depth, "Predicted stack size");
    Ok(StackSize::Bounded(max_depth))
}

/// True if `from` was reached from `target` (or is `target`) along a path
/// on which no state clamped
fn reaches_unclamped(states: &[ProgramState], target: usize, from: usize) -> bool {
    let mut stack = vec![from];
    let mut seen = vec![false; states.len()];
    while let Some(current) = stack.pop() {
        if states[current].clamped {
            continue;
        }
        if current == target {
            return true;
        }
        if std::mem::replace(&mut seen[current], true) {
            continue;
        }
        stack.extend(states[current].sources.iter().copied());
    }
    false
}
