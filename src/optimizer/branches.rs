//! Decision folding.
//!
//! These rewrites change the shape of a split, so they operate on the graph
//! directly instead of through [`ModRule`](super::ModRule) chains.
//!
//! | Pattern | Replacement |
//! |---------|-------------|
//! | `if c` with constant `c` | `Nop` to the selected edge |
//! | `if !x goto T else F` | `if x goto F else T` |
//! | split with identical edges | `Pop` / `Nop` to the single target |
//! | `if .. goto A else B` where `A == B` structurally and both continue to the same successor | `Pop` / `Nop`, then one copy |

use tracing::trace;

use crate::ir::position::merge_positions;
use crate::ir::{EdgeList, ExprKind, GraphResult, Op, VertexKind};
use crate::ir::{Graph, Vertex, VertexId};

const TARGET: &str = "befungraph::optimizer::branches";

/// Apply every decision fold once; returns the number of splits rewritten.
///
/// Vertices cut off by constant folding are removed before returning.
pub fn fold_branches(graph: &mut Graph) -> GraphResult<usize> {
    let mut folded = 0;
    for id in graph.walk() {
        if !graph.contains(id) {
            continue;
        }
        if fold_constant_condition(graph, id)?
            || normalize_negated_condition(graph, id)?
            || fold_uniform_split(graph, id)?
            || merge_identical_branches(graph, id)?
        {
            folded += 1;
        }
    }
    if folded > 0 {
        graph.remove_unreachable();
    }
    Ok(folded)
}

/// Straight-line payload executing the side effects of a split without
/// branching
fn collapse_split(kind: &VertexKind) -> Option<VertexKind> {
    match kind {
        VertexKind::Decision => Some(Op::Pop.into()),
        VertexKind::ExprDecision(_) | VertexKind::Random => Some(Op::Nop.into()),
        VertexKind::DecisionBlock(body) => {
            let mut body = body.clone();
            body.push(Op::Pop);
            Some(VertexKind::Block(body))
        }
        VertexKind::ExprDecisionBlock(body, _) => Some(VertexKind::Block(body.clone())),
        VertexKind::Op(_) | VertexKind::Block(_) => None,
    }
}

/// Drop one back-reference `parent` from `child`
fn unlink_parent(graph: &mut Graph, child: VertexId, parent: VertexId) -> GraphResult<()> {
    let parents = &mut graph.vertex_mut(child)?.parents;
    if let Some(position) = parents.iter().position(|p| *p == parent) {
        parents.remove(position);
    }
    Ok(())
}

/// Replace `id` with a straight-line vertex continuing to `keep`
fn collapse_to(graph: &mut Graph, id: VertexId, keep: VertexId) -> GraphResult<bool> {
    let vertex = graph.vertex(id)?;
    let Some(kind) = collapse_split(&vertex.kind) else {
        return Ok(false);
    };
    let mut dropped = vertex.children.clone();
    if let Some(position) = dropped.iter().position(|c| *c == keep) {
        dropped.remove(position);
    }
    for child in dropped {
        unlink_parent(graph, child, id)?;
    }
    let vertex = graph.vertex_mut(id)?;
    vertex.kind = kind;
    vertex.children = EdgeList::from_slice(&[keep]);
    Ok(true)
}

fn fold_constant_condition(graph: &mut Graph, id: VertexId) -> GraphResult<bool> {
    let vertex = graph.vertex(id)?;
    let Some(value) = vertex.condition().and_then(|c| c.as_constant()) else {
        return Ok(false);
    };
    let (Some(edge_true), Some(edge_false)) = (vertex.edge_true(), vertex.edge_false()) else {
        return Ok(false);
    };
    let keep = if value != 0 { edge_true } else { edge_false };
    trace!(target: TARGET, vertex = %id, value, keep = %keep, "Folded constant decision");
    collapse_to(graph, id, keep)
}

fn normalize_negated_condition(graph: &mut Graph, id: VertexId) -> GraphResult<bool> {
    let vertex = graph.vertex_mut(id)?;
    let inner = match vertex.condition().map(|c| c.kind()) {
        Some(ExprKind::Not(inner)) => (**inner).clone(),
        _ => return Ok(false),
    };
    match &mut vertex.kind {
        VertexKind::ExprDecision(condition) | VertexKind::ExprDecisionBlock(_, condition) => {
            *condition = inner;
        }
        _ => return Ok(false),
    }
    vertex.children.swap(0, 1);
    trace!(target: TARGET, vertex = %id, "Swapped edges of negated decision");
    Ok(true)
}

fn fold_uniform_split(graph: &mut Graph, id: VertexId) -> GraphResult<bool> {
    let vertex = graph.vertex(id)?;
    if !vertex.is_code_path_split() {
        return Ok(false);
    }
    let Some(&first) = vertex.children.first() else {
        return Ok(false);
    };
    if vertex.children.iter().any(|c| *c != first) {
        return Ok(false);
    }
    trace!(target: TARGET, vertex = %id, target = %first, "Folded split with identical edges");
    collapse_to(graph, id, first)
}

/// Both edges lead to structurally identical private vertices that rejoin
/// at the same successor: run the shared vertex once after the split.
fn merge_identical_branches(graph: &mut Graph, id: VertexId) -> GraphResult<bool> {
    let vertex = graph.vertex(id)?;
    if !vertex.is_decision() {
        return Ok(false);
    }
    let (Some(edge_true), Some(edge_false)) = (vertex.edge_true(), vertex.edge_false()) else {
        return Ok(false);
    };
    if edge_true == edge_false {
        return Ok(false);
    }
    let (a, b) = (graph.vertex(edge_true)?, graph.vertex(edge_false)?);
    let private = |v: &Vertex| v.parents.as_slice() == [id] && !v.is_code_path_split();
    if !private(a) || !private(b) || a.kind != b.kind {
        return Ok(false);
    }
    let (Some(&next_a), Some(&next_b)) = (a.children.first(), b.children.first()) else {
        return Ok(false);
    };
    if next_a != next_b || a.children.len() != 1 || b.children.len() != 1 {
        return Ok(false);
    }
    if next_a == edge_true || next_a == edge_false {
        return Ok(false);
    }

    let merged_positions = b.positions.clone();
    if !collapse_to(graph, id, edge_true)? {
        return Ok(false);
    }
    graph.remove_vertex(edge_false);
    unlink_parent(graph, next_a, edge_false)?;
    merge_positions(&mut graph.vertex_mut(edge_true)?.positions, &merged_positions);

    trace!(
        target: TARGET,
        vertex = %id,
        kept = %edge_true,
        removed = %edge_false,
        "Merged identical branches"
    );
    Ok(true)
}
