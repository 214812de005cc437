//! Constant grid-cell promotion.
//!
//! When every grid access in the program uses literal coordinates, no cell
//! can be reached through a computed address, so each accessed cell can live
//! in its own variable initialized from the memory image. Cells outside the
//! grid keep their accesses: reading them always yields 0 no matter what was
//! written.

use std::collections::BTreeMap;

use tracing::debug;

use crate::ir::{Expr, ExprKind, Graph, GraphResult, Op, VarId};

/// Promote constant grid cells to variables; returns the number of cells
pub fn substitute_constant_memory(graph: &mut Graph) -> GraphResult<usize> {
    if !graph.list_dynamic_memory_access().is_empty() {
        return Ok(0);
    }
    let width = graph.width() as i64;
    let height = graph.height() as i64;
    let mut cells = graph.list_constant_memory_access();
    cells.retain(|&(x, y)| (0..width).contains(&x) && (0..height).contains(&y));
    if cells.is_empty() {
        return Ok(0);
    }
    cells.sort_unstable();

    let mut mapping = BTreeMap::new();
    for (x, y) in cells {
        let initial = graph.cell(x, y);
        mapping.insert((x, y), graph.add_variable(initial, false));
    }

    let cell_var = |x: &Expr, y: &Expr| -> Option<VarId> {
        mapping.get(&(x.as_constant()?, y.as_constant()?)).copied()
    };
    let is_cell_read = |expr: &Expr| match expr.kind() {
        ExprKind::MemoryGet { x, y } => cell_var(x, y).is_some(),
        _ => false,
    };
    let to_variable = |expr: &Expr| match expr.kind() {
        ExprKind::MemoryGet { x, y } => cell_var(x, y).map_or_else(|| expr.clone(), Expr::variable),
        _ => expr.clone(),
    };

    let ids: Vec<_> = graph.ids().collect();
    for id in ids {
        let vertex = graph.vertex_mut(id)?;
        vertex.substitute_expressions(&is_cell_read, &to_variable);
        for op in vertex.ops_mut() {
            let replacement = match op {
                Op::ExprGet { x, y } => cell_var(x, y).map(|var| Op::Push(Expr::variable(var))),
                Op::ExprSet { x, y, value } => cell_var(x, y).map(|var| Op::ExprVarSet {
                    var,
                    value: value.clone(),
                }),
                _ => None,
            };
            if let Some(replacement) = replacement {
                *op = replacement;
            }
        }
    }

    debug!(
        target: "befungraph::optimizer::memory",
        cells = mapping.len(),
        "Promoted constant grid cells to variables"
    );
    Ok(mapping.len())
}
