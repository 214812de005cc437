//! Fall-through ordering and emission.
//!
//! Emitters consume the graph as a flat instruction list. Each vertex is
//! placed directly before its sole child whenever that child has not been
//! placed yet, so the common case of a straight run needs no jump. Split
//! vertices always name their targets explicitly and never fall through.

use std::collections::{HashMap, HashSet};

use super::{Graph, VertexId};
use crate::ir::codegen::{TextGenerator, VertexGenerator};
use crate::ir::error::{GraphError, GraphResult};

/// Ordered vertex list with index lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearProgram {
    pub order: Vec<VertexId>,
    index: HashMap<VertexId, usize>,
}

impl LinearProgram {
    pub fn index_of(&self, id: VertexId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Linear indices of the children of `id`, in edge order
    pub fn targets(&self, graph: &Graph, id: VertexId) -> GraphResult<Vec<usize>> {
        graph
            .vertex(id)?
            .children
            .iter()
            .map(|&child| self.index_of(child).ok_or(GraphError::Unreachable(child)))
            .collect()
    }

    /// True if the vertex at `position` continues into the next slot
    pub fn falls_through(&self, graph: &Graph, position: usize) -> bool {
        let Some(vertex) = self.order.get(position).and_then(|&id| graph.get(id)) else {
            return false;
        };
        if vertex.is_code_path_split() {
            return false;
        }
        match vertex.children.as_slice() {
            [child] => self.index_of(*child) == Some(position + 1),
            _ => false,
        }
    }
}

impl Graph {
    /// Order the reachable vertices for emission
    pub fn linearize(&self) -> GraphResult<LinearProgram> {
        let root = self.root.ok_or(GraphError::MissingRoot)?;
        let mut order = Vec::new();
        let mut placed = HashSet::new();
        let mut pending = vec![root];

        while let Some(start) = pending.pop() {
            let mut current = start;
            while placed.insert(current) {
                order.push(current);
                let vertex = self.vertex(current)?;
                if vertex.is_code_path_split() {
                    pending.extend(vertex.children.iter().rev().copied());
                    break;
                }
                match vertex.children.first() {
                    Some(&next) => current = next,
                    None => break,
                }
            }
        }

        let index = order
            .iter()
            .enumerate()
            .map(|(position, &id)| (id, position))
            .collect();
        Ok(LinearProgram { order, index })
    }

    /// Render the ordered program, one entry per vertex
    pub fn generate<G: VertexGenerator + ?Sized>(&self, gen: &G) -> GraphResult<Vec<String>> {
        let program = self.linearize()?;
        let mut out = Vec::with_capacity(program.len());
        for (position, &id) in program.order.iter().enumerate() {
            let vertex = self.vertex(id)?;
            let targets = program.targets(self, id)?;
            if let Some(expected) = vertex.required_children() {
                if targets.len() != expected {
                    return Err(GraphError::ChildCount {
                        vertex: id,
                        kind: vertex.kind.name(),
                        expected,
                        got: targets.len(),
                    });
                }
            }
            let mut code = vertex.generate(gen, &targets);
            if !vertex.is_code_path_split() {
                match targets.as_slice() {
                    [] => code = format!("{}\n{}", code, gen.emit_exit()),
                    [next] if *next != position + 1 => {
                        code = format!("{}\n{}", code, gen.emit_jump(*next))
                    }
                    _ => {}
                }
            }
            out.push(code);
        }
        Ok(out)
    }

    /// Numbered pseudo-code listing
    pub fn disassemble(&self) -> GraphResult<String> {
        let lines = self.generate(&TextGenerator)?;
        Ok(lines
            .iter()
            .enumerate()
            .map(|(position, code)| format!("{:>4}: {}", position, code.replace('\n', "; ")))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
