//! Structural consistency checks.

use std::collections::HashSet;

use super::{Graph, VertexId};
use crate::ir::error::{GraphError, GraphResult};

impl Graph {
    /// Check the invariants every pass must preserve.
    ///
    /// - the root exists;
    /// - every edge is mirrored exactly once in the opposite list;
    /// - every vertex is reachable from the root;
    /// - at most one vertex has no parents;
    /// - split vertices have the child count their kind requires and every
    ///   other vertex has at most one child.
    pub fn test_graph(&self) -> GraphResult<()> {
        let root = self.root.ok_or(GraphError::MissingRoot)?;
        self.vertex(root)?;

        for (id, vertex) in self.vertices() {
            for &child in &vertex.children {
                let target = self.vertex(child)?;
                if count(&vertex.children, child) != count(&target.parents, id) {
                    return Err(GraphError::AsymmetricEdges {
                        vertex: id,
                        neighbour: child,
                    });
                }
            }
            for &parent in &vertex.parents {
                let source = self.vertex(parent)?;
                if count(&vertex.parents, parent) != count(&source.children, id) {
                    return Err(GraphError::AsymmetricEdges {
                        vertex: id,
                        neighbour: parent,
                    });
                }
            }

            match vertex.required_children() {
                Some(expected) if vertex.children.len() != expected => {
                    return Err(GraphError::ChildCount {
                        vertex: id,
                        kind: vertex.kind.name(),
                        expected,
                        got: vertex.children.len(),
                    });
                }
                None if vertex.children.len() > 1 => {
                    return Err(GraphError::ChildCount {
                        vertex: id,
                        kind: vertex.kind.name(),
                        expected: 1,
                        got: vertex.children.len(),
                    });
                }
                _ => {}
            }
        }

        let reachable: HashSet<VertexId> = self.walk().into_iter().collect();
        if let Some(lost) = self.ids().find(|id| !reachable.contains(id)) {
            return Err(GraphError::Unreachable(lost));
        }

        let mut orphans = self
            .vertices()
            .filter(|(_, vertex)| vertex.parents.is_empty())
            .map(|(id, _)| id);
        if let (Some(first), Some(second)) = (orphans.next(), orphans.next()) {
            return Err(GraphError::MultipleRoots { first, second });
        }

        Ok(())
    }
}

fn count(list: &[VertexId], id: VertexId) -> usize {
    list.iter().filter(|&&entry| entry == id).count()
}
