//! The program graph.
//!
//! [`Graph`] is an arena of [`Vertex`] values addressed by [`VertexId`]
//! handles. Removing a vertex leaves a hole so handles held by a pass stay
//! stable; a dead handle is reported as [`GraphError::UnknownVertex`] rather
//! than aliasing another vertex.
//!
//! The graph is built once by the front-end and then mutated in place by the
//! optimizer passes. It also carries the metadata emitters need: grid size,
//! the initial memory image, and the declared variables.

mod linearize;
mod validate;

#[cfg(test)]
mod tests;

use std::collections::{HashSet, VecDeque};
use std::fmt;

use itertools::Itertools;

use super::effects::{MemoryAccess, SideEffects};
use super::error::{GraphError, GraphResult};
use super::expression::VarId;
use super::vertex::Vertex;

pub use linearize::LinearProgram;

/// Stable handle of a vertex inside its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u32);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A variable known to the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
    pub id: VarId,
    /// Value before the first instruction executes
    pub initial: i64,
    /// Allocated by the optimizer rather than declared by the front-end
    pub synthesized: bool,
}

/// Value of an unwritten grid cell (ASCII space)
pub const EMPTY_CELL: i64 = b' ' as i64;

/// Control-flow graph plus program metadata
#[derive(Debug, Clone)]
pub struct Graph {
    vertices: Vec<Option<Vertex>>,
    root: Option<VertexId>,
    width: usize,
    height: usize,
    memory: Vec<i64>,
    variables: Vec<VariableDecl>,
}

impl Graph {
    /// Create an empty graph for a `width` x `height` grid of blank cells
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            vertices: Vec::new(),
            root: None,
            width,
            height,
            memory: vec![EMPTY_CELL; width * height],
            variables: Vec::new(),
        }
    }

    /// Replace the initial memory image (row-major, `width * height` cells)
    pub fn with_memory(mut self, cells: Vec<i64>) -> GraphResult<Self> {
        if cells.len() != self.width * self.height {
            return Err(GraphError::Config(format!(
                "memory image has {} cells, grid is {}x{}",
                cells.len(),
                self.width,
                self.height
            )));
        }
        self.memory = cells;
        Ok(self)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Initial value of grid cell `(x, y)`; 0 outside the grid
    pub fn cell(&self, x: i64, y: i64) -> i64 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return 0;
        }
        self.memory[y as usize * self.width + x as usize]
    }

    // ====================================================================
    // Arena
    // ====================================================================

    /// Insert an unconnected vertex
    pub fn add_vertex(&mut self, vertex: Vertex) -> VertexId {
        let id = VertexId(self.vertices.len() as u32);
        self.vertices.push(Some(vertex));
        id
    }

    /// Drop a vertex from the arena without touching its neighbours
    pub(crate) fn remove_vertex(&mut self, id: VertexId) -> Option<Vertex> {
        self.vertices.get_mut(id.0 as usize).and_then(Option::take)
    }

    /// Add an edge `from -> to`
    pub fn connect(&mut self, from: VertexId, to: VertexId) -> GraphResult<()> {
        self.vertex(to)?;
        self.vertex_mut(from)?.children.push(to);
        self.vertex_mut(to)?.parents.push(from);
        Ok(())
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn vertex(&self, id: VertexId) -> GraphResult<&Vertex> {
        self.get(id).ok_or(GraphError::UnknownVertex(id))
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> GraphResult<&mut Vertex> {
        self.vertices
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(GraphError::UnknownVertex(id))
    }

    /// Live vertex handles in arena order
    pub fn ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| VertexId(index as u32))
    }

    /// Live vertices in arena order
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|v| (VertexId(index as u32), v)))
    }

    pub fn len(&self) -> usize {
        self.vertices.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn root(&self) -> Option<VertexId> {
        self.root
    }

    pub fn set_root(&mut self, id: VertexId) -> GraphResult<()> {
        self.vertex(id)?;
        self.root = Some(id);
        Ok(())
    }

    /// Point every edge of `parent` that targets `old` at `new`
    pub(crate) fn retarget_child(
        &mut self,
        parent: VertexId,
        old: VertexId,
        new: VertexId,
    ) -> GraphResult<()> {
        for child in self.vertex_mut(parent)?.children.iter_mut() {
            if *child == old {
                *child = new;
            }
        }
        Ok(())
    }

    /// Point every back-reference of `child` that names `old` at `new`
    pub(crate) fn retarget_parent(
        &mut self,
        child: VertexId,
        old: VertexId,
        new: VertexId,
    ) -> GraphResult<()> {
        for parent in self.vertex_mut(child)?.parents.iter_mut() {
            if *parent == old {
                *parent = new;
            }
        }
        Ok(())
    }

    // ====================================================================
    // Variables
    // ====================================================================

    /// Declare a new variable
    pub fn add_variable(&mut self, initial: i64, synthesized: bool) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(VariableDecl {
            id,
            initial,
            synthesized,
        });
        id
    }

    pub fn variables(&self) -> &[VariableDecl] {
        &self.variables
    }

    /// Variables referenced anywhere in the graph, recursing into blocks
    pub fn list_used_variables(&self) -> Vec<VarId> {
        self.vertices()
            .flat_map(|(_, vertex)| vertex.variables())
            .unique()
            .sorted()
            .collect()
    }

    // ====================================================================
    // Traversal
    // ====================================================================

    /// Breadth-first order of the vertices reachable from the root
    pub fn walk(&self) -> Vec<VertexId> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);
        seen.insert(root);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            let Some(vertex) = self.get(id) else {
                continue;
            };
            for &child in &vertex.children {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        order
    }

    /// True if some path of one or more edges leads from `id` back to itself
    pub fn is_on_cycle(&self, id: VertexId) -> bool {
        let mut seen = HashSet::new();
        let mut stack: Vec<VertexId> = self
            .get(id)
            .map(|vertex| vertex.children.to_vec())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            if current == id {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(vertex) = self.get(current) {
                stack.extend(vertex.children.iter().copied());
            }
        }
        false
    }

    /// Delete every vertex the root cannot reach; returns true if any went
    pub fn remove_unreachable(&mut self) -> bool {
        let reachable: HashSet<VertexId> = self.walk().into_iter().collect();
        let dead: Vec<VertexId> = self.ids().filter(|id| !reachable.contains(id)).collect();
        for &id in &dead {
            if let Some(vertex) = self.remove_vertex(id) {
                for child in vertex.children.iter().unique() {
                    if let Some(child) = self.vertices.get_mut(child.0 as usize).and_then(Option::as_mut) {
                        child.parents.retain(|parent| *parent != id);
                    }
                }
            }
        }
        !dead.is_empty()
    }

    // ====================================================================
    // Analyses
    // ====================================================================

    /// Vertices that are the target of a branch rather than a fall-through
    pub fn list_jumps(&self) -> Vec<VertexId> {
        self.vertices()
            .filter(|(_, vertex)| vertex.is_code_path_split())
            .flat_map(|(_, vertex)| vertex.children.iter().copied())
            .unique()
            .collect()
    }

    /// Grid cells accessed with literal coordinates anywhere in the graph
    pub fn list_constant_memory_access(&self) -> Vec<(i64, i64)> {
        self.vertices()
            .flat_map(|(_, vertex)| vertex.list_constant_memory_access())
            .unique()
            .collect()
    }

    /// Grid accesses with computed coordinates anywhere in the graph
    pub fn list_dynamic_memory_access(&self) -> Vec<MemoryAccess> {
        self.vertices()
            .flat_map(|(_, vertex)| vertex.list_dynamic_memory_access())
            .unique()
            .collect()
    }

    /// Union of the side effects of every vertex
    pub fn side_effects(&self) -> SideEffects {
        self.vertices()
            .fold(SideEffects::NONE, |acc, (_, vertex)| acc | vertex.side_effects())
    }

    pub fn is_output(&self) -> bool {
        self.side_effects().output
    }

    pub fn is_input(&self) -> bool {
        self.side_effects().input
    }

    pub fn is_random(&self) -> bool {
        self.side_effects().random
    }

    pub fn is_stack_access(&self) -> bool {
        self.side_effects().stack
    }

    pub fn is_grid_access(&self) -> bool {
        self.side_effects().grid
    }

    pub fn is_variable_access(&self) -> bool {
        self.side_effects().variables
    }
}
