//! Control-flow graph vertices.
//!
//! A [`Vertex`] is one node of the program graph: a payload ([`VertexKind`])
//! plus the grid cells it was decoded from and its edges. Edges are stored as
//! [`VertexId`] handles into the owning [`Graph`](super::graph::Graph) arena;
//! the graph keeps `parents` the exact inverse of every `children` list.
//!
//! # Decision edges
//!
//! Decision edges are positional: `children[0]` is the true edge (taken when
//! the popped value is non-zero) and `children[1]` the false edge. They are
//! fixed when the front-end builds the vertex; rewriting a child in place
//! keeps the edge it belongs to.

mod op;


use itertools::Itertools;
use smallvec::SmallVec;

use super::codegen::VertexGenerator;
use super::effects::{MemoryAccess, SideEffects};
use super::expression::{Expr, VarId};
use super::graph::VertexId;
use super::position::{Direction, Vec2i};

pub use op::Op;

/// Edge list with inline room for the four children of a random branch
pub type EdgeList = SmallVec<[VertexId; 4]>;

/// Vertex payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VertexKind {
    /// A single straight-line instruction
    Op(Op),
    /// Fused run of straight-line instructions
    Block(Vec<Op>),
    /// Pop a value and branch on it
    Decision,
    /// Branch on an expression
    ExprDecision(Expr),
    /// Block followed by a stack decision
    DecisionBlock(Vec<Op>),
    /// Block followed by an expression decision
    ExprDecisionBlock(Vec<Op>, Expr),
    /// Pick one of four successors at random
    Random,
}

impl VertexKind {
    pub fn name(&self) -> &'static str {
        match self {
            VertexKind::Op(op) => op.name(),
            VertexKind::Block(_) => "Block",
            VertexKind::Decision => "Decision",
            VertexKind::ExprDecision(_) => "ExprDecision",
            VertexKind::DecisionBlock(_) => "DecisionBlock",
            VertexKind::ExprDecisionBlock(..) => "ExprDecisionBlock",
            VertexKind::Random => "Random",
        }
    }
}

impl From<Op> for VertexKind {
    fn from(op: Op) -> Self {
        VertexKind::Op(op)
    }
}

/// One node of the control-flow graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertex {
    /// Grid cells this vertex represents (several after fusion)
    pub positions: Vec<Vec2i>,
    /// Direction of travel when decoded
    pub direction: Direction,
    /// Successors; order is significant for decisions and random branches
    pub children: EdgeList,
    /// Predecessors, one entry per incoming edge
    pub parents: EdgeList,
    pub kind: VertexKind,
}

impl Vertex {
    /// Create an unconnected vertex
    pub fn new(kind: impl Into<VertexKind>, positions: Vec<Vec2i>) -> Self {
        Self {
            positions,
            direction: Direction::default(),
            children: EdgeList::new(),
            parents: EdgeList::new(),
            kind: kind.into(),
        }
    }

    /// Create an unconnected vertex for a single grid cell
    pub fn at(kind: impl Into<VertexKind>, x: i32, y: i32) -> Self {
        Self::new(kind, vec![Vec2i::new(x, y)])
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Copy of this vertex's payload and provenance, without edges
    pub fn detached(&self) -> Self {
        Self {
            positions: self.positions.clone(),
            direction: self.direction,
            children: EdgeList::new(),
            parents: EdgeList::new(),
            kind: self.kind.clone(),
        }
    }

    pub fn op(&self) -> Option<&Op> {
        match &self.kind {
            VertexKind::Op(op) => Some(op),
            _ => None,
        }
    }

    pub fn is_nop(&self) -> bool {
        matches!(self.kind, VertexKind::Op(Op::Nop))
    }

    /// Decisions and random branches
    pub fn is_code_path_split(&self) -> bool {
        self.required_children().is_some()
    }

    pub fn is_block(&self) -> bool {
        matches!(
            self.kind,
            VertexKind::Block(_) | VertexKind::DecisionBlock(_) | VertexKind::ExprDecisionBlock(..)
        )
    }

    pub fn is_decision(&self) -> bool {
        matches!(
            self.kind,
            VertexKind::Decision
                | VertexKind::ExprDecision(_)
                | VertexKind::DecisionBlock(_)
                | VertexKind::ExprDecisionBlock(..)
        )
    }

    /// Exact child count demanded by a split vertex
    pub fn required_children(&self) -> Option<usize> {
        match self.kind {
            VertexKind::Random => Some(4),
            _ if self.is_decision() => Some(2),
            _ => None,
        }
    }

    pub fn edge_true(&self) -> Option<VertexId> {
        if self.is_decision() {
            self.children.first().copied()
        } else {
            None
        }
    }

    pub fn edge_false(&self) -> Option<VertexId> {
        if self.is_decision() {
            self.children.get(1).copied()
        } else {
            None
        }
    }

    /// Straight-line ops executed before any branch
    pub fn ops(&self) -> &[Op] {
        match &self.kind {
            VertexKind::Op(op) => std::slice::from_ref(op),
            VertexKind::Block(body)
            | VertexKind::DecisionBlock(body)
            | VertexKind::ExprDecisionBlock(body, _) => body.as_slice(),
            _ => &[],
        }
    }

    pub fn ops_mut(&mut self) -> &mut [Op] {
        match &mut self.kind {
            VertexKind::Op(op) => std::slice::from_mut(op),
            VertexKind::Block(body)
            | VertexKind::DecisionBlock(body)
            | VertexKind::ExprDecisionBlock(body, _) => body.as_mut_slice(),
            _ => &mut [],
        }
    }

    /// Branch condition of an expression decision
    pub fn condition(&self) -> Option<&Expr> {
        match &self.kind {
            VertexKind::ExprDecision(condition) | VertexKind::ExprDecisionBlock(_, condition) => {
                Some(condition)
            }
            _ => None,
        }
    }

    /// True if the branch pops its condition from the stack
    pub fn pops_condition(&self) -> bool {
        matches!(self.kind, VertexKind::Decision | VertexKind::DecisionBlock(_))
    }

    /// Net stack depth change of one execution.
    ///
    /// `None` means the change cannot be bounded statically; every kind the
    /// front-end currently produces has a fixed effect.
    pub fn stack_size_delta(&self) -> Option<i64> {
        let body: i64 = self.ops().iter().map(Op::stack_delta).sum();
        let branch = if self.pops_condition() { -1 } else { 0 };
        Some(body + branch)
    }

    /// Stack depth after executing once from `depth`, and the highest depth
    /// reached on the way, both clamped at zero
    pub fn apply_depth(&self, depth: usize) -> (usize, usize) {
        let mut current = depth;
        let mut peak = depth;
        for op in self.ops() {
            current = op.apply_depth(current);
            peak = peak.max(current);
        }
        if self.pops_condition() {
            current = current.saturating_sub(1);
        }
        (current, peak)
    }

    pub fn side_effects(&self) -> SideEffects {
        let mut effects = self
            .ops()
            .iter()
            .fold(SideEffects::NONE, |acc, op| acc | op.side_effects());
        if self.pops_condition() {
            effects |= SideEffects::STACK;
        }
        if let Some(condition) = self.condition() {
            effects |= condition.side_effects();
        }
        if matches!(self.kind, VertexKind::Random) {
            effects |= SideEffects::RANDOM;
        }
        effects
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

    fn memory_access(&self) -> Vec<MemoryAccess> {
        let mut out: Vec<MemoryAccess> = self.ops().iter().flat_map(Op::memory_access).collect();
        if let Some(condition) = self.condition() {
            condition.collect_memory_access(&mut out);
        }
        out
    }

    /// Grid cells accessed with literal coordinates
    pub fn list_constant_memory_access(&self) -> Vec<(i64, i64)> {
        self.memory_access()
            .into_iter()
            .filter_map(|access| match access {
                MemoryAccess::Constant { x, y } => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    /// Grid accesses whose coordinates are not both literal
    pub fn list_dynamic_memory_access(&self) -> Vec<MemoryAccess> {
        self.memory_access()
            .into_iter()
            .filter(|access| !access.is_constant())
            .collect()
    }

    /// Every variable read or written, recursing into block bodies
    pub fn variables(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        for op in self.ops() {
            op.collect_variables(&mut out);
        }
        if let Some(condition) = self.condition() {
            condition.collect_variables(&mut out);
        }
        out.into_iter().unique().collect()
    }

    /// Rewrite expressions owned by this vertex (not its children).
    ///
    /// Every sub-expression matching `pred` is replaced by `rewrite(it)`.
    pub fn substitute_expressions(
        &mut self,
        pred: &dyn Fn(&Expr) -> bool,
        rewrite: &dyn Fn(&Expr) -> Expr,
    ) -> bool {
        let mut changed = false;
        for op in self.ops_mut() {
            changed |= op.substitute_expressions(pred, rewrite);
        }
        match &mut self.kind {
            VertexKind::ExprDecision(condition) | VertexKind::ExprDecisionBlock(_, condition) => {
                if let Some(replacement) = condition.substitute(pred, rewrite) {
                    *condition = replacement;
                    changed = true;
                }
            }
            _ => {}
        }
        changed
    }

    /// Render this vertex; `targets` are the linear indices of `children`.
    ///
    /// Callers check `targets` against [`Vertex::required_children`] first;
    /// [`Graph::generate`](crate::ir::Graph::generate) does.
    pub(crate) fn generate<G: VertexGenerator + ?Sized>(&self, gen: &G, targets: &[usize]) -> String {
        let mut lines: Vec<String> = self.ops().iter().map(|op| op.generate(gen)).collect();
        match &self.kind {
            VertexKind::Decision | VertexKind::DecisionBlock(_) => {
                lines.push(gen.emit_decision(targets[0], targets[1]));
            }
            VertexKind::ExprDecision(condition) | VertexKind::ExprDecisionBlock(_, condition) => {
                lines.push(gen.emit_expr_decision(condition, targets[0], targets[1]));
            }
            VertexKind::Random => lines.push(gen.emit_random(targets)),
            VertexKind::Op(_) | VertexKind::Block(_) => {}
        }
        if self.is_block() {
            gen.emit_block(&lines)
        } else {
            lines.join("\n")
        }
    }
}
