//! Operand-stack elimination.
//!
//! The pass interprets the graph symbolically from the root, carrying an
//! [`UnstackifyState`]: a stack of [`ValueId`]s naming the values that would
//! be on the operand stack. A value is identified by the op that writes it,
//! so every execution of the same op writes the same symbolic value.
//!
//! Each value accumulates the accesses made to it. Values that cannot be
//! tracked safely are *poisoned* and keep their stack traffic:
//!
//! - two different values reach the same operand of the same op (divergent
//!   merge or loop back-edge);
//! - a vertex is reached at the same depth with a different stack;
//! - a value occurs twice on one stack (its writer ran again before it was
//!   consumed);
//! - a read falls below the tracked stack;
//! - a vertex is reached at more distinct depths than the configured limit.
//!
//! Values that meet in one op share fate through *links*: a binary op cannot
//! take one operand from a variable and the other from the stack, so if any
//! of its operands or its result is poisoned all of them are.
//!
//! Every remaining value with a write gets a fresh variable, and each op is
//! rewritten into its expression form: writes become assignments, pops of
//! promoted values disappear, and `peek()` of a promoted value reads the
//! variable. The physical stack then holds exactly the poisoned values, in
//! the same order as before.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, trace};

use crate::ir::{Expr, ExprKind, Graph, GraphError, GraphResult, Op, VarId, VertexId, VertexKind};

const TARGET: &str = "befungraph::optimizer::unstackify";

/// Handle of a symbolic stack value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(usize);

/// How an op touches a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    /// Popped and pushed back unchanged (swap)
    ReadWrite,
}

/// An op inside a vertex; `index == ops.len()` is the vertex's branch
type Site = (VertexId, usize);

/// One symbolic stack slot
#[derive(Debug, Clone, Default)]
pub struct UnstackifyValue {
    pub accesses: Vec<(VertexId, usize, Access)>,
    pub poisoned: bool,
    /// Values that must be promoted together with this one or not at all
    pub links: Vec<ValueId>,
    pub replacement: Option<VarId>,
}

impl UnstackifyValue {
    fn touch(&mut self, site: Site, access: Access) {
        let entry = (site.0, site.1, access);
        if !self.accesses.contains(&entry) {
            self.accesses.push(entry);
        }
    }

    pub fn has_write(&self) -> bool {
        self.accesses
            .iter()
            .any(|(_, _, access)| matches!(access, Access::Write | Access::ReadWrite))
    }
}

/// Symbolic operand stack, top last
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnstackifyState {
    stack: Vec<ValueId>,
}

impl UnstackifyState {
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn values(&self) -> &[ValueId] {
        &self.stack
    }
}

/// Operands an op consumed and the value its `peek()` saw, as first recorded
#[derive(Debug, Clone, Default)]
struct SiteRecord {
    inputs: Vec<ValueId>,
    peek: Option<ValueId>,
}

struct Unstackifier<'g> {
    graph: &'g Graph,
    depth_limit: usize,
    values: Vec<UnstackifyValue>,
    writers: HashMap<(VertexId, usize, usize), ValueId>,
    sites: HashMap<Site, SiteRecord>,
    memo: HashMap<VertexId, BTreeMap<usize, UnstackifyState>>,
}

/// Promote stack values to variables; returns the number promoted
pub fn unstackify(graph: &mut Graph, depth_limit: usize) -> GraphResult<usize> {
    let Some(root) = graph.root() else {
        return Ok(0);
    };

    let mut analysis = Unstackifier {
        graph: &*graph,
        depth_limit: depth_limit.max(1),
        values: Vec::new(),
        writers: HashMap::new(),
        sites: HashMap::new(),
        memo: HashMap::new(),
    };
    analysis.walk(root)?;
    analysis.propagate_poison();

    let Unstackifier {
        mut values,
        writers,
        sites,
        ..
    } = analysis;
    let mut promoted = 0;
    for value in values.iter_mut() {
        if !value.poisoned && value.has_write() {
            value.replacement = Some(graph.add_variable(0, true));
            promoted += 1;
        }
    }
    let poisoned = values.iter().filter(|v| v.poisoned).count();
    debug!(target: TARGET, promoted, poisoned, "Unstackify analysis finished");
    if promoted == 0 {
        return Ok(0);
    }

    let rewriter = Rewriter {
        values: &values,
        writers: &writers,
        sites: &sites,
    };
    let ids: Vec<VertexId> = graph.ids().collect();
    for id in ids {
        let vertex = graph.vertex(id)?;
        let kind = rewriter.rewrite_vertex(id, &vertex.kind)?;
        graph.vertex_mut(id)?.kind = kind;
    }
    Ok(promoted)
}

// ============================================================================
// Analysis
// ============================================================================

impl Unstackifier<'_> {
    fn new_value(&mut self, poisoned: bool) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(UnstackifyValue {
            poisoned,
            ..Default::default()
        });
        id
    }

    fn poison(&mut self, value: ValueId) {
        self.values[value.0].poisoned = true;
    }

    fn link(&mut self, group: &[ValueId]) {
        for &a in group {
            for &b in group {
                if a != b && !self.values[a.0].links.contains(&b) {
                    self.values[a.0].links.push(b);
                }
            }
        }
    }

    /// Value written by output `slot` of the op at `site`
    fn writer(&mut self, site: Site, slot: usize) -> ValueId {
        if let Some(&value) = self.writers.get(&(site.0, site.1, slot)) {
            return value;
        }
        let value = self.new_value(false);
        self.writers.insert((site.0, site.1, slot), value);
        value
    }

    fn push(&mut self, state: &mut UnstackifyState, value: ValueId, site: Site, access: Access) {
        self.values[value.0].touch(site, access);
        if state.stack.contains(&value) {
            trace!(target: TARGET, ?value, vertex = %site.0, "Value pushed twice");
            self.poison(value);
        }
        state.stack.push(value);
    }

    fn pop(&mut self, state: &mut UnstackifyState, site: Site, access: Access) -> ValueId {
        match state.stack.pop() {
            Some(value) => {
                self.values[value.0].touch(site, access);
                value
            }
            None => self.new_value(true),
        }
    }

    fn peek(&mut self, state: &UnstackifyState, site: Site) -> ValueId {
        match state.stack.last() {
            Some(&value) => {
                self.values[value.0].touch(site, Access::Read);
                value
            }
            None => self.new_value(true),
        }
    }

    /// Compare against what this site saw before; poison every mismatch
    fn record(&mut self, site: Site, inputs: &[ValueId], peek: Option<ValueId>) {
        match self.sites.get(&site).cloned() {
            None => {
                self.sites.insert(
                    site,
                    SiteRecord {
                        inputs: inputs.to_vec(),
                        peek,
                    },
                );
            }
            Some(previous) => {
                for (&old, &new) in previous.inputs.iter().zip(inputs) {
                    if old != new {
                        self.poison(old);
                        self.poison(new);
                    }
                }
                if let (Some(old), Some(new)) = (previous.peek, peek) {
                    if old != new {
                        self.poison(old);
                        self.poison(new);
                    }
                }
            }
        }
    }

    fn walk(&mut self, root: VertexId) -> GraphResult<()> {
        let mut work = vec![(root, UnstackifyState::default())];
        while let Some((id, mut state)) = work.pop() {
            if !self.enter(id, &state) {
                continue;
            }
            let graph = self.graph;
            let vertex = graph.vertex(id)?;
            for (index, op) in vertex.ops().iter().enumerate() {
                self.step(&mut state, (id, index), op);
            }

            let branch = (id, vertex.ops().len());
            let peek = match vertex.condition() {
                Some(condition) if condition.reads_stack() => Some(self.peek(&state, branch)),
                _ => None,
            };
            let inputs = if vertex.pops_condition() {
                vec![self.pop(&mut state, branch, Access::Read)]
            } else {
                Vec::new()
            };
            if peek.is_some() || !inputs.is_empty() {
                self.record(branch, &inputs, peek);
            }

            for &child in vertex.children.iter().rev() {
                work.push((child, state.clone()));
            }
        }
        Ok(())
    }

    /// Memoize the entry state; false if the vertex needs no further visit
    fn enter(&mut self, id: VertexId, state: &UnstackifyState) -> bool {
        let seen = self.memo.entry(id).or_default();
        if let Some(previous) = seen.get(&state.depth()) {
            let mismatched: Vec<(ValueId, ValueId)> = previous
                .stack
                .iter()
                .zip(&state.stack)
                .filter(|(a, b)| a != b)
                .map(|(&a, &b)| (a, b))
                .collect();
            for (a, b) in mismatched {
                trace!(target: TARGET, vertex = %id, ?a, ?b, "Divergent stacks at merge");
                self.poison(a);
                self.poison(b);
            }
            return false;
        }
        if seen.len() >= self.depth_limit {
            let recorded: Vec<ValueId> = seen.values().flat_map(|s| s.stack.clone()).collect();
            trace!(target: TARGET, vertex = %id, depths = seen.len(), "Depth limit reached");
            for value in recorded.into_iter().chain(state.stack.iter().copied()) {
                self.poison(value);
            }
            return false;
        }
        seen.insert(state.depth(), state.clone());
        true
    }

    fn step(&mut self, state: &mut UnstackifyState, site: Site, op: &Op) {
        let peek = if op.expressions().iter().any(|e| e.reads_stack()) {
            Some(self.peek(state, site))
        } else {
            None
        };

        match op {
            Op::Swap => {
                let a = self.pop(state, site, Access::ReadWrite);
                let b = self.pop(state, site, Access::ReadWrite);
                self.record(site, &[a, b], peek);
                self.link(&[a, b]);
                self.push(state, a, site, Access::ReadWrite);
                self.push(state, b, site, Access::ReadWrite);
            }
            Op::Dup => {
                let top = self.peek(state, site);
                self.record(site, &[top], peek);
                let copy = self.writer(site, 0);
                self.link(&[top, copy]);
                self.push(state, copy, site, Access::Write);
            }
            _ => {
                let (pops, pushes) = op.stack_effect();
                let inputs: Vec<ValueId> =
                    (0..pops).map(|_| self.pop(state, site, Access::Read)).collect();
                self.record(site, &inputs, peek);
                let outputs: Vec<ValueId> = (0..pushes).map(|slot| self.writer(site, slot)).collect();
                if matches!(op, Op::BinaryMath(_) | Op::Not | Op::Get | Op::Set) {
                    let group: Vec<ValueId> = inputs.iter().chain(&outputs).copied().collect();
                    self.link(&group);
                }
                for value in outputs {
                    self.push(state, value, site, Access::Write);
                }
            }
        }
    }

    fn propagate_poison(&mut self) {
        let mut queue: VecDeque<ValueId> = (0..self.values.len())
            .map(ValueId)
            .filter(|v| self.values[v.0].poisoned)
            .collect();
        while let Some(value) = queue.pop_front() {
            let links = self.values[value.0].links.clone();
            for linked in links {
                if !self.values[linked.0].poisoned {
                    self.values[linked.0].poisoned = true;
                    queue.push_back(linked);
                }
            }
        }
    }
}

// ============================================================================
// Rewriting
// ============================================================================

struct Rewriter<'a> {
    values: &'a [UnstackifyValue],
    writers: &'a HashMap<(VertexId, usize, usize), ValueId>,
    sites: &'a HashMap<Site, SiteRecord>,
}

impl Rewriter<'_> {
    fn var(&self, value: ValueId) -> Option<VarId> {
        self.values[value.0].replacement
    }

    fn writer_var(&self, site: Site, slot: usize) -> Option<VarId> {
        self.writers
            .get(&(site.0, site.1, slot))
            .and_then(|&value| self.var(value))
    }

    fn record(&self, site: Site) -> SiteRecord {
        self.sites.get(&site).cloned().unwrap_or_default()
    }

    /// Replace `peek()` with the variable holding the top value, if promoted
    fn resolve_peek(&self, expr: &Expr, peek: Option<ValueId>) -> Expr {
        let Some(var) = peek.and_then(|p| self.var(p)) else {
            return expr.clone();
        };
        expr.substitute(&|e| matches!(e.kind(), ExprKind::Peek), &|_| Expr::variable(var))
            .unwrap_or_else(|| expr.clone())
    }

    /// Promotion of `group`: `Some(vars)` if all promoted, `None` if none
    fn all_or_nothing(
        &self,
        vertex: VertexId,
        op: &Op,
        group: &[ValueId],
    ) -> GraphResult<Option<Vec<VarId>>> {
        let vars: Vec<Option<VarId>> = group.iter().map(|&v| self.var(v)).collect();
        if vars.iter().all(Option::is_some) {
            Ok(Some(vars.into_iter().flatten().collect()))
        } else if vars.iter().all(Option::is_none) {
            Ok(None)
        } else {
            Err(GraphError::Unstackify {
                vertex,
                reason: format!("{} has operands both on the stack and in variables", op.name()),
            })
        }
    }

    fn rewrite_vertex(&self, id: VertexId, kind: &VertexKind) -> GraphResult<VertexKind> {
        let rewrite_ops = |ops: &[Op]| -> GraphResult<Vec<Op>> {
            ops.iter()
                .enumerate()
                .map(|(index, op)| self.rewrite_op((id, index), op))
                .collect()
        };
        let branch = |len: usize| self.record((id, len));

        Ok(match kind {
            VertexKind::Op(op) => VertexKind::Op(self.rewrite_op((id, 0), op)?),
            VertexKind::Block(ops) => VertexKind::Block(rewrite_ops(ops)?),
            VertexKind::Random => VertexKind::Random,
            VertexKind::Decision => {
                let record = branch(0);
                match record.inputs.first().and_then(|&v| self.var(v)) {
                    Some(var) => VertexKind::ExprDecision(Expr::variable(var)),
                    None => VertexKind::Decision,
                }
            }
            VertexKind::DecisionBlock(ops) => {
                let record = branch(ops.len());
                let body = rewrite_ops(ops)?;
                match record.inputs.first().and_then(|&v| self.var(v)) {
                    Some(var) => VertexKind::ExprDecisionBlock(body, Expr::variable(var)),
                    None => VertexKind::DecisionBlock(body),
                }
            }
            VertexKind::ExprDecision(condition) => {
                let record = branch(0);
                VertexKind::ExprDecision(self.resolve_peek(condition, record.peek))
            }
            VertexKind::ExprDecisionBlock(ops, condition) => {
                let record = branch(ops.len());
                VertexKind::ExprDecisionBlock(
                    rewrite_ops(ops)?,
                    self.resolve_peek(condition, record.peek),
                )
            }
        })
    }

    fn rewrite_op(&self, site: Site, op: &Op) -> GraphResult<Op> {
        let Some(record) = self.sites.get(&site) else {
            // Ops that neither pop nor peek leave no record; their output
            // may still be promoted.
            return Ok(self.rewrite_writer(site, op, None));
        };
        let inputs = &record.inputs;
        let peek = record.peek;
        let input = |n: usize| inputs.get(n).copied();
        let var_of = |n: usize| input(n).and_then(|v| self.var(v));

        Ok(match op {
            Op::Pop => match var_of(0) {
                Some(_) => Op::Nop,
                None => Op::Pop,
            },
            Op::VarSet(target) => match var_of(0) {
                Some(var) => Op::ExprVarSet {
                    var: *target,
                    value: Expr::variable(var),
                },
                None => op.clone(),
            },
            Op::Output { ascii } => match var_of(0) {
                Some(var) => Op::ExprOutput {
                    value: Expr::variable(var),
                    ascii: *ascii,
                },
                None => op.clone(),
            },
            Op::Swap => match self.all_or_nothing(site.0, op, inputs)? {
                Some(_) => Op::Nop,
                None => Op::Swap,
            },
            Op::Dup => {
                let copy = self.writer_var(site, 0);
                let mut group = inputs.clone();
                group.truncate(1);
                match (self.all_or_nothing(site.0, op, &group)?, copy) {
                    (Some(vars), Some(var)) => Op::ExprVarSet {
                        var,
                        value: Expr::variable(vars[0]),
                    },
                    (None, None) => Op::Dup,
                    _ => {
                        return Err(GraphError::Unstackify {
                            vertex: site.0,
                            reason: "Dup copy and source disagree on promotion".to_string(),
                        })
                    }
                }
            }
            Op::BinaryMath(_) | Op::Not | Op::Get | Op::Set => {
                let result = self.writer_var(site, 0);
                match self.all_or_nothing(site.0, op, inputs)? {
                    None if result.is_none() => op.clone(),
                    Some(vars) => self.fold_operands(site, op, &vars, result)?,
                    None => {
                        return Err(GraphError::Unstackify {
                            vertex: site.0,
                            reason: format!("{} result promoted without its operands", op.name()),
                        })
                    }
                }
            }
            _ => self.rewrite_writer(site, op, peek),
        })
    }

    /// `BinaryMath`/`Not`/`Get`/`Set` with every operand in a variable
    fn fold_operands(
        &self,
        site: Site,
        op: &Op,
        vars: &[VarId],
        result: Option<VarId>,
    ) -> GraphResult<Op> {
        let operand = |n: usize| Expr::variable(vars[n]);
        let assign = |value: Expr| -> GraphResult<Op> {
            let var = result.ok_or_else(|| GraphError::Unstackify {
                vertex: site.0,
                reason: format!("{} operands promoted without its result", op.name()),
            })?;
            Ok(Op::ExprVarSet { var, value })
        };
        match op {
            // Operands are recorded in pop order: top first.
            Op::BinaryMath(math) => assign(Expr::binary(operand(1), operand(0), *math)),
            Op::Not => assign(Expr::not(operand(0))),
            Op::Get => assign(Expr::memory_get(operand(1), operand(0))),
            Op::Set => Ok(Op::ExprSet {
                x: operand(1),
                y: operand(0),
                value: operand(2),
            }),
            _ => Err(GraphError::Unstackify {
                vertex: site.0,
                reason: format!("{} has no operand form", op.name()),
            }),
        }
    }

    /// Ops that only push (and possibly peek)
    fn rewrite_writer(&self, site: Site, op: &Op, peek: Option<ValueId>) -> Op {
        let result = self.writer_var(site, 0);
        match op {
            Op::Push(value) => {
                let value = self.resolve_peek(value, peek);
                match result {
                    Some(var) => Op::ExprVarSet { var, value },
                    None => Op::Push(value),
                }
            }
            Op::ExprGet { x, y } => {
                let (x, y) = (self.resolve_peek(x, peek), self.resolve_peek(y, peek));
                match result {
                    Some(var) => Op::ExprVarSet {
                        var,
                        value: Expr::memory_get(x, y),
                    },
                    None => Op::ExprGet { x, y },
                }
            }
            Op::VarGet(source) => match result {
                Some(var) => Op::ExprVarSet {
                    var,
                    value: Expr::variable(*source),
                },
                None => op.clone(),
            },
            Op::Input { ascii } => match result {
                Some(var) => Op::InputVarSet { var, ascii: *ascii },
                None => op.clone(),
            },
            Op::ExprSet { x, y, value } => Op::ExprSet {
                x: self.resolve_peek(x, peek),
                y: self.resolve_peek(y, peek),
                value: self.resolve_peek(value, peek),
            },
            Op::ExprVarSet { var, value } => Op::ExprVarSet {
                var: *var,
                value: self.resolve_peek(value, peek),
            },
            Op::ExprOutput { value, ascii } => Op::ExprOutput {
                value: self.resolve_peek(value, peek),
                ascii: *ascii,
            },
            _ => op.clone(),
        }
    }
}
