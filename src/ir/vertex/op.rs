//! Straight-line instructions.
//!
//! An [`Op`] never branches. A vertex either carries one op, a fused block
//! of ops, or a control-flow split (see [`super::VertexKind`]).
//!
//! Stack order follows Befunge-93: binary ops pop `a` (top) then `b` and
//! push `b op a`; `Get` pops `y` then `x`; `Set` pops `y`, `x`, then the
//! value. Popping an empty stack yields 0 and leaves the depth at 0.

use crate::ir::codegen::VertexGenerator;
use crate::ir::effects::{MemoryAccess, SideEffects};
use crate::ir::expression::{BinaryOp, Expr, VarId};

/// Straight-line instruction payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// No operation
    Nop,
    /// Push a literal or computed value
    Push(Expr),
    /// Discard top of stack
    Pop,
    /// Duplicate top of stack
    Dup,
    /// Swap top two stack elements
    Swap,
    /// Pop two, push `b op a`
    BinaryMath(BinaryOp),
    /// Pop one, push 1 if it was zero else 0
    Not,
    /// Pop `y`, `x`; push grid cell
    Get,
    /// Pop `y`, `x`, value; store into grid cell
    Set,
    /// Push grid cell at expression coordinates
    ExprGet { x: Expr, y: Expr },
    /// Store `value` into grid cell at expression coordinates
    ExprSet { x: Expr, y: Expr, value: Expr },
    /// Push a variable
    VarGet(VarId),
    /// Pop into a variable
    VarSet(VarId),
    /// Assign an expression to a variable
    ExprVarSet { var: VarId, value: Expr },
    /// Pop and print as number (`ascii == false`) or character
    Output { ascii: bool },
    /// Print an expression
    ExprOutput { value: Expr, ascii: bool },
    /// Print a constant string
    StringOutput(String),
    /// Read a number or character and push it
    Input { ascii: bool },
    /// Read a number or character into a variable
    InputVarSet { var: VarId, ascii: bool },
}

impl Op {
    /// Variant name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Op::Nop => "Nop",
            Op::Push(_) => "Push",
            Op::Pop => "Pop",
            Op::Dup => "Dup",
            Op::Swap => "Swap",
            Op::BinaryMath(_) => "BinaryMath",
            Op::Not => "Not",
            Op::Get => "Get",
            Op::Set => "Set",
            Op::ExprGet { .. } => "ExprGet",
            Op::ExprSet { .. } => "ExprSet",
            Op::VarGet(_) => "VarGet",
            Op::VarSet(_) => "VarSet",
            Op::ExprVarSet { .. } => "ExprVarSet",
            Op::Output { .. } => "Output",
            Op::ExprOutput { .. } => "ExprOutput",
            Op::StringOutput(_) => "StringOutput",
            Op::Input { .. } => "Input",
            Op::InputVarSet { .. } => "InputVarSet",
        }
    }

    /// Number of values popped and pushed, in that order
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Op::Nop
            | Op::ExprSet { .. }
            | Op::ExprVarSet { .. }
            | Op::ExprOutput { .. }
            | Op::StringOutput(_)
            | Op::InputVarSet { .. } => (0, 0),
            Op::Push(_) | Op::ExprGet { .. } | Op::VarGet(_) | Op::Input { .. } => (0, 1),
            Op::Pop | Op::VarSet(_) | Op::Output { .. } => (1, 0),
            Op::Dup => (1, 2),
            Op::Swap => (2, 2),
            Op::BinaryMath(_) | Op::Get => (2, 1),
            Op::Not => (1, 1),
            Op::Set => (3, 0),
        }
    }

    /// Net change in stack depth
    pub fn stack_delta(&self) -> i64 {
        let (pops, pushes) = self.stack_effect();
        pushes as i64 - pops as i64
    }

    /// Depth after executing once from `depth`, clamped at zero
    pub fn apply_depth(&self, depth: usize) -> usize {
        let (pops, pushes) = self.stack_effect();
        depth.saturating_sub(pops) + pushes
    }

    /// The single value this op pushes, if it is expressible as an expression
    pub fn pushed_expression(&self) -> Option<Expr> {
        match self {
            Op::Push(value) => Some(value.clone()),
            Op::ExprGet { x, y } => Some(Expr::memory_get(x.clone(), y.clone())),
            Op::VarGet(var) => Some(Expr::variable(*var)),
            _ => None,
        }
    }

    /// Expressions owned directly by this op
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            Op::Push(value) | Op::ExprVarSet { value, .. } | Op::ExprOutput { value, .. } => {
                vec![value]
            }
            Op::ExprGet { x, y } => vec![x, y],
            Op::ExprSet { x, y, value } => vec![x, y, value],
            _ => Vec::new(),
        }
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Op::Push(value) | Op::ExprVarSet { value, .. } | Op::ExprOutput { value, .. } => {
                vec![value]
            }
            Op::ExprGet { x, y } => vec![x, y],
            Op::ExprSet { x, y, value } => vec![x, y, value],
            _ => Vec::new(),
        }
    }

    /// Rewrite matching sub-expressions in place; returns true if any changed
    pub fn substitute_expressions(
        &mut self,
        pred: &dyn Fn(&Expr) -> bool,
        rewrite: &dyn Fn(&Expr) -> Expr,
    ) -> bool {
        let mut changed = false;
        for expr in self.expressions_mut() {
            if let Some(replacement) = expr.substitute(pred, rewrite) {
                *expr = replacement;
                changed = true;
            }
        }
        changed
    }

    pub fn side_effects(&self) -> SideEffects {
        let own = match self {
            Op::Nop => SideEffects::NONE,
            Op::Push(_) | Op::Pop | Op::Dup | Op::Swap | Op::BinaryMath(_) | Op::Not => {
                SideEffects::STACK
            }
            Op::Get | Op::Set | Op::ExprGet { .. } => SideEffects::STACK | SideEffects::GRID,
            Op::ExprSet { .. } => SideEffects::GRID,
            Op::VarGet(_) | Op::VarSet(_) => SideEffects::STACK | SideEffects::VARIABLES,
            Op::ExprVarSet { .. } => SideEffects::VARIABLES,
            Op::Output { .. } => SideEffects::STACK | SideEffects::OUTPUT,
            Op::ExprOutput { .. } | Op::StringOutput(_) => SideEffects::OUTPUT,
            Op::Input { .. } => SideEffects::STACK | SideEffects::INPUT,
            Op::InputVarSet { .. } => SideEffects::INPUT | SideEffects::VARIABLES,
        };
        self.expressions()
            .into_iter()
            .fold(own, |acc, expr| acc | expr.side_effects())
    }

    /// Every grid access, including reads nested in expressions
    pub fn memory_access(&self) -> Vec<MemoryAccess> {
        let mut out = Vec::new();
        match self {
            Op::Get | Op::Set => out.push(MemoryAccess::Stack),
            Op::ExprGet { x, y } | Op::ExprSet { x, y, .. } => {
                out.push(MemoryAccess::from_coordinates(x, y))
            }
            _ => {}
        }
        for expr in self.expressions() {
            expr.collect_memory_access(&mut out);
        }
        out
    }

    /// Every variable read or written
    pub fn collect_variables(&self, out: &mut Vec<VarId>) {
        match self {
            Op::VarGet(var)
            | Op::VarSet(var)
            | Op::ExprVarSet { var, .. }
            | Op::InputVarSet { var, .. } => out.push(*var),
            _ => {}
        }
        for expr in self.expressions() {
            expr.collect_variables(out);
        }
    }

    pub fn generate<G: VertexGenerator + ?Sized>(&self, gen: &G) -> String {
        match self {
            Op::Nop => gen.emit_nop(),
            Op::Push(value) => gen.emit_push(value),
            Op::Pop => gen.emit_pop(),
            Op::Dup => gen.emit_dup(),
            Op::Swap => gen.emit_swap(),
            Op::BinaryMath(op) => gen.emit_binary_math(*op),
            Op::Not => gen.emit_not(),
            Op::Get => gen.emit_get(),
            Op::Set => gen.emit_set(),
            Op::ExprGet { x, y } => gen.emit_expr_get(x, y),
            Op::ExprSet { x, y, value } => gen.emit_expr_set(x, y, value),
            Op::VarGet(var) => gen.emit_var_get(*var),
            Op::VarSet(var) => gen.emit_var_set(*var),
            Op::ExprVarSet { var, value } => gen.emit_expr_var_set(*var, value),
            Op::Output { ascii } => gen.emit_output(*ascii),
            Op::ExprOutput { value, ascii } => gen.emit_expr_output(value, *ascii),
            Op::StringOutput(text) => gen.emit_string_output(text),
            Op::Input { ascii } => gen.emit_input(*ascii),
            Op::InputVarSet { var, ascii } => gen.emit_input_var_set(*var, *ascii),
        }
    }
}
