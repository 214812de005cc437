//! Value expressions owned by vertices.
//!
//! Expressions are plain value trees compared structurally. Compound nodes
//! can only be built through the smart constructors in [`simplify`], which
//! fold constants and apply algebraic identities at construction time, so
//! every `Expr` in the graph is already in simplified form.
//!
//! # Operand order
//!
//! `BinaryMath { lhs, rhs }` follows Befunge-93 stack order: for `a b -`
//! the second-popped value is `lhs` and the top of stack is `rhs`.

mod simplify;


use std::fmt;

use super::codegen::{ExpressionGenerator, TextGenerator};
use super::effects::{MemoryAccess, SideEffects};

/// Identifier of a declared variable (see `Graph::variables`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Binary operators with exact Befunge-93 integer semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl BinaryOp {
    /// Infix symbol used by the text generator
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Ge => ">=",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }

    /// Relations always evaluate to 0 or 1
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    /// The relation that holds exactly when `self` does not
    pub fn negated(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Gt => Some(BinaryOp::Le),
            BinaryOp::Le => Some(BinaryOp::Gt),
            BinaryOp::Lt => Some(BinaryOp::Ge),
            BinaryOp::Ge => Some(BinaryOp::Lt),
            BinaryOp::Eq => Some(BinaryOp::Ne),
            BinaryOp::Ne => Some(BinaryOp::Eq),
            _ => None,
        }
    }

    /// Evaluate `lhs op rhs`.
    ///
    /// Arithmetic wraps on overflow; division and modulo by zero yield 0.
    pub fn evaluate(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
            BinaryOp::Div if rhs == 0 => 0,
            BinaryOp::Div => lhs.wrapping_div(rhs),
            BinaryOp::Mod if rhs == 0 => 0,
            BinaryOp::Mod => lhs.wrapping_rem(rhs),
            BinaryOp::Gt => (lhs > rhs) as i64,
            BinaryOp::Lt => (lhs < rhs) as i64,
            BinaryOp::Ge => (lhs >= rhs) as i64,
            BinaryOp::Le => (lhs <= rhs) as i64,
            BinaryOp::Eq => (lhs == rhs) as i64,
            BinaryOp::Ne => (lhs != rhs) as i64,
        }
    }
}

/// A simplified value expression.
///
/// The node itself is private so that `BinaryMath`, `Not` and `BoolCast`
/// can only be produced by [`Expr::binary`], [`Expr::not`] and
/// [`Expr::bool_cast`]. Inspect it through [`Expr::kind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expr(ExprKind);

/// Expression node variants
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Constant(i64),
    Variable(VarId),
    BinaryMath {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    BoolCast(Box<Expr>),
    /// Top of the operand stack, read without popping (0 if empty)
    Peek,
    /// Memory grid cell at `(x, y)`
    MemoryGet { x: Box<Expr>, y: Box<Expr> },
}

impl Expr {
    pub fn constant(value: i64) -> Self {
        Expr(ExprKind::Constant(value))
    }

    pub fn variable(var: VarId) -> Self {
        Expr(ExprKind::Variable(var))
    }

    pub fn peek() -> Self {
        Expr(ExprKind::Peek)
    }

    /// Memory read; never folded because the grid is mutable at runtime
    pub fn memory_get(x: Expr, y: Expr) -> Self {
        Expr(ExprKind::MemoryGet {
            x: Box::new(x),
            y: Box::new(y),
        })
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0
    }

    pub fn as_constant(&self) -> Option<i64> {
        match self.0 {
            ExprKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.as_constant().is_some()
    }

    /// Structural identity
    pub fn is_identical(&self, other: &Expr) -> bool {
        self == other
    }

    /// True if the expression always evaluates to 0 or 1
    pub fn is_boolean(&self) -> bool {
        match &self.0 {
            ExprKind::Constant(value) => *value == 0 || *value == 1,
            ExprKind::BinaryMath { op, .. } => op.is_relational(),
            ExprKind::Not(_) | ExprKind::BoolCast(_) => true,
            _ => false,
        }
    }

    /// Direct sub-expressions, left to right
    pub fn children(&self) -> Vec<&Expr> {
        match &self.0 {
            ExprKind::Constant(_) | ExprKind::Variable(_) | ExprKind::Peek => Vec::new(),
            ExprKind::BinaryMath { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            ExprKind::Not(inner) | ExprKind::BoolCast(inner) => vec![inner.as_ref()],
            ExprKind::MemoryGet { x, y } => vec![x.as_ref(), y.as_ref()],
        }
    }

    /// True if `pred` holds for this node or any descendant
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|child| child.any(pred))
    }

    /// Side effects derived structurally from the leaves
    pub fn side_effects(&self) -> SideEffects {
        let own = match &self.0 {
            ExprKind::Variable(_) => SideEffects::VARIABLES,
            ExprKind::Peek => SideEffects::STACK,
            ExprKind::MemoryGet { .. } => SideEffects::GRID,
            _ => SideEffects::NONE,
        };
        self.children()
            .into_iter()
            .fold(own, |acc, child| acc | child.side_effects())
    }

    pub fn reads_stack(&self) -> bool {
        self.any(&|e| matches!(e.0, ExprKind::Peek))
    }

    /// Append every variable read by this expression
    pub fn collect_variables(&self, out: &mut Vec<VarId>) {
        if let ExprKind::Variable(var) = self.0 {
            out.push(var);
        }
        for child in self.children() {
            child.collect_variables(out);
        }
    }

    /// Append every memory read performed by this expression
    pub fn collect_memory_access(&self, out: &mut Vec<MemoryAccess>) {
        if let ExprKind::MemoryGet { x, y } = &self.0 {
            out.push(MemoryAccess::from_coordinates(x, y));
        }
        for child in self.children() {
            child.collect_memory_access(out);
        }
    }

    /// Replace every sub-expression matching `pred` with `rewrite(it)`.
    ///
    /// Matching is top-down: a replaced node is not searched further.
    /// Parents of replaced nodes are rebuilt through the smart constructors
    /// so the result stays simplified. Returns `None` if nothing matched.
    pub fn substitute(
        &self,
        pred: &dyn Fn(&Expr) -> bool,
        rewrite: &dyn Fn(&Expr) -> Expr,
    ) -> Option<Expr> {
        if pred(self) {
            return Some(rewrite(self));
        }
        match &self.0 {
            ExprKind::Constant(_) | ExprKind::Variable(_) | ExprKind::Peek => None,
            ExprKind::BinaryMath { op, lhs, rhs } => {
                let new_lhs = lhs.substitute(pred, rewrite);
                let new_rhs = rhs.substitute(pred, rewrite);
                if new_lhs.is_none() && new_rhs.is_none() {
                    return None;
                }
                Some(Expr::binary(
                    new_lhs.unwrap_or_else(|| (**lhs).clone()),
                    new_rhs.unwrap_or_else(|| (**rhs).clone()),
                    *op,
                ))
            }
            ExprKind::Not(inner) => inner.substitute(pred, rewrite).map(Expr::not),
            ExprKind::BoolCast(inner) => inner.substitute(pred, rewrite).map(Expr::bool_cast),
            ExprKind::MemoryGet { x, y } => {
                let new_x = x.substitute(pred, rewrite);
                let new_y = y.substitute(pred, rewrite);
                if new_x.is_none() && new_y.is_none() {
                    return None;
                }
                Some(Expr::memory_get(
                    new_x.unwrap_or_else(|| (**x).clone()),
                    new_y.unwrap_or_else(|| (**y).clone()),
                ))
            }
        }
    }

    /// Render in arithmetic context
    pub fn generate<G: ExpressionGenerator + ?Sized>(&self, gen: &G, wide: bool) -> String {
        match &self.0 {
            ExprKind::Constant(value) => gen.constant(*value, wide),
            ExprKind::Variable(var) => gen.variable(*var, wide),
            ExprKind::BinaryMath { op, lhs, rhs } => gen.binary_math(*op, lhs, rhs, wide),
            ExprKind::Not(inner) => gen.not(inner, wide),
            ExprKind::BoolCast(inner) => gen.bool_cast(inner, wide),
            ExprKind::Peek => gen.peek(wide),
            ExprKind::MemoryGet { x, y } => gen.memory_get(x, y, wide),
        }
    }

    /// Render as a branch condition
    pub fn generate_decision<G: ExpressionGenerator + ?Sized>(&self, gen: &G) -> String {
        match &self.0 {
            ExprKind::Constant(value) => gen.constant_decision(*value),
            ExprKind::Variable(var) => gen.variable_decision(*var),
            ExprKind::BinaryMath { op, lhs, rhs } => gen.binary_math_decision(*op, lhs, rhs),
            ExprKind::Not(inner) => gen.not_decision(inner),
            ExprKind::BoolCast(inner) => gen.bool_cast_decision(inner),
            ExprKind::Peek => gen.peek_decision(),
            ExprKind::MemoryGet { x, y } => gen.memory_get_decision(x, y),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.generate(&TextGenerator, false))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::constant(value)
    }
}
