//! Code generation contract.
//!
//! Emitters for concrete target languages implement [`ExpressionGenerator`]
//! and [`VertexGenerator`]. Each expression and vertex variant calls back
//! through the method named for it, so a generator only has to know how to
//! render one construct at a time.
//!
//! Expressions are rendered in two contexts: arithmetic (`generate`, with a
//! `wide` flag for targets that distinguish fixed-width from extended integer
//! literals) and branch condition (`generate_decision`). The decision-context
//! methods default to comparing the arithmetic rendering against zero.
//!
//! Generators are plain values constructed per invocation; there is no
//! global generator registry.

mod text;

pub use text::TextGenerator;

use super::expression::{BinaryOp, Expr, VarId};

/// Per-variant callbacks for expressions
pub trait ExpressionGenerator {
    fn constant(&self, value: i64, wide: bool) -> String;
    fn variable(&self, var: VarId, wide: bool) -> String;
    fn binary_math(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr, wide: bool) -> String;
    fn not(&self, inner: &Expr, wide: bool) -> String;
    fn bool_cast(&self, inner: &Expr, wide: bool) -> String;
    fn peek(&self, wide: bool) -> String;
    fn memory_get(&self, x: &Expr, y: &Expr, wide: bool) -> String;

    /// Wrap an arithmetic rendering as a truth test
    fn truthy(&self, code: String) -> String {
        format!("({}) != 0", code)
    }

    fn constant_decision(&self, value: i64) -> String {
        let code = self.constant(value, false);
        self.truthy(code)
    }

    fn variable_decision(&self, var: VarId) -> String {
        let code = self.variable(var, false);
        self.truthy(code)
    }

    fn binary_math_decision(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> String {
        let code = self.binary_math(op, lhs, rhs, false);
        self.truthy(code)
    }

    fn not_decision(&self, inner: &Expr) -> String {
        let code = self.not(inner, false);
        self.truthy(code)
    }

    fn bool_cast_decision(&self, inner: &Expr) -> String {
        let code = self.bool_cast(inner, false);
        self.truthy(code)
    }

    fn peek_decision(&self) -> String {
        let code = self.peek(false);
        self.truthy(code)
    }

    fn memory_get_decision(&self, x: &Expr, y: &Expr) -> String {
        let code = self.memory_get(x, y, false);
        self.truthy(code)
    }
}

/// Per-variant callbacks for vertices.
///
/// Jump targets are indices into the ordered program produced by
/// `Graph::linearize`.
pub trait VertexGenerator: ExpressionGenerator {
    fn emit_nop(&self) -> String;
    fn emit_push(&self, value: &Expr) -> String;
    fn emit_pop(&self) -> String;
    fn emit_dup(&self) -> String;
    fn emit_swap(&self) -> String;
    fn emit_binary_math(&self, op: BinaryOp) -> String;
    fn emit_not(&self) -> String;
    fn emit_get(&self) -> String;
    fn emit_set(&self) -> String;
    fn emit_expr_get(&self, x: &Expr, y: &Expr) -> String;
    fn emit_expr_set(&self, x: &Expr, y: &Expr, value: &Expr) -> String;
    fn emit_var_get(&self, var: VarId) -> String;
    fn emit_var_set(&self, var: VarId) -> String;
    fn emit_expr_var_set(&self, var: VarId, value: &Expr) -> String;
    fn emit_output(&self, ascii: bool) -> String;
    fn emit_expr_output(&self, value: &Expr, ascii: bool) -> String;
    fn emit_string_output(&self, text: &str) -> String;
    fn emit_input(&self, ascii: bool) -> String;
    fn emit_input_var_set(&self, var: VarId, ascii: bool) -> String;
    fn emit_decision(&self, edge_true: usize, edge_false: usize) -> String;
    fn emit_expr_decision(&self, condition: &Expr, edge_true: usize, edge_false: usize)
        -> String;
    fn emit_random(&self, targets: &[usize]) -> String;
    fn emit_jump(&self, target: usize) -> String;
    fn emit_exit(&self) -> String;

    /// Combine the rendered body of a fused block
    fn emit_block(&self, lines: &[String]) -> String {
        lines.join("\n")
    }
}
