//! Human-readable pseudo-code, used for disassembly and in tests.

use itertools::Itertools;

use super::{ExpressionGenerator, VertexGenerator};
use crate::ir::expression::{BinaryOp, Expr, VarId};

/// Renders vertices as one-line pseudo instructions
#[derive(Debug, Clone, Copy, Default)]
pub struct TextGenerator;

fn io_suffix(ascii: bool) -> &'static str {
    if ascii {
        "char"
    } else {
        "int"
    }
}

impl ExpressionGenerator for TextGenerator {
    fn constant(&self, value: i64, _wide: bool) -> String {
        value.to_string()
    }

    fn variable(&self, var: VarId, _wide: bool) -> String {
        var.to_string()
    }

    fn binary_math(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr, wide: bool) -> String {
        format!(
            "({}{}{})",
            lhs.generate(self, wide),
            op.symbol(),
            rhs.generate(self, wide)
        )
    }

    fn not(&self, inner: &Expr, wide: bool) -> String {
        format!("!{}", inner.generate(self, wide))
    }

    fn bool_cast(&self, inner: &Expr, wide: bool) -> String {
        format!("bool({})", inner.generate(self, wide))
    }

    fn peek(&self, _wide: bool) -> String {
        "peek()".to_string()
    }

    fn memory_get(&self, x: &Expr, y: &Expr, wide: bool) -> String {
        format!("gr[{},{}]", x.generate(self, wide), y.generate(self, wide))
    }

    fn truthy(&self, code: String) -> String {
        format!("{}!=0", code)
    }

    fn binary_math_decision(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> String {
        let code = self.binary_math(op, lhs, rhs, false);
        if op.is_relational() {
            code
        } else {
            self.truthy(code)
        }
    }

    fn not_decision(&self, inner: &Expr) -> String {
        format!("{}==0", inner.generate(self, false))
    }

    fn bool_cast_decision(&self, inner: &Expr) -> String {
        inner.generate_decision(self)
    }
}

impl VertexGenerator for TextGenerator {
    fn emit_nop(&self) -> String {
        "nop".to_string()
    }

    fn emit_push(&self, value: &Expr) -> String {
        format!("push {}", value.generate(self, false))
    }

    fn emit_pop(&self) -> String {
        "pop".to_string()
    }

    fn emit_dup(&self) -> String {
        "dup".to_string()
    }

    fn emit_swap(&self) -> String {
        "swap".to_string()
    }

    fn emit_binary_math(&self, op: BinaryOp) -> String {
        format!("math {}", op.symbol())
    }

    fn emit_not(&self) -> String {
        "not".to_string()
    }

    fn emit_get(&self) -> String {
        "get".to_string()
    }

    fn emit_set(&self) -> String {
        "set".to_string()
    }

    fn emit_expr_get(&self, x: &Expr, y: &Expr) -> String {
        format!("push gr[{},{}]", x.generate(self, false), y.generate(self, false))
    }

    fn emit_expr_set(&self, x: &Expr, y: &Expr, value: &Expr) -> String {
        format!(
            "gr[{},{}] = {}",
            x.generate(self, false),
            y.generate(self, false),
            value.generate(self, false)
        )
    }

    fn emit_var_get(&self, var: VarId) -> String {
        format!("push {}", var)
    }

    fn emit_var_set(&self, var: VarId) -> String {
        format!("{} = pop", var)
    }

    fn emit_expr_var_set(&self, var: VarId, value: &Expr) -> String {
        format!("{} = {}", var, value.generate(self, false))
    }

    fn emit_output(&self, ascii: bool) -> String {
        format!("out_{} pop", io_suffix(ascii))
    }

    fn emit_expr_output(&self, value: &Expr, ascii: bool) -> String {
        format!("out_{} {}", io_suffix(ascii), value.generate(self, false))
    }

    fn emit_string_output(&self, text: &str) -> String {
        format!("out_str {:?}", text)
    }

    fn emit_input(&self, ascii: bool) -> String {
        format!("push in_{}", io_suffix(ascii))
    }

    fn emit_input_var_set(&self, var: VarId, ascii: bool) -> String {
        format!("{} = in_{}", var, io_suffix(ascii))
    }

    fn emit_decision(&self, edge_true: usize, edge_false: usize) -> String {
        format!("if pop goto {} else {}", edge_true, edge_false)
    }

    fn emit_expr_decision(&self, condition: &Expr, edge_true: usize, edge_false: usize) -> String {
        format!(
            "if {} goto {} else {}",
            condition.generate_decision(self),
            edge_true,
            edge_false
        )
    }

    fn emit_random(&self, targets: &[usize]) -> String {
        format!("random {}", targets.iter().join(" "))
    }

    fn emit_jump(&self, target: usize) -> String {
        format!("goto {}", target)
    }

    fn emit_exit(&self) -> String {
        "exit".to_string()
    }

    fn emit_block(&self, lines: &[String]) -> String {
        lines.join("; ")
    }
}
