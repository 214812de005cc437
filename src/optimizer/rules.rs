//! Rule catalog.
//!
//! # Peephole rules
//!
//! | Pattern | Replacement |
//! |---------|-------------|
//! | `Nop` | (remove) |
//! | `Push; Pop` | (remove) |
//! | `Dup; Pop` | (remove) |
//! | `Swap; Swap` | (remove) |
//! | `Push a; Push b; BinaryMath op` | `Push (a op b)` |
//! | `Push a; Not` | `Push !a` |
//! | `Push a; Dup` | `Push a; Push a` |
//! | `Dup` | `Push peek()` |
//! | `Push a; Push b; Swap` | `Push b; Push a` |
//! | `Push x; Push y; Get` | `Push gr[x,y]` |
//! | `Push v; Push x; Push y; Set` | `gr[x,y] = v` |
//! | `Push v; Output` | `out v` |
//! | `out 'a'; out 'b'` | `out "ab"` |
//! | `VarGet x` | `Push x` |
//! | `Push v; VarSet x` | `x = v` |
//! | `Input; VarSet x` | `x = in` |
//! | `Push c; Decision` | `if c` |
//!
//! Only the first expression of a fused sequence may read the stack through
//! `peek()`: the others would see a different top once the earlier pushes are
//! folded away.
//!
//! # Block rules
//!
//! Straight-line vertices fuse into `Block`s; a block or op followed by a
//! decision fuses into a decision block. Block rules never extract, so a
//! vertex with several predecessors always starts a new block.

use crate::ir::position::merge_positions;
use crate::ir::{Expr, ExprKind, Op, Vec2i, Vertex, VertexKind};

use super::mod_rule::ModRule;

pub const REMOVE_NOP: &str = "remove_nop";
pub const PUSH_POP: &str = "push_pop";
pub const DUP_POP: &str = "dup_pop";
pub const SWAP_SWAP: &str = "swap_swap";
pub const FOLD_BINARY_MATH: &str = "fold_binary_math";
pub const FOLD_NOT: &str = "fold_not";
pub const DUPLICATE_PUSH: &str = "duplicate_push";
pub const DUP_TO_PEEK: &str = "dup_to_peek";
pub const SWAP_PUSHES: &str = "swap_pushes";
pub const FOLD_GET: &str = "fold_get";
pub const FOLD_SET: &str = "fold_set";
pub const FOLD_OUTPUT: &str = "fold_output";
pub const FUSE_STRING_OUTPUT: &str = "fuse_string_output";
pub const VAR_GET_TO_PUSH: &str = "var_get_to_push";
pub const FOLD_VAR_SET: &str = "fold_var_set";
pub const FOLD_INPUT_VAR_SET: &str = "fold_input_var_set";
pub const FOLD_DECISION: &str = "fold_decision";

pub const COMBINE_BLOCK: &str = "combine_block";
pub const COMBINE_DECISION_BLOCK: &str = "combine_decision_block";
pub const COMBINE_EXPR_DECISION_BLOCK: &str = "combine_expr_decision_block";

// ============================================================================
// Matchers
// ============================================================================

fn is_op(vertex: &Vertex, pred: impl Fn(&Op) -> bool) -> bool {
    vertex.op().is_some_and(pred)
}

fn is_push(vertex: &Vertex) -> bool {
    is_op(vertex, |op| matches!(op, Op::Push(_)))
}

/// A push whose value does not depend on the current stack
fn is_stack_free_push(vertex: &Vertex) -> bool {
    is_op(vertex, |op| matches!(op, Op::Push(value) if !value.reads_stack()))
}

fn is_peek_push(vertex: &Vertex) -> bool {
    is_op(vertex, |op| matches!(op, Op::Push(value) if matches!(value.kind(), ExprKind::Peek)))
}

fn is_constant_char_output(vertex: &Vertex) -> bool {
    is_op(vertex, |op| match op {
        Op::ExprOutput { value, ascii: true } => value.as_constant().and_then(to_char).is_some(),
        Op::StringOutput(_) => true,
        _ => false,
    })
}

fn is_straight_line(vertex: &Vertex) -> bool {
    matches!(vertex.kind, VertexKind::Op(_) | VertexKind::Block(_))
}

// ============================================================================
// Builders
// ============================================================================

fn pushed(vertex: &Vertex) -> Option<Expr> {
    match vertex.op()? {
        Op::Push(value) => Some(value.clone()),
        _ => None,
    }
}

fn at(kind: impl Into<VertexKind>, positions: &[Vec2i]) -> Vertex {
    Vertex::new(kind, positions.to_vec())
}

fn to_char(value: i64) -> Option<char> {
    u32::try_from(value).ok().and_then(char::from_u32)
}

fn output_text(vertex: &Vertex) -> Option<String> {
    match vertex.op()? {
        Op::ExprOutput { value, ascii: true } => value.as_constant().and_then(to_char).map(String::from),
        Op::StringOutput(text) => Some(text.clone()),
        _ => None,
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Rules run to a fixed point before and after unstackify
pub fn peephole_rules() -> Vec<ModRule> {
    vec![
        ModRule::new(REMOVE_NOP).matching(Vertex::is_nop),
        ModRule::new(PUSH_POP)
            .matching(is_push)
            .matching(|v| is_op(v, |op| matches!(op, Op::Pop))),
        ModRule::new(DUP_POP)
            .matching(|v| is_op(v, |op| matches!(op, Op::Dup)))
            .matching(|v| is_op(v, |op| matches!(op, Op::Pop))),
        ModRule::new(SWAP_SWAP)
            .matching(|v| is_op(v, |op| matches!(op, Op::Swap)))
            .matching(|v| is_op(v, |op| matches!(op, Op::Swap))),
        ModRule::new(FOLD_BINARY_MATH)
            .matching(is_push)
            .matching(is_stack_free_push)
            .matching(|v| is_op(v, |op| matches!(op, Op::BinaryMath(_))))
            .emit(|chain, positions| {
                let Some(Op::BinaryMath(op)) = chain[2].op() else {
                    return None;
                };
                let value = Expr::binary(pushed(&chain[0])?, pushed(&chain[1])?, *op);
                Some(at(Op::Push(value), positions))
            }),
        ModRule::new(FOLD_NOT)
            .matching(is_push)
            .matching(|v| is_op(v, |op| matches!(op, Op::Not)))
            .emit(|chain, positions| {
                Some(at(Op::Push(Expr::not(pushed(&chain[0])?)), positions))
            }),
        ModRule::new(DUPLICATE_PUSH)
            .matching(is_stack_free_push)
            .matching(|v| is_peek_push(v) || is_op(v, |op| matches!(op, Op::Dup)))
            .emit(|chain, _| Some(chain[0].detached()))
            .emit(|chain, _| {
                let mut copy = chain[1].detached();
                copy.kind = VertexKind::Op(Op::Push(pushed(&chain[0])?));
                Some(copy)
            }),
        ModRule::new(DUP_TO_PEEK)
            .matching(|v| is_op(v, |op| matches!(op, Op::Dup)))
            .emit(|_, positions| Some(at(Op::Push(Expr::peek()), positions))),
        ModRule::new(SWAP_PUSHES)
            .matching(is_stack_free_push)
            .matching(is_stack_free_push)
            .matching(|v| is_op(v, |op| matches!(op, Op::Swap)))
            .emit(|chain, _| Some(chain[1].detached()))
            .emit(|chain, _| {
                let mut moved = chain[0].detached();
                merge_positions(&mut moved.positions, &chain[2].positions);
                Some(moved)
            }),
        ModRule::new(FOLD_GET)
            .matching(is_push)
            .matching(is_stack_free_push)
            .matching(|v| is_op(v, |op| matches!(op, Op::Get)))
            .emit(|chain, positions| {
                let value = Expr::memory_get(pushed(&chain[0])?, pushed(&chain[1])?);
                Some(at(Op::Push(value), positions))
            }),
        ModRule::new(FOLD_SET)
            .matching(is_push)
            .matching(is_stack_free_push)
            .matching(is_stack_free_push)
            .matching(|v| is_op(v, |op| matches!(op, Op::Set)))
            .emit(|chain, positions| {
                Some(at(
                    Op::ExprSet {
                        x: pushed(&chain[1])?,
                        y: pushed(&chain[2])?,
                        value: pushed(&chain[0])?,
                    },
                    positions,
                ))
            }),
        ModRule::new(FOLD_OUTPUT)
            .matching(is_push)
            .matching(|v| is_op(v, |op| matches!(op, Op::Output { .. })))
            .emit(|chain, positions| {
                let Some(Op::Output { ascii }) = chain[1].op() else {
                    return None;
                };
                Some(at(
                    Op::ExprOutput {
                        value: pushed(&chain[0])?,
                        ascii: *ascii,
                    },
                    positions,
                ))
            }),
        ModRule::new(FUSE_STRING_OUTPUT)
            .matching(is_constant_char_output)
            .matching(is_constant_char_output)
            .emit(|chain, positions| {
                let text = output_text(&chain[0])? + &output_text(&chain[1])?;
                Some(at(Op::StringOutput(text), positions))
            }),
        ModRule::new(VAR_GET_TO_PUSH)
            .matching(|v| is_op(v, |op| matches!(op, Op::VarGet(_))))
            .emit(|chain, positions| {
                let Some(Op::VarGet(var)) = chain[0].op() else {
                    return None;
                };
                Some(at(Op::Push(Expr::variable(*var)), positions))
            }),
        ModRule::new(FOLD_VAR_SET)
            .matching(is_push)
            .matching(|v| is_op(v, |op| matches!(op, Op::VarSet(_))))
            .emit(|chain, positions| {
                let Some(Op::VarSet(var)) = chain[1].op() else {
                    return None;
                };
                Some(at(
                    Op::ExprVarSet {
                        var: *var,
                        value: pushed(&chain[0])?,
                    },
                    positions,
                ))
            }),
        ModRule::new(FOLD_INPUT_VAR_SET)
            .matching(|v| is_op(v, |op| matches!(op, Op::Input { .. })))
            .matching(|v| is_op(v, |op| matches!(op, Op::VarSet(_))))
            .emit(|chain, positions| {
                let (Some(Op::Input { ascii }), Some(Op::VarSet(var))) = (chain[0].op(), chain[1].op())
                else {
                    return None;
                };
                Some(at(
                    Op::InputVarSet {
                        var: *var,
                        ascii: *ascii,
                    },
                    positions,
                ))
            }),
        ModRule::new(FOLD_DECISION)
            .matching(is_push)
            .matching(|v| matches!(v.kind, VertexKind::Decision))
            .allow_split_exit()
            .emit(|chain, positions| {
                Some(at(VertexKind::ExprDecision(pushed(&chain[0])?), positions))
            }),
    ]
}

/// Rules that fuse straight-line runs; applied once the graph is otherwise
/// final
pub fn block_rules() -> Vec<ModRule> {
    vec![
        ModRule::new(COMBINE_BLOCK)
            .matching(is_straight_line)
            .matching(is_straight_line)
            .without_extraction()
            .emit(|chain, positions| {
                Some(at(VertexKind::Block(concat_ops(chain)), positions))
            }),
        ModRule::new(COMBINE_DECISION_BLOCK)
            .matching(is_straight_line)
            .matching(|v| matches!(v.kind, VertexKind::Decision | VertexKind::DecisionBlock(_)))
            .without_extraction()
            .allow_split_exit()
            .emit(|chain, positions| {
                Some(at(VertexKind::DecisionBlock(concat_ops(chain)), positions))
            }),
        ModRule::new(COMBINE_EXPR_DECISION_BLOCK)
            .matching(is_straight_line)
            .matching(|v| v.condition().is_some())
            .without_extraction()
            .allow_split_exit()
            .emit(|chain, positions| {
                let condition = chain[1].condition()?.clone();
                Some(at(
                    VertexKind::ExprDecisionBlock(concat_ops(chain), condition),
                    positions,
                ))
            }),
    ]
}

fn concat_ops(chain: &[Vertex]) -> Vec<Op> {
    chain
        .iter()
        .flat_map(|vertex| vertex.ops().iter().cloned())
        .collect()
}
