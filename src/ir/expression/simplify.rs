//! Smart constructors that simplify while building.
//!
//! # Rules
//!
//! | Pattern | Result |
//! |---------|--------|
//! | `C op C'` | evaluated constant |
//! | `x+0`, `0+x`, `x-0`, `x*1`, `1*x`, `x/1` | `x` |
//! | `0/x`, `0%x`, `x*0`, `0*x`, `x%1` | `0` |
//! | `(C±X)±C'`, `C±(X±C')`, `(X±C)±C'` | single add/sub of `X` |
//! | `C*(C'*X)` and friends | `X*(C*C')` |
//! | `(X±C') == C`, `(X±C') != C` | `X == C∓C'`, `X != C∓C'` |
//! | `!!x` | `bool(x)` |
//! | `!bool(x)` | `!x` |
//! | `!(a > b)` | `a <= b` (all relations) |
//! | `bool(bool(x))`, `bool(!x)`, `bool(a > b)` | inner |
//!
//! Only constants and variables are free of reads, and the only operands
//! ever dropped are the absorbed side of `0/x`, `x*0` and friends. Those
//! operands only *read* state, so dropping them never changes behaviour.

use super::{BinaryOp, Expr, ExprKind};

/// `term` scaled by ±1 plus a constant offset.
struct Linear<'a> {
    term: &'a Expr,
    negated: bool,
    offset: i64,
}

/// Decompose `X+C`, `C+X`, `X-C` or `C-X` where `X` is not constant
fn linear(expr: &Expr) -> Option<Linear<'_>> {
    let ExprKind::BinaryMath { op, lhs, rhs } = expr.kind() else {
        return None;
    };
    match (op, lhs.as_constant(), rhs.as_constant()) {
        (BinaryOp::Add, None, Some(c)) => Some(Linear {
            term: lhs.as_ref(),
            negated: false,
            offset: c,
        }),
        (BinaryOp::Add, Some(c), None) => Some(Linear {
            term: rhs.as_ref(),
            negated: false,
            offset: c,
        }),
        (BinaryOp::Sub, None, Some(c)) => Some(Linear {
            term: lhs.as_ref(),
            negated: false,
            offset: c.wrapping_neg(),
        }),
        (BinaryOp::Sub, Some(c), None) => Some(Linear {
            term: rhs.as_ref(),
            negated: true,
            offset: c,
        }),
        _ => None,
    }
}

/// Rebuild `±term + offset` as a single add or sub
fn rebuild_linear(term: &Expr, negated: bool, offset: i64) -> Expr {
    if negated {
        raw_binary(Expr::constant(offset), term.clone(), BinaryOp::Sub)
    } else if offset == 0 {
        term.clone()
    } else if offset < 0 && offset != i64::MIN {
        raw_binary(term.clone(), Expr::constant(-offset), BinaryOp::Sub)
    } else {
        raw_binary(term.clone(), Expr::constant(offset), BinaryOp::Add)
    }
}

/// Split `X*C` or `C*X` into `(X, C)`
fn scaled(expr: &Expr) -> Option<(&Expr, i64)> {
    let ExprKind::BinaryMath {
        op: BinaryOp::Mul,
        lhs,
        rhs,
    } = expr.kind()
    else {
        return None;
    };
    match (lhs.as_constant(), rhs.as_constant()) {
        (None, Some(c)) => Some((lhs.as_ref(), c)),
        (Some(c), None) => Some((rhs.as_ref(), c)),
        _ => None,
    }
}

fn raw_binary(lhs: Expr, rhs: Expr, op: BinaryOp) -> Expr {
    Expr(ExprKind::BinaryMath {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

impl Expr {
    /// Build `lhs op rhs`, folding whatever can be folded
    pub fn binary(lhs: Expr, rhs: Expr, op: BinaryOp) -> Expr {
        let left = lhs.as_constant();
        let right = rhs.as_constant();

        if let (Some(a), Some(b)) = (left, right) {
            return Expr::constant(op.evaluate(a, b));
        }

        match op {
            BinaryOp::Add => {
                if right == Some(0) {
                    return lhs;
                }
                if left == Some(0) {
                    return rhs;
                }
                if let (Some(c), Some(l)) = (right, linear(&lhs)) {
                    return rebuild_linear(l.term, l.negated, l.offset.wrapping_add(c));
                }
                if let (Some(c), Some(r)) = (left, linear(&rhs)) {
                    return rebuild_linear(r.term, r.negated, r.offset.wrapping_add(c));
                }
            }
            BinaryOp::Sub => {
                if right == Some(0) {
                    return lhs;
                }
                if let (Some(c), Some(l)) = (right, linear(&lhs)) {
                    return rebuild_linear(l.term, l.negated, l.offset.wrapping_sub(c));
                }
                if let (Some(c), Some(r)) = (left, linear(&rhs)) {
                    // c - (±X + k) = ∓X + (c - k)
                    return rebuild_linear(r.term, !r.negated, c.wrapping_sub(r.offset));
                }
            }
            BinaryOp::Mul => {
                if right == Some(1) {
                    return lhs;
                }
                if left == Some(1) {
                    return rhs;
                }
                if right == Some(0) || left == Some(0) {
                    return Expr::constant(0);
                }
                if let (Some(c), Some((term, k))) = (right, scaled(&lhs)) {
                    return Expr::binary(term.clone(), Expr::constant(c.wrapping_mul(k)), op);
                }
                if let (Some(c), Some((term, k))) = (left, scaled(&rhs)) {
                    return Expr::binary(term.clone(), Expr::constant(c.wrapping_mul(k)), op);
                }
            }
            BinaryOp::Div => {
                if right == Some(1) {
                    return lhs;
                }
                if left == Some(0) {
                    return Expr::constant(0);
                }
            }
            BinaryOp::Mod => {
                if left == Some(0) || right == Some(1) {
                    return Expr::constant(0);
                }
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if let (Some(c), Some(l)) = (right, linear(&lhs)) {
                    return move_offset(l, c, op);
                }
                if let (Some(c), Some(r)) = (left, linear(&rhs)) {
                    return move_offset(r, c, op);
                }
            }
            _ => {}
        }

        raw_binary(lhs, rhs, op)
    }

    /// Build logical negation (`1` if zero, else `0`)
    pub fn not(value: Expr) -> Expr {
        match value.0 {
            ExprKind::Constant(c) => Expr::constant((c == 0) as i64),
            ExprKind::Not(inner) => Expr::bool_cast(*inner),
            ExprKind::BoolCast(inner) => Expr::not(*inner),
            ExprKind::BinaryMath { op, lhs, rhs } => match op.negated() {
                Some(flipped) => raw_binary(*lhs, *rhs, flipped),
                None => Expr(ExprKind::Not(Box::new(raw_binary(*lhs, *rhs, op)))),
            },
            other => Expr(ExprKind::Not(Box::new(Expr(other)))),
        }
    }

    /// Build boolean normalisation (`0` if zero, else `1`)
    pub fn bool_cast(value: Expr) -> Expr {
        if let Some(c) = value.as_constant() {
            return Expr::constant((c != 0) as i64);
        }
        if value.is_boolean() {
            return value;
        }
        Expr(ExprKind::BoolCast(Box::new(value)))
    }
}

/// `±X + k == c` becomes `X == c - k` (or `X == k - c` when negated)
fn move_offset(form: Linear<'_>, c: i64, op: BinaryOp) -> Expr {
    let target = if form.negated {
        form.offset.wrapping_sub(c)
    } else {
        c.wrapping_sub(form.offset)
    };
    raw_binary(form.term.clone(), Expr::constant(target), op)
}
