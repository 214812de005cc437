//! Unit tests for the rewrite engine, the passes and the driver.

use super::rules::{DUPLICATE_PUSH, FOLD_BINARY_MATH, FOLD_OUTPUT, PUSH_POP, SWAP_PUSHES};
use super::*;
use crate::ir::{BinaryOp, Expr, GraphError, Op, VarId, Vertex, VertexId, VertexKind};

fn chain(graph: &mut Graph, kinds: Vec<VertexKind>) -> Vec<VertexId> {
    let ids: Vec<VertexId> = kinds
        .into_iter()
        .enumerate()
        .map(|(x, kind)| graph.add_vertex(Vertex::at(kind, x as i32, 0)))
        .collect();
    for pair in ids.windows(2) {
        graph.connect(pair[0], pair[1]).unwrap();
    }
    graph.set_root(ids[0]).unwrap();
    ids
}

fn push(value: i64) -> VertexKind {
    Op::Push(Expr::constant(value)).into()
}

fn op(op: Op) -> VertexKind {
    op.into()
}

fn rule(name: &str) -> ModRule {
    peephole_rules()
        .into_iter()
        .find(|rule| rule.name() == name)
        .unwrap()
}

fn root_op(graph: &Graph) -> Op {
    let root = graph.root().unwrap();
    graph.vertex(root).unwrap().op().cloned().unwrap()
}

// ========================================================================
// ModRule engine
// ========================================================================

#[test]
fn test_fold_binary_math_replaces_chain() {
    let mut graph = Graph::new(4, 1);
    chain(&mut graph, vec![push(3), push(4), op(Op::BinaryMath(BinaryOp::Add))]);

    assert_eq!(rule(FOLD_BINARY_MATH).apply(&mut graph).unwrap(), 1);
    assert_eq!(graph.len(), 1);
    assert_eq!(root_op(&graph), Op::Push(Expr::constant(7)));

    let root = graph.vertex(graph.root().unwrap()).unwrap();
    assert_eq!(root.positions.len(), 3);
    assert_eq!(predict_stack_size(&graph).unwrap(), StackSize::Bounded(1));
}

#[test]
fn test_subtraction_keeps_operand_order() {
    let mut graph = Graph::new(4, 1);
    chain(&mut graph, vec![push(9), push(2), op(Op::BinaryMath(BinaryOp::Sub))]);
    rule(FOLD_BINARY_MATH).apply(&mut graph).unwrap();
    assert_eq!(root_op(&graph), Op::Push(Expr::constant(7)));
}

#[test]
fn test_identity_rewrite_is_rejected() {
    let mut graph = Graph::new(2, 1);
    chain(&mut graph, vec![op(Op::Nop), op(Op::Output { ascii: false })]);
    let identity = ModRule::new("identity")
        .matching(Vertex::is_nop)
        .emit(|chain, _| Some(chain[0].detached()));

    assert_eq!(identity.apply(&mut graph).unwrap(), 0);
    assert_eq!(graph.len(), 2);
}

#[test]
fn test_root_moves_to_replacement_head() {
    let mut graph = Graph::new(4, 1);
    let ids = chain(
        &mut graph,
        vec![
            push(3),
            push(4),
            op(Op::BinaryMath(BinaryOp::Add)),
            op(Op::Output { ascii: false }),
        ],
    );

    rule(FOLD_BINARY_MATH).apply(&mut graph).unwrap();
    let root = graph.root().unwrap();
    assert_ne!(root, ids[0]);
    assert_eq!(graph.vertex(root).unwrap().children.as_slice(), &[ids[3]]);
    assert_eq!(graph.vertex(ids[3]).unwrap().parents.as_slice(), &[root]);
    assert!(graph.test_graph().is_ok());
}

#[test]
fn test_empty_replacement_bridges_predecessors() {
    let mut graph = Graph::new(4, 1);
    let ids = chain(
        &mut graph,
        vec![
            op(Op::Input { ascii: false }),
            push(1),
            op(Op::Pop),
            op(Op::Output { ascii: false }),
        ],
    );

    assert_eq!(rule(PUSH_POP).apply(&mut graph).unwrap(), 1);
    assert_eq!(graph.len(), 2);
    assert_eq!(graph.vertex(ids[0]).unwrap().children.as_slice(), &[ids[3]]);
    assert_eq!(graph.vertex(ids[3]).unwrap().parents.as_slice(), &[ids[0]]);
    assert!(graph.test_graph().is_ok());
}

#[test]
fn test_shared_suffix_is_extracted() {
    // input -> if (true: push 3, false: nop) -> push 4 -> add -> output
    let mut graph = Graph::new(8, 2);
    let input = graph.add_vertex(Vertex::at(Op::Input { ascii: false }, 0, 0));
    let decision = graph.add_vertex(Vertex::at(VertexKind::Decision, 1, 0));
    let three = graph.add_vertex(Vertex::at(push(3), 2, 0));
    let nop = graph.add_vertex(Vertex::at(Op::Nop, 1, 1));
    let four = graph.add_vertex(Vertex::at(push(4), 3, 0));
    let add = graph.add_vertex(Vertex::at(Op::BinaryMath(BinaryOp::Add), 4, 0));
    let output = graph.add_vertex(Vertex::at(Op::Output { ascii: false }, 5, 0));
    graph.connect(input, decision).unwrap();
    graph.connect(decision, three).unwrap();
    graph.connect(decision, nop).unwrap();
    graph.connect(three, four).unwrap();
    graph.connect(nop, four).unwrap();
    graph.connect(four, add).unwrap();
    graph.connect(add, output).unwrap();
    graph.set_root(input).unwrap();

    assert_eq!(rule(FOLD_BINARY_MATH).apply(&mut graph).unwrap(), 1);
    assert!(graph.test_graph().is_ok());

    let decision_vertex = graph.vertex(decision).unwrap();
    let folded = decision_vertex.edge_true().unwrap();
    assert_eq!(decision_vertex.edge_false(), Some(nop));
    assert_eq!(
        graph.vertex(folded).unwrap().op(),
        Some(&Op::Push(Expr::constant(7)))
    );

    // The false path still executes the original suffix.
    assert_eq!(graph.vertex(nop).unwrap().children.as_slice(), &[four]);
    assert_eq!(graph.vertex(four).unwrap().parents.as_slice(), &[nop]);
    assert_eq!(graph.vertex(output).unwrap().parents.len(), 2);
}

#[test]
fn test_loop_header_is_not_extracted() {
    // push 3 -> L: dup -> pop -> L
    let mut graph = Graph::new(4, 1);
    let ids = chain(&mut graph, vec![push(3), op(Op::Dup), op(Op::Pop)]);
    graph.connect(ids[2], ids[1]).unwrap();

    assert_eq!(rule(DUPLICATE_PUSH).apply(&mut graph).unwrap(), 0);
    assert_eq!(graph.len(), 3);
    assert_eq!(graph.vertex(ids[1]).unwrap().parents.as_slice(), &[ids[0], ids[2]]);
    assert!(graph.test_graph().is_ok());
}

#[test]
fn test_chain_through_root_is_refused() {
    // push 3 -> (root) push 4 -> add -> back to push 3
    let mut graph = Graph::new(4, 1);
    let ids = chain(
        &mut graph,
        vec![push(3), push(4), op(Op::BinaryMath(BinaryOp::Add))],
    );
    graph.connect(ids[2], ids[0]).unwrap();
    graph.set_root(ids[1]).unwrap();

    assert_eq!(rule(FOLD_BINARY_MATH).apply(&mut graph).unwrap(), 0);
    assert_eq!(graph.root(), Some(ids[1]));
    assert_eq!(graph.len(), 3);
}

#[test]
fn test_swap_pushes_reorders() {
    let mut graph = Graph::new(4, 1);
    chain(&mut graph, vec![push(5), push(6), op(Op::Swap)]);
    assert_eq!(rule(SWAP_PUSHES).apply(&mut graph).unwrap(), 1);
    assert_eq!(
        graph.disassemble().unwrap(),
        "   0: push 6\n   1: push 5; exit"
    );
}

// ========================================================================
// Decision folding
// ========================================================================

#[test]
fn test_identical_branches_merge() {
    let mut graph = Graph::new(4, 2);
    let input = graph.add_vertex(Vertex::at(Op::Input { ascii: false }, 0, 0));
    let decision = graph.add_vertex(Vertex::at(VertexKind::Decision, 1, 0));
    let a = graph.add_vertex(Vertex::at(Op::Pop, 2, 0));
    let b = graph.add_vertex(Vertex::at(Op::Pop, 1, 1));
    let join = graph.add_vertex(Vertex::at(Op::Output { ascii: false }, 3, 0));
    graph.connect(input, decision).unwrap();
    graph.connect(decision, a).unwrap();
    graph.connect(decision, b).unwrap();
    graph.connect(a, join).unwrap();
    graph.connect(b, join).unwrap();
    graph.set_root(input).unwrap();

    assert_eq!(fold_branches(&mut graph).unwrap(), 1);
    assert!(!graph.contains(b));
    assert_eq!(graph.vertex(decision).unwrap().op(), Some(&Op::Pop));
    assert_eq!(graph.vertex(decision).unwrap().children.as_slice(), &[a]);
    assert_eq!(graph.vertex(join).unwrap().parents.as_slice(), &[a]);
    assert_eq!(graph.vertex(a).unwrap().positions.len(), 2);
    assert!(graph.test_graph().is_ok());
    assert_eq!(predict_stack_size(&graph).unwrap(), StackSize::Bounded(1));
}

#[test]
fn test_constant_decision_keeps_selected_edge() {
    let mut graph = Graph::new(4, 2);
    let decision = graph.add_vertex(Vertex::at(VertexKind::ExprDecision(Expr::constant(0)), 0, 0));
    let on_true = graph.add_vertex(Vertex::at(push(1), 1, 0));
    let on_false = graph.add_vertex(Vertex::at(push(2), 0, 1));
    graph.connect(decision, on_true).unwrap();
    graph.connect(decision, on_false).unwrap();
    graph.set_root(decision).unwrap();

    assert_eq!(fold_branches(&mut graph).unwrap(), 1);
    assert!(!graph.contains(on_true));
    let root = graph.vertex(decision).unwrap();
    assert!(root.is_nop());
    assert_eq!(root.children.as_slice(), &[on_false]);
    assert!(graph.test_graph().is_ok());
}

#[test]
fn test_negated_condition_swaps_edges() {
    let mut graph = Graph::new(4, 2);
    let var = graph.add_variable(0, false);
    let condition = Expr::not(Expr::variable(var));
    let decision = graph.add_vertex(Vertex::at(VertexKind::ExprDecision(condition), 0, 0));
    let t = graph.add_vertex(Vertex::at(push(1), 1, 0));
    let f = graph.add_vertex(Vertex::at(push(2), 0, 1));
    graph.connect(decision, t).unwrap();
    graph.connect(decision, f).unwrap();
    graph.set_root(decision).unwrap();

    assert_eq!(fold_branches(&mut graph).unwrap(), 1);
    let vertex = graph.vertex(decision).unwrap();
    assert_eq!(vertex.condition(), Some(&Expr::variable(var)));
    assert_eq!(vertex.children.as_slice(), &[f, t]);
}

#[test]
fn test_uniform_random_collapses() {
    let mut graph = Graph::new(2, 1);
    let random = graph.add_vertex(Vertex::at(VertexKind::Random, 0, 0));
    let next = graph.add_vertex(Vertex::at(Op::Output { ascii: false }, 1, 0));
    for _ in 0..4 {
        graph.connect(random, next).unwrap();
    }
    graph.set_root(random).unwrap();

    assert_eq!(fold_branches(&mut graph).unwrap(), 1);
    assert!(graph.vertex(random).unwrap().is_nop());
    assert_eq!(graph.vertex(next).unwrap().parents.as_slice(), &[random]);
    assert!(!graph.is_random());
}

// ========================================================================
// Memory substitution
// ========================================================================

#[test]
fn test_constant_cells_become_variables() {
    let mut graph = Graph::new(4, 1).with_memory(vec![10, 20, 30, 40]).unwrap();
    let c = Expr::constant;
    let ids = chain(
        &mut graph,
        vec![
            op(Op::ExprGet { x: c(1), y: c(0) }),
            op(Op::ExprSet {
                x: c(2),
                y: c(0),
                value: Expr::memory_get(c(1), c(0)),
            }),
            op(Op::ExprGet { x: c(9), y: c(0) }),
        ],
    );

    assert_eq!(substitute_constant_memory(&mut graph).unwrap(), 2);
    assert_eq!(graph.variables()[0].initial, 20);
    assert_eq!(graph.variables()[1].initial, 30);
    assert_eq!(
        graph.vertex(ids[0]).unwrap().op(),
        Some(&Op::Push(Expr::variable(VarId(0))))
    );
    assert_eq!(
        graph.vertex(ids[1]).unwrap().op(),
        Some(&Op::ExprVarSet {
            var: VarId(1),
            value: Expr::variable(VarId(0)),
        })
    );
    // Outside the grid: left alone
    assert_eq!(
        graph.vertex(ids[2]).unwrap().op(),
        Some(&Op::ExprGet { x: c(9), y: c(0) })
    );
}

#[test]
fn test_dynamic_access_blocks_substitution() {
    let mut graph = Graph::new(4, 1);
    let c = Expr::constant;
    chain(
        &mut graph,
        vec![op(Op::ExprGet { x: c(1), y: c(0) }), op(Op::Get)],
    );
    assert_eq!(substitute_constant_memory(&mut graph).unwrap(), 0);
    assert!(graph.variables().is_empty());
}

// ========================================================================
// Unstackify
// ========================================================================

#[test]
fn test_unstackify_straight_line() {
    let mut graph = Graph::new(8, 1);
    let ids = chain(
        &mut graph,
        vec![
            push(5),
            push(6),
            op(Op::Swap),
            op(Op::Pop),
            op(Op::Output { ascii: false }),
        ],
    );

    assert_eq!(unstackify(&mut graph, DEFAULT_UNSTACKIFY_DEPTH_LIMIT).unwrap(), 2);
    assert!(!graph.is_stack_access());
    assert_eq!(
        graph.vertex(ids[0]).unwrap().op(),
        Some(&Op::ExprVarSet {
            var: VarId(0),
            value: Expr::constant(5),
        })
    );
    assert!(graph.vertex(ids[2]).unwrap().is_nop());
    assert_eq!(
        graph.vertex(ids[4]).unwrap().op(),
        Some(&Op::ExprOutput {
            value: Expr::variable(VarId(1)),
            ascii: false,
        })
    );
    assert!(graph.variables().iter().all(|decl| decl.synthesized));
}

#[test]
fn test_unstackify_divergent_merge_keeps_stack() {
    // input -> if (true: push 1, false: push 2) -> output
    let mut graph = Graph::new(4, 2);
    let input = graph.add_vertex(Vertex::at(Op::Input { ascii: false }, 0, 0));
    let decision = graph.add_vertex(Vertex::at(VertexKind::Decision, 1, 0));
    let one = graph.add_vertex(Vertex::at(push(1), 2, 0));
    let two = graph.add_vertex(Vertex::at(push(2), 1, 1));
    let output = graph.add_vertex(Vertex::at(Op::Output { ascii: false }, 3, 0));
    graph.connect(input, decision).unwrap();
    graph.connect(decision, one).unwrap();
    graph.connect(decision, two).unwrap();
    graph.connect(one, output).unwrap();
    graph.connect(two, output).unwrap();
    graph.set_root(input).unwrap();

    assert_eq!(unstackify(&mut graph, DEFAULT_UNSTACKIFY_DEPTH_LIMIT).unwrap(), 1);
    assert_eq!(
        graph.vertex(input).unwrap().op(),
        Some(&Op::InputVarSet {
            var: VarId(0),
            ascii: false,
        })
    );
    assert_eq!(
        graph.vertex(decision).unwrap().condition(),
        Some(&Expr::variable(VarId(0)))
    );
    assert_eq!(graph.vertex(one).unwrap().op(), Some(&Op::Push(Expr::constant(1))));
    assert_eq!(
        graph.vertex(output).unwrap().op(),
        Some(&Op::Output { ascii: false })
    );
}

#[test]
fn test_unstackify_growing_loop_stays_on_stack() {
    // push 7 -> input -> if (true: back to push 7, false: output)
    let mut graph = Graph::new(4, 2);
    let ids = chain(
        &mut graph,
        vec![push(7), op(Op::Input { ascii: false }), VertexKind::Decision],
    );
    let output = graph.add_vertex(Vertex::at(Op::Output { ascii: false }, 2, 1));
    graph.connect(ids[2], ids[0]).unwrap();
    graph.connect(ids[2], output).unwrap();

    assert_eq!(unstackify(&mut graph, 8).unwrap(), 1);
    assert_eq!(graph.vertex(ids[0]).unwrap().op(), Some(&Op::Push(Expr::constant(7))));
    assert!(matches!(
        graph.vertex(ids[1]).unwrap().op(),
        Some(Op::InputVarSet { .. })
    ));
    assert!(matches!(
        graph.vertex(ids[2]).unwrap().kind,
        VertexKind::ExprDecision(_)
    ));
    assert_eq!(
        graph.vertex(output).unwrap().op(),
        Some(&Op::Output { ascii: false })
    );
}

// ========================================================================
// Stack-size prediction
// ========================================================================

#[test]
fn test_predict_straight_line_peak() {
    let mut graph = Graph::new(4, 1);
    chain(
        &mut graph,
        vec![push(1), push(2), op(Op::BinaryMath(BinaryOp::Add)), push(3)],
    );
    assert_eq!(predict_stack_size(&graph).unwrap(), StackSize::Bounded(2));
}

#[test]
fn test_predict_growing_cycle_is_unbounded() {
    let mut graph = Graph::new(1, 1);
    let ids = chain(&mut graph, vec![push(1)]);
    graph.connect(ids[0], ids[0]).unwrap();
    assert_eq!(predict_stack_size(&graph).unwrap(), StackSize::Unbounded);
}

#[test]
fn test_predict_balanced_cycle_is_bounded() {
    let mut graph = Graph::new(2, 1);
    let ids = chain(&mut graph, vec![push(1), op(Op::Pop)]);
    graph.connect(ids[1], ids[0]).unwrap();
    assert_eq!(predict_stack_size(&graph).unwrap(), StackSize::Bounded(1));
}

#[test]
fn test_predict_cycle_entered_on_empty_stack_is_bounded() {
    // A: pop -> B: push 5 -> A
    let mut graph = Graph::new(2, 1);
    let ids = chain(&mut graph, vec![op(Op::Pop), push(5)]);
    graph.connect(ids[1], ids[0]).unwrap();
    assert_eq!(predict_stack_size(&graph).unwrap(), StackSize::Bounded(1));
}

#[test]
fn test_predict_growth_after_clamped_entry_is_unbounded() {
    // pop -> push 1 -> push 2 -> back to pop: one clamped pass, then +1 per loop
    let mut graph = Graph::new(3, 1);
    let ids = chain(&mut graph, vec![op(Op::Pop), push(1), push(2)]);
    graph.connect(ids[2], ids[0]).unwrap();
    assert_eq!(predict_stack_size(&graph).unwrap(), StackSize::Unbounded);
}

#[test]
fn test_predict_join_at_different_depths() {
    // input -> if (true: push 1, false: nop) -> output
    let mut graph = Graph::new(4, 2);
    let input = graph.add_vertex(Vertex::at(Op::Input { ascii: false }, 0, 0));
    let decision = graph.add_vertex(Vertex::at(VertexKind::Decision, 1, 0));
    let one = graph.add_vertex(Vertex::at(push(1), 2, 0));
    let nop = graph.add_vertex(Vertex::at(Op::Nop, 1, 1));
    let output = graph.add_vertex(Vertex::at(Op::Output { ascii: false }, 3, 0));
    graph.connect(input, decision).unwrap();
    graph.connect(decision, one).unwrap();
    graph.connect(decision, nop).unwrap();
    graph.connect(one, output).unwrap();
    graph.connect(nop, output).unwrap();
    graph.set_root(input).unwrap();

    assert_eq!(predict_stack_size(&graph).unwrap(), StackSize::Bounded(1));
}

#[test]
fn test_predict_requires_root() {
    let graph = Graph::new(1, 1);
    assert_eq!(predict_stack_size(&graph), Err(GraphError::MissingRoot));
}

// ========================================================================
// Driver
// ========================================================================

#[test]
fn test_optimize_constant_program() {
    let mut graph = Graph::new(4, 1);
    chain(
        &mut graph,
        vec![
            push(3),
            push(4),
            op(Op::BinaryMath(BinaryOp::Add)),
            op(Op::Output { ascii: false }),
        ],
    );

    let mut optimizer = Optimizer::new(OptimizerConfig::default());
    let report = optimizer.optimize(&mut graph).unwrap();
    assert_eq!(graph.len(), 1);
    assert_eq!(
        root_op(&graph),
        Op::ExprOutput {
            value: Expr::constant(7),
            ascii: false,
        }
    );
    assert_eq!(report.stack_size, StackSize::Bounded(0));
    assert_eq!(report.stats.rule_count(FOLD_BINARY_MATH), 1);
    assert_eq!(report.stats.rule_count(FOLD_OUTPUT), 1);
    assert_eq!(optimizer.stats(), &report.stats);
}

#[test]
fn test_optimize_swap_program() {
    let mut graph = Graph::new(8, 1);
    chain(
        &mut graph,
        vec![
            push(5),
            push(6),
            op(Op::Swap),
            op(Op::Pop),
            op(Op::Output { ascii: false }),
        ],
    );

    let report = optimize_graph(&mut graph).unwrap();
    assert_eq!(
        root_op(&graph),
        Op::ExprOutput {
            value: Expr::constant(6),
            ascii: false,
        }
    );
    assert!(!graph.is_stack_access());
    assert_eq!(report.stack_size, StackSize::Bounded(0));
}

#[test]
fn test_optimize_loop_reaches_fixed_point() {
    // gr[0,0]; L: dup; >; if 0 (true: print, false: L)
    let mut graph = Graph::new(8, 2);
    let ids = chain(
        &mut graph,
        vec![
            push(0),
            push(0),
            op(Op::Get),
            op(Op::Dup),
            op(Op::BinaryMath(BinaryOp::Gt)),
            push(0),
            VertexKind::Decision,
        ],
    );
    let output = graph.add_vertex(Vertex::at(Op::Output { ascii: false }, 6, 1));
    graph.connect(ids[6], output).unwrap();
    graph.connect(ids[6], ids[3]).unwrap();

    let config = OptimizerConfig::default().with_max_iterations(16);
    let report = Optimizer::new(config).optimize(&mut graph).unwrap();
    assert!(report.converged);
    assert!(graph.len() <= ids.len());
    assert!(graph.test_graph().is_ok());
    for line in graph.disassemble().unwrap().lines() {
        assert!(line.len() < 80, "expression kept growing: {}", line);
    }
}

#[test]
fn test_disabled_optimizer_only_predicts() {
    let mut graph = Graph::new(4, 1);
    chain(&mut graph, vec![push(1), push(2), op(Op::Pop)]);
    let before = graph.disassemble().unwrap();

    let report = Optimizer::new(OptimizerConfig::disabled())
        .optimize(&mut graph)
        .unwrap();
    assert_eq!(graph.disassemble().unwrap(), before);
    assert_eq!(report.stack_size, StackSize::Bounded(2));
    assert_eq!(report.stats.total(), 0);
    assert!(report.converged);
}

#[test]
fn test_optimize_rejects_invalid_input() {
    let mut graph = Graph::new(2, 1);
    chain(&mut graph, vec![VertexKind::Decision, push(1)]);
    let result = optimize_graph(&mut graph);
    assert!(matches!(result, Err(GraphError::ChildCount { .. })));
}

// ========================================================================
// Configuration
// ========================================================================

#[test]
fn test_parse_partial_config() {
    let config = OptimizerConfig::parse_toml("unstackify = false\nmax_iterations = 64\n").unwrap();
    assert!(!config.unstackify);
    assert_eq!(config.max_iterations, 64);
    assert!(config.peephole);
    assert_eq!(config.unstackify_depth_limit, DEFAULT_UNSTACKIFY_DEPTH_LIMIT);
}

#[test]
fn test_parse_config_type_error() {
    let result = OptimizerConfig::parse_toml("max_iterations = \"many\"");
    assert!(matches!(result, Err(GraphError::Config(_))));
}
