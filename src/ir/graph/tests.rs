//! Unit tests for the graph arena, validator and fall-through ordering.

use super::{Graph, VertexId};
use crate::ir::error::GraphError;
use crate::ir::expression::{BinaryOp, Expr, VarId};
use crate::ir::vertex::{Op, Vertex, VertexKind};

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

/// root -> decision -> (true: a, false: b) -> join
fn diamond() -> (Graph, [VertexId; 5]) {
    let mut graph = Graph::new(8, 2);
    let root = graph.add_vertex(Vertex::at(push(1), 0, 0));
    let decision = graph.add_vertex(Vertex::at(VertexKind::Decision, 1, 0));
    let a = graph.add_vertex(Vertex::at(push(2), 2, 0));
    let b = graph.add_vertex(Vertex::at(push(3), 1, 1));
    let join = graph.add_vertex(Vertex::at(Op::Output { ascii: false }, 3, 0));
    graph.connect(root, decision).unwrap();
    graph.connect(decision, a).unwrap();
    graph.connect(decision, b).unwrap();
    graph.connect(a, join).unwrap();
    graph.connect(b, join).unwrap();
    graph.set_root(root).unwrap();
    (graph, [root, decision, a, b, join])
}

// ========================================================================
// Arena
// ========================================================================

#[test]
fn test_connect_keeps_edges_symmetric() {
    let (graph, [_, decision, a, b, join]) = diamond();
    assert_eq!(graph.vertex(decision).unwrap().children.as_slice(), &[a, b]);
    assert_eq!(graph.vertex(join).unwrap().parents.as_slice(), &[a, b]);
    assert!(graph.test_graph().is_ok());
}

#[test]
fn test_removed_vertex_handle_is_unknown() {
    let (mut graph, [_, _, a, _, _]) = diamond();
    graph.remove_vertex(a);
    assert!(!graph.contains(a));
    assert_eq!(graph.vertex(a), Err(GraphError::UnknownVertex(a)));
    assert_eq!(graph.len(), 4);
}

#[test]
fn test_cell_reads_memory_image() {
    let graph = Graph::new(2, 2).with_memory(vec![1, 2, 3, 4]).unwrap();
    assert_eq!(graph.cell(1, 0), 2);
    assert_eq!(graph.cell(0, 1), 3);
    assert_eq!(graph.cell(5, 0), 0);
    assert_eq!(graph.cell(-1, 0), 0);
    assert_eq!(Graph::new(1, 1).cell(0, 0), b' ' as i64);
    assert!(Graph::new(2, 2).with_memory(vec![0; 3]).is_err());
}

#[test]
fn test_add_variable_allocates_sequential_ids() {
    let mut graph = Graph::new(1, 1);
    assert_eq!(graph.add_variable(7, false), VarId(0));
    assert_eq!(graph.add_variable(0, true), VarId(1));
    assert_eq!(graph.variables()[0].initial, 7);
    assert!(graph.variables()[1].synthesized);
}

// ========================================================================
// Validation
// ========================================================================

#[test]
fn test_validator_rejects_asymmetric_edges() {
    let (mut graph, [root, decision, _, _, _]) = diamond();
    graph.vertex_mut(decision).unwrap().parents.clear();
    assert!(matches!(
        graph.test_graph(),
        Err(GraphError::AsymmetricEdges { vertex, .. }) if vertex == root || vertex == decision
    ));
}

#[test]
fn test_validator_counts_parallel_edges() {
    let mut graph = Graph::new(2, 1);
    let decision = graph.add_vertex(Vertex::at(VertexKind::Decision, 0, 0));
    let next = graph.add_vertex(Vertex::at(Op::Pop, 1, 0));
    graph.connect(decision, next).unwrap();
    graph.connect(decision, next).unwrap();
    graph.set_root(decision).unwrap();
    assert!(graph.test_graph().is_ok());

    graph.vertex_mut(next).unwrap().parents.pop();
    assert!(graph.test_graph().is_err());
}

#[test]
fn test_validator_rejects_unreachable_vertex() {
    let mut graph = Graph::new(4, 1);
    let ids = chain(&mut graph, vec![push(1), Op::Pop.into()]);
    let stray = graph.add_vertex(Vertex::at(Op::Nop, 3, 0));
    graph.connect(stray, ids[1]).unwrap();
    assert_eq!(graph.test_graph(), Err(GraphError::Unreachable(stray)));
}

#[test]
fn test_validator_rejects_wrong_decision_arity() {
    let mut graph = Graph::new(4, 1);
    let ids = chain(&mut graph, vec![push(1), VertexKind::Decision, Op::Pop.into()]);
    assert!(matches!(
        graph.test_graph(),
        Err(GraphError::ChildCount { vertex, expected: 2, got: 1, .. }) if vertex == ids[1]
    ));
}

#[test]
fn test_validator_requires_root() {
    let graph = Graph::new(1, 1);
    assert_eq!(graph.test_graph(), Err(GraphError::MissingRoot));
}

// ========================================================================
// Traversal and Analyses
// ========================================================================

#[test]
fn test_walk_is_breadth_first_and_visits_once() {
    let (graph, [root, decision, a, b, join]) = diamond();
    assert_eq!(graph.walk(), vec![root, decision, a, b, join]);
}

#[test]
fn test_is_on_cycle() {
    let mut graph = Graph::new(4, 1);
    let ids = chain(&mut graph, vec![push(1), push(2), Op::Pop.into(), Op::Pop.into()]);
    graph.connect(ids[2], ids[1]).unwrap();
    assert!(!graph.is_on_cycle(ids[0]));
    assert!(graph.is_on_cycle(ids[1]));
    assert!(graph.is_on_cycle(ids[2]));
    assert!(!graph.is_on_cycle(ids[3]));
}

#[test]
fn test_self_loop_is_on_cycle() {
    let mut graph = Graph::new(1, 1);
    let ids = chain(&mut graph, vec![push(1)]);
    assert!(!graph.is_on_cycle(ids[0]));
    graph.connect(ids[0], ids[0]).unwrap();
    assert!(graph.is_on_cycle(ids[0]));
}

#[test]
fn test_remove_unreachable_fixes_parent_lists() {
    let (mut graph, [_, decision, a, b, join]) = diamond();
    // Cut the false edge by hand, leaving `b` orphaned.
    graph.vertex_mut(decision).unwrap().children[1] = a;
    graph.vertex_mut(a).unwrap().parents.push(decision);
    graph.vertex_mut(b).unwrap().parents.clear();

    assert!(graph.remove_unreachable());
    assert!(!graph.contains(b));
    assert_eq!(graph.vertex(join).unwrap().parents.as_slice(), &[a]);
    assert!(graph.test_graph().is_ok());
    assert!(!graph.remove_unreachable());
}

#[test]
fn test_list_jumps_only_counts_split_targets() {
    let (graph, [_, _, a, b, _]) = diamond();
    let jumps = graph.list_jumps();
    assert_eq!(jumps, vec![a, b]);
}

#[test]
fn test_graph_side_effects_aggregate() {
    let (graph, _) = diamond();
    assert!(graph.is_output());
    assert!(graph.is_stack_access());
    assert!(!graph.is_input());
    assert!(!graph.is_grid_access());
    assert!(!graph.is_random());
}

#[test]
fn test_used_variables_are_sorted_and_unique() {
    let mut graph = Graph::new(3, 1);
    chain(
        &mut graph,
        vec![
            Op::VarGet(VarId(3)).into(),
            Op::ExprVarSet {
                var: VarId(1),
                value: Expr::binary(Expr::variable(VarId(3)), Expr::constant(1), BinaryOp::Add),
            }
            .into(),
        ],
    );
    assert_eq!(graph.list_used_variables(), vec![VarId(1), VarId(3)]);
}

// ========================================================================
// Linearization
// ========================================================================

#[test]
fn test_straight_line_falls_through() {
    let mut graph = Graph::new(3, 1);
    let ids = chain(&mut graph, vec![push(1), push(2), Op::Pop.into()]);
    let program = graph.linearize().unwrap();
    assert_eq!(program.order, ids);
    assert!(program.falls_through(&graph, 0));
    assert!(program.falls_through(&graph, 1));
    assert!(!program.falls_through(&graph, 2));
    assert_eq!(
        graph.disassemble().unwrap(),
        "   0: push 1\n   1: push 2\n   2: pop; exit"
    );
}

#[test]
fn test_diamond_needs_one_jump() {
    let (graph, [root, decision, a, b, join]) = diamond();
    let program = graph.linearize().unwrap();
    assert_eq!(program.order, vec![root, decision, a, join, b]);
    assert_eq!(program.targets(&graph, decision).unwrap(), vec![2, 4]);

    let lines = graph.generate(&crate::ir::codegen::TextGenerator).unwrap();
    assert_eq!(lines[1], "if pop goto 2 else 4");
    assert_eq!(lines[4], "push 3\ngoto 3");
}

#[test]
fn test_generate_rejects_wrong_decision_arity() {
    let mut graph = Graph::new(4, 1);
    let ids = chain(&mut graph, vec![push(1), VertexKind::Decision, Op::Pop.into()]);
    let result = graph.generate(&crate::ir::codegen::TextGenerator);
    assert!(matches!(
        result,
        Err(GraphError::ChildCount { vertex, expected: 2, got: 1, .. }) if vertex == ids[1]
    ));
    assert!(graph.disassemble().is_err());
}

#[test]
fn test_linearize_handles_loops() {
    let mut graph = Graph::new(3, 1);
    let ids = chain(&mut graph, vec![push(1), Op::Pop.into()]);
    graph.connect(ids[1], ids[0]).unwrap();
    let program = graph.linearize().unwrap();
    assert_eq!(program.order, ids);
    assert!(!program.falls_through(&graph, 1));
    let lines = graph.generate(&crate::ir::codegen::TextGenerator).unwrap();
    assert_eq!(lines[1], "pop\ngoto 0");
}
