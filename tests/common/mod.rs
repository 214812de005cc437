/// Shared helpers for the optimizer integration tests
///
/// - Building straight-line programs and wiring branches
/// - Capturing optimizer logs (`RUST_LOG=befungraph=trace cargo test`)
use befungraph::ir::{Expr, Graph, Op, Vertex, VertexId, VertexKind};
use tracing_subscriber::{fmt, EnvFilter};

/// Route `tracing` output to the test harness; safe to call from every test
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

pub fn push(value: i64) -> VertexKind {
    Op::Push(Expr::constant(value)).into()
}

pub fn op(op: Op) -> VertexKind {
    op.into()
}

/// Add `kinds` on row `y` as a connected run; returns their handles
pub fn row(graph: &mut Graph, y: i32, kinds: Vec<VertexKind>) -> Vec<VertexId> {
    let ids: Vec<VertexId> = kinds
        .into_iter()
        .enumerate()
        .map(|(x, kind)| graph.add_vertex(Vertex::at(kind, x as i32, y)))
        .collect();
    for pair in ids.windows(2) {
        graph.connect(pair[0], pair[1]).expect("Failed to connect row");
    }
    ids
}

/// A rooted straight-line program on a single row
pub fn linear(width: usize, kinds: Vec<VertexKind>) -> (Graph, Vec<VertexId>) {
    let mut graph = Graph::new(width, 1);
    let ids = row(&mut graph, 0, kinds);
    graph.set_root(ids[0]).expect("Failed to set root");
    (graph, ids)
}
