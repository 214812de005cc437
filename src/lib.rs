//! Befungraph - graph IR and optimizer for a Befunge-93 compiler backend
//!
//! A front-end decodes the Befunge-93 playfield into a control-flow graph
//! of vertices, one per executed cell. This crate owns that graph and
//! rewrites it into a smaller program that touches the operand stack as
//! little as possible, then tells the emitter how deep the stack can get.
//!
//! # Architecture
//!
//! 1. **Intermediate representation** (`ir` module)
//!    - Simplified value expressions (`Expr`) with constant folding
//!    - Vertices carrying a single op, a fused block, or a branch
//!    - The `Graph` arena with its analyses, validator and linearization
//!    - The generator traits emitters implement
//!
//! 2. **Optimizer** (`optimizer` module)
//!    - `ModRule` chain rewriting and the peephole catalog
//!    - Decision folding and constant grid-cell promotion
//!    - Unstackify: operand-stack values promoted to variables
//!    - Block fusion and stack-size prediction
//!
//! # Example
//!
//! ```rust
//! use befungraph::ir::{BinaryOp, Expr, Graph, Op, Vertex};
//! use befungraph::optimizer::{optimize_graph, StackSize};
//!
//! // 34+. : push 3, push 4, add, print
//! let mut graph = Graph::new(4, 1);
//! let ops = [
//!     Op::Push(Expr::constant(3)),
//!     Op::Push(Expr::constant(4)),
//!     Op::BinaryMath(BinaryOp::Add),
//!     Op::Output { ascii: false },
//! ];
//! let ids: Vec<_> = ops
//!     .into_iter()
//!     .enumerate()
//!     .map(|(x, op)| graph.add_vertex(Vertex::at(op, x as i32, 0)))
//!     .collect();
//! for pair in ids.windows(2) {
//!     graph.connect(pair[0], pair[1]).unwrap();
//! }
//! graph.set_root(ids[0]).unwrap();
//!
//! let report = optimize_graph(&mut graph).unwrap();
//! assert_eq!(report.stack_size, StackSize::Bounded(0));
//! assert_eq!(graph.disassemble().unwrap(), "   0: out_int 7; exit");
//! ```

pub mod ir;
pub mod optimizer;

pub use ir::{Expr, Graph, GraphError, GraphResult, Op, Vertex, VertexId, VertexKind};
pub use optimizer::{optimize_graph, OptimizationReport, Optimizer, OptimizerConfig, StackSize};
