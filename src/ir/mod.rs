//! Intermediate representation.
//!
//! Leaf to root: [`expression`] trees are owned by [`vertex`] payloads, which
//! live in the [`graph`] arena. [`codegen`] is the contract emitters use to
//! render all three.

pub mod codegen;
pub mod effects;
pub mod error;
pub mod expression;
pub mod graph;
pub mod position;
pub mod vertex;

pub use effects::{MemoryAccess, SideEffects};
pub use error::{GraphError, GraphResult};
pub use expression::{BinaryOp, Expr, ExprKind, VarId};
pub use graph::{Graph, LinearProgram, VariableDecl, VertexId};
pub use position::{Direction, Vec2i};
pub use vertex::{EdgeList, Op, Vertex, VertexKind};
