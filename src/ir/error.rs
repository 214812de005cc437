//! Error types for graph construction and optimization.

use super::graph::VertexId;

/// Internal invariant violations raised by the graph and its passes.
///
/// None of these are recoverable user errors: they indicate a front-end
/// contract violation or a bug in a rewrite rule, and compilation stops.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Vertex handle does not refer to a live vertex
    UnknownVertex(VertexId),
    /// Graph has no root vertex
    MissingRoot,
    /// Parent list of `vertex` is not the inverse of the child lists
    AsymmetricEdges { vertex: VertexId, neighbour: VertexId },
    /// Vertex exists but cannot be reached from the root
    Unreachable(VertexId),
    /// More than one vertex has no parents
    MultipleRoots { first: VertexId, second: VertexId },
    /// Vertex kind requires a different number of children
    ChildCount {
        vertex: VertexId,
        kind: &'static str,
        expected: usize,
        got: usize,
    },
    /// A rewrite produced a chain that cannot carry the matched exits
    InvalidSplice { rule: &'static str, reason: String },
    /// Unstackify reached a vertex it cannot rewrite consistently
    Unstackify { vertex: VertexId, reason: String },
    /// Optimizer configuration could not be parsed
    Config(String),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownVertex(id) => write!(f, "Unknown vertex: {}", id),
            Self::MissingRoot => write!(f, "Graph has no root vertex"),
            Self::AsymmetricEdges { vertex, neighbour } => write!(
                f,
                "Parent/child lists of {} and {} are not symmetric",
                vertex, neighbour
            ),
            Self::Unreachable(id) => write!(f, "Vertex {} is not reachable from the root", id),
            Self::MultipleRoots { first, second } => {
                write!(f, "Vertices {} and {} both have no parents", first, second)
            }
            Self::ChildCount {
                vertex,
                kind,
                expected,
                got,
            } => write!(
                f,
                "{} vertex {} must have {} children, got {}",
                kind, vertex, expected, got
            ),
            Self::InvalidSplice { rule, reason } => {
                write!(f, "Rule '{}' produced an invalid splice: {}", rule, reason)
            }
            Self::Unstackify { vertex, reason } => {
                write!(f, "Cannot unstackify vertex {}: {}", vertex, reason)
            }
            Self::Config(msg) => write!(f, "Invalid optimizer configuration: {}", msg),
        }
    }
}

impl std::error::Error for GraphError {}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;
