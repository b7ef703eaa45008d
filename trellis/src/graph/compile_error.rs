//! Graph compilation error.

use thiserror::Error;

/// Error when compiling a state graph.
///
/// Returned by `StateGraph::compile()`. Validation ensures every id in edges
/// (except START/END) exists in the node map, the graph has exactly one entry
/// and a reachable END, and no node mixes a static edge with conditional ones.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A node id in an edge was not registered via `add_node`.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No edge from START, or more than one.
    #[error("graph must have exactly one edge from START")]
    MissingStart,

    /// Neither an edge to END nor a conditional path that can reach END.
    #[error("graph has no path to END")]
    MissingEnd,

    /// A node has more than one static outgoing edge.
    #[error("node has multiple outgoing edges: {0}")]
    DuplicateEdge(String),

    /// A node has both a static edge and conditional edges.
    #[error("node has both edge and conditional edges: {0}")]
    NodeHasBothEdgeAndConditional(String),

    /// A value in a conditional path_map is not a valid node id or END.
    #[error("conditional path_map invalid target: {0}")]
    InvalidConditionalPathMap(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of each variant names the offending node where one exists.
    #[test]
    fn compile_error_display() {
        assert!(CompileError::NodeNotFound("x".into())
            .to_string()
            .contains("x"));
        assert!(CompileError::MissingStart
            .to_string()
            .to_lowercase()
            .contains("start"));
        assert!(CompileError::MissingEnd
            .to_string()
            .to_lowercase()
            .contains("end"));
        assert!(CompileError::DuplicateEdge("a".into())
            .to_string()
            .contains("a"));
        assert!(CompileError::InvalidConditionalPathMap("t".into())
            .to_string()
            .contains("t"));
    }
}
