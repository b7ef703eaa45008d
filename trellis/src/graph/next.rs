//! Next-step result from a graph node.

/// Next step after running a node.
///
/// - **Continue**: follow the node's static outgoing edge.
/// - **Node(id)**: jump to the given node.
/// - **End**: stop; return current state as final result.
///
/// When the current node has conditional edges, the router's decision
/// overrides whatever the node returned.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Next {
    /// Follow the static outgoing edge; if none, equivalent to End.
    Continue,
    /// Run the node with the given id next.
    Node(String),
    /// Stop and return the current state.
    End,
}
