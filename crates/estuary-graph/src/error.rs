use thiserror::Error;

/// Engine-level failures.
///
/// Everything here is a configuration defect or a run-control outcome; node
/// business logic degrades locally instead of surfacing through this enum.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("conditional edge from '{node}' produced unmapped key '{key}'")]
    UnmappedBranch { node: String, key: String },

    #[error("node '{node}' spawned branch for undeclared destination '{destination}'")]
    UndeclaredBranchTarget { node: String, destination: String },

    #[error("node '{node}' returned Spawn but has no fan-out edge")]
    UnexpectedSpawn { node: String },

    #[error("fan-out branch node '{node}' needs a plain edge to its join node")]
    MissingJoin { node: String },

    #[error("node '{node}' has no outgoing edge")]
    MissingEdge { node: String },

    #[error("graph has no edge out of START")]
    MissingEntry,

    #[error("run cancelled")]
    Cancelled,
}
