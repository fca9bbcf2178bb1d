pub mod builder;
pub mod error;
pub mod node;
pub mod reducer;
pub mod runner;
pub mod snapshot;
pub mod state;
pub mod update;

pub use builder::{GraphBuilder, END, START};
pub use error::GraphError;
pub use node::{Branch, EventSender, Node, NodeOutput};
pub use reducer::{MergePlan, MergePolicy};
pub use runner::{CompiledGraph, RunHandle, RunStatus};
pub use snapshot::StateSnapshot;
pub use state::StateStore;
pub use update::{MessageChange, Update};

// Re-export the trace event type nodes emit
pub use estuary_types::TraceEvent;
