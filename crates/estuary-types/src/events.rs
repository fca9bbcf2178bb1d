use serde::{Deserialize, Serialize};

/// Raw execution trace emitted by the engine while a run executes.
///
/// This is the interleaved, fragment-by-fragment form: node attribution
/// arrives as separate `NodeStarted` events, assistant text and tool-call
/// arguments arrive as incremental deltas. The stream reconstructor turns
/// this into clean client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    /// Run execution started
    RunStarted {
        run_id: String,
        conversation_id: String,
        timestamp: i64,
    },

    /// A node began executing; updates the reconstructor's active-node cursor
    NodeStarted { node: String },

    /// A node finished executing
    NodeFinished { node: String, duration_ms: u64 },

    /// Assistant text fragment from the currently active node
    AssistantDelta { content: String },

    /// Incremental fragment of a tool invocation
    ToolCallDelta {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    /// Tool execution completed
    ToolResult { name: String, result: String },

    /// Fatal error occurred
    RunError {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<String>,
    },

    /// Run execution completed
    RunFinished {
        status: String,
        total_duration_ms: u64,
    },
}
