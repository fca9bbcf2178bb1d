//! Turns the engine's raw, interleaved trace into clean client events.
//!
//! Tool-call arguments arrive as incremental text fragments, often without
//! a tool name after the first fragment; assistant text arrives from every
//! node that talks to a model, not just the answer node. The reconstructor
//! buffers the former until they form valid JSON and filters the latter
//! down to genuine answer output.

use estuary_types::TraceEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Internal section labels that mark intermediate-node artifacts; assistant
/// text containing any of them is never forwarded to the client.
const ARTIFACT_LABELS: [&str; 6] = [
    "Confidence",
    "Score",
    "Reasoning",
    "Analysis",
    "Process",
    "Selected",
];

/// Client-visible event produced from the trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// One fragment of the assistant's final answer
    AssistantToken { content: String },

    /// A tool invocation matched with its result
    ToolCombined {
        name: String,
        arguments: Value,
        result: String,
    },

    /// A tool result that never had a matching complete invocation
    ToolResult { name: String, result: String },

    /// A tool invocation that never received a result
    ToolCallUnmatched { name: String, arguments: Value },

    /// End of stream; emitted exactly once
    Close,
}

/// Accumulator for one tool invocation's streamed argument fragments.
///
/// Complete only once the text starts with `{`, ends with `}` and parses
/// as JSON; until then every new fragment triggers a re-check.
#[derive(Debug, Clone)]
struct ToolCallBuffer {
    name: String,
    arguments: String,
    parsed: Option<Value>,
}

impl ToolCallBuffer {
    fn new(name: String) -> Self {
        Self {
            name,
            arguments: String::new(),
            parsed: None,
        }
    }

    fn complete(&self) -> bool {
        self.parsed.is_some()
    }

    fn push_fragment(&mut self, fragment: &str) {
        if self.complete() {
            return;
        }
        self.arguments.push_str(fragment);

        let text = self.arguments.trim();
        if text.starts_with('{') && text.ends_with('}') {
            if let Ok(value) = serde_json::from_str(text) {
                self.parsed = Some(value);
            }
        }
    }

    fn into_arguments(self) -> Value {
        match self.parsed {
            Some(value) => value,
            None => Value::String(self.arguments),
        }
    }
}

/// Push-based reconstructor for one run's event trace
pub struct StreamReconstructor {
    answer_node: String,
    active_node: Option<String>,
    // Insertion-ordered; nameless fragments attach to the newest buffer
    buffers: Vec<ToolCallBuffer>,
}

impl StreamReconstructor {
    pub fn new(answer_node: impl Into<String>) -> Self {
        Self {
            answer_node: answer_node.into(),
            active_node: None,
            buffers: Vec::new(),
        }
    }

    /// Feed one trace event, receiving the client events it produces
    pub fn push(&mut self, event: &TraceEvent) -> Vec<ClientEvent> {
        match event {
            TraceEvent::NodeStarted { node } => {
                self.active_node = Some(node.clone());
                Vec::new()
            }

            TraceEvent::ToolCallDelta { name, arguments } => {
                self.on_tool_call_delta(name.as_deref(), arguments.as_deref());
                Vec::new()
            }

            TraceEvent::ToolResult { name, result } => self.on_tool_result(name, result),

            TraceEvent::AssistantDelta { content } => {
                if self.should_forward(content) {
                    vec![ClientEvent::AssistantToken {
                        content: content.clone(),
                    }]
                } else {
                    Vec::new()
                }
            }

            TraceEvent::RunError { message, node } => {
                tracing::error!(?node, "run error in trace: {}", message);
                Vec::new()
            }

            TraceEvent::RunStarted { .. }
            | TraceEvent::NodeFinished { .. }
            | TraceEvent::RunFinished { .. } => Vec::new(),
        }
    }

    /// End of trace: flush unmatched buffers, then close exactly once
    pub fn finish(&mut self) -> Vec<ClientEvent> {
        let mut events: Vec<ClientEvent> = std::mem::take(&mut self.buffers)
            .into_iter()
            .map(|buffer| ClientEvent::ToolCallUnmatched {
                name: buffer.name.clone(),
                arguments: buffer.into_arguments(),
            })
            .collect();
        events.push(ClientEvent::Close);
        events
    }

    fn on_tool_call_delta(&mut self, name: Option<&str>, arguments: Option<&str>) {
        if let Some(name) = name {
            if !self.buffers.iter().any(|b| b.name == name) {
                self.buffers.push(ToolCallBuffer::new(name.to_string()));
            }
        }

        let Some(fragment) = arguments.filter(|a| !a.is_empty()) else {
            return;
        };

        // A nameless fragment continues the most recently created buffer
        let target = match name {
            Some(name) => self.buffers.iter_mut().rev().find(|b| b.name == name),
            None => self.buffers.last_mut(),
        };
        if let Some(buffer) = target {
            buffer.push_fragment(fragment);
        }
    }

    fn on_tool_result(&mut self, name: &str, result: &str) -> Vec<ClientEvent> {
        let matched = self
            .buffers
            .iter()
            .position(|b| b.name == name && b.complete());

        match matched {
            Some(index) => {
                let buffer = self.buffers.remove(index);
                vec![ClientEvent::ToolCombined {
                    name: name.to_string(),
                    arguments: buffer.into_arguments(),
                    result: result.to_string(),
                }]
            }
            None => vec![ClientEvent::ToolResult {
                name: name.to_string(),
                result: result.to_string(),
            }],
        }
    }

    /// Assistant text reaches the client only from the answer node, and
    /// only when it does not look like an internal artifact
    fn should_forward(&self, content: &str) -> bool {
        if self.active_node.as_deref() != Some(self.answer_node.as_str()) {
            return false;
        }
        if content.trim().is_empty() {
            return false;
        }
        if content.starts_with('[') {
            return false;
        }
        !ARTIFACT_LABELS.iter().any(|label| content.contains(label))
    }
}
