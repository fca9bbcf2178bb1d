//! Server-sent-event rendering of client events.
//!
//! Frames follow the `event: <kind>\ndata: <json>\n\n` wire shape with
//! kinds `message` and `close`. Message payloads are `{role, content}`;
//! tool events carry their structured payload JSON-encoded inside the
//! content field, which is what existing clients parse.

use crate::reconstructor::ClientEvent;
use serde_json::json;

fn message_frame(role: &str, content: &str) -> String {
    let data = json!({ "role": role, "content": content });
    format!("event: message\ndata: {}\n\n", data)
}

/// Render one client event as an SSE frame
pub fn render_event(event: &ClientEvent) -> String {
    match event {
        ClientEvent::AssistantToken { content } => message_frame("assistant", content),

        ClientEvent::ToolCombined {
            name,
            arguments,
            result,
        } => {
            let payload = json!({
                "type": "tool_combined",
                "name": name,
                "call": { "name": name, "arguments": arguments },
                "result": result,
            });
            message_frame("tool_message", &payload.to_string())
        }

        ClientEvent::ToolResult { name, result } => {
            let payload = json!({
                "type": "tool_result",
                "name": name,
                "result": result,
            });
            message_frame("tool_message", &payload.to_string())
        }

        ClientEvent::ToolCallUnmatched { name, arguments } => {
            let payload = json!({
                "type": "tool_call",
                "name": name,
                "arguments": arguments,
            });
            message_frame("tool_message", &payload.to_string())
        }

        ClientEvent::Close => "event: close\ndata:\n\n".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_assistant_token_frame() {
        let frame = render_event(&ClientEvent::AssistantToken {
            content: "Hello".to_string(),
        });
        assert!(frame.starts_with("event: message\ndata: "));
        assert!(frame.ends_with("\n\n"));

        let data: Value = serde_json::from_str(
            frame
                .trim_start_matches("event: message\ndata: ")
                .trim_end(),
        )
        .unwrap();
        assert_eq!(data["role"], "assistant");
        assert_eq!(data["content"], "Hello");
    }

    #[test]
    fn test_tool_combined_frame_nests_call_payload() {
        let frame = render_event(&ClientEvent::ToolCombined {
            name: "retrieve_context".to_string(),
            arguments: serde_json::json!({ "query": "rust" }),
            result: "3 documents".to_string(),
        });

        let data: Value = serde_json::from_str(
            frame
                .trim_start_matches("event: message\ndata: ")
                .trim_end(),
        )
        .unwrap();
        assert_eq!(data["role"], "tool_message");

        let content: Value = serde_json::from_str(data["content"].as_str().unwrap()).unwrap();
        assert_eq!(content["type"], "tool_combined");
        assert_eq!(content["call"]["arguments"]["query"], "rust");
        assert_eq!(content["result"], "3 documents");
    }

    #[test]
    fn test_close_frame_has_empty_data() {
        assert_eq!(render_event(&ClientEvent::Close), "event: close\ndata:\n\n");
    }
}
