use estuary_types::{Message, Role};

/// Number of recent messages kept for routing and refinement context
pub const RECENT_MESSAGES_COUNT: usize = 3;

/// Most recent messages, optionally excluding the last one (useful when the
/// last message is the query itself and only the preceding context matters).
pub fn recent_messages(messages: &[Message], exclude_last: bool) -> &[Message] {
    if messages.is_empty() {
        return messages;
    }
    let start = messages.len().saturating_sub(RECENT_MESSAGES_COUNT);
    let recent = &messages[start..];
    if exclude_last {
        &recent[..recent.len() - 1]
    } else {
        recent
    }
}

/// Render messages as a USER/ASSISTANT transcript, collapsing blank lines
pub fn format_conversation_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|msg| {
            let prefix = match msg.role {
                Role::User => "USER",
                _ => "ASSISTANT",
            };
            let clean: String = msg
                .content
                .trim()
                .lines()
                .filter(|line| !line.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            format!("{}: {}", prefix, clean)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Last user message in the history, if any
pub fn last_user_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().rev().find(|m| m.role == Role::User)
}
