use crate::prompts::{render, CONVERSATION_SUMMARY_EXTEND_PROMPT, CONVERSATION_SUMMARY_PROMPT};
use anyhow::Result;
use async_trait::async_trait;
use estuary_graph::{EventSender, Node, NodeOutput, StateSnapshot, Update};
use estuary_llm::{ChatClient, ChatRequest};
use estuary_types::{channel, Message, Role};
use serde_json::json;
use std::sync::Arc;

/// History is compacted only when it exceeds the threshold AND the latest
/// message is an assistant reply, so a turn is never split mid-exchange.
pub fn should_compact(messages: &[Message], threshold: usize) -> bool {
    messages.len() > threshold
        && messages
            .last()
            .map(|m| m.role == Role::Assistant)
            .unwrap_or(false)
}

/// Replaces older history with one synthetic system message carrying a
/// running summary, keeping the most recent messages verbatim.
pub struct CompactionNode {
    client: Arc<dyn ChatClient>,
    model: String,
    keep_recent: usize,
}

impl CompactionNode {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>, keep_recent: usize) -> Self {
        Self {
            client,
            model: model.into(),
            keep_recent,
        }
    }
}

#[async_trait]
impl Node for CompactionNode {
    async fn run(&self, state: &StateSnapshot, _events: &EventSender) -> Result<NodeOutput> {
        let messages: Vec<Message> = state.get_as(channel::MESSAGES).unwrap_or_default();
        if messages.len() <= self.keep_recent {
            return Ok(NodeOutput::empty());
        }

        let prior_summary = state.text(channel::SUMMARY).map(str::to_string);
        let prompt = match &prior_summary {
            Some(summary) => render(CONVERSATION_SUMMARY_EXTEND_PROMPT, &[("summary", summary)]),
            None => CONVERSATION_SUMMARY_PROMPT.to_string(),
        };

        let mut summary_input = messages.clone();
        summary_input.push(Message::user(prompt));
        let request = ChatRequest::new(&self.model, summary_input);

        let summary = match self.client.chat(request).await {
            Ok(response) => response.content,
            Err(e) => {
                // Leave the history alone rather than dropping messages
                // without a summary to stand in for them
                tracing::warn!("conversation summarization failed, skipping compaction: {:#}", e);
                return Ok(NodeOutput::empty());
            }
        };

        let cutoff = messages.len() - self.keep_recent;
        let mut update = Update::new();
        for message in &messages[..cutoff] {
            update = update.remove_message(channel::MESSAGES, message.id.as_str());
        }

        update = update
            .push_message(
                channel::MESSAGES,
                Message::system(format!("Previous conversation summary: {}", summary)),
            )
            .set(channel::SUMMARY, json!(summary));

        tracing::debug!(removed = cutoff, "conversation history compacted");

        Ok(NodeOutput::Update(update))
    }
}
