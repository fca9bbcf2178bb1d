use crate::prompts::{render, ROUTER_SYSTEM_PROMPT};
use crate::util::{format_conversation_history, recent_messages};
use anyhow::Result;
use async_trait::async_trait;
use estuary_graph::{EventSender, Node, NodeOutput, StateSnapshot, Update};
use estuary_llm::{ChatClient, ChatOptions, ChatRequest};
use estuary_types::{channel, Message, Role, Route};
use serde_json::json;
use std::sync::Arc;

/// Literal prefix that bypasses classification and forces the summarizer
pub const SUMMARIZE_MARKER: &str = "SUMMARIZE DOCUMENT:\n\n";

/// Classifies one turn into answer / knowledge / document_summarizer.
///
/// Classification never fails the run: a marker match short-circuits the
/// model entirely, and any model or parse failure falls back to knowledge.
pub struct RouterNode {
    client: Arc<dyn ChatClient>,
    model: String,
    temperature: f32,
}

impl RouterNode {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }

    async fn classify(&self, messages: &[Message]) -> Result<String> {
        let context = format_conversation_history(recent_messages(messages, false));
        let system = render(ROUTER_SYSTEM_PROMPT, &[("context", &context)]);
        let last = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let request = ChatRequest::new(
            &self.model,
            vec![Message::system(system), Message::user(last)],
        )
        .with_options(ChatOptions::new().temperature(self.temperature));

        Ok(self.client.chat(request).await?.content)
    }
}

/// Extract the route token from the line following the `[Selected Route]`
/// label. Anything missing or unrecognized maps to None.
pub fn parse_selected_route(response: &str) -> Option<Route> {
    let (_, tail) = response.split_once("[Selected Route]")?;
    let token = tail.lines().nth(1)?;
    Route::from_token(token)
}

#[async_trait]
impl Node for RouterNode {
    async fn run(&self, state: &StateSnapshot, _events: &EventSender) -> Result<NodeOutput> {
        let messages: Vec<Message> = state.get_as(channel::MESSAGES).unwrap_or_default();

        if messages.is_empty() {
            return Ok(NodeOutput::Update(
                Update::new()
                    .set(channel::ROUTE, json!(Route::Knowledge.node_name()))
                    .set(
                        channel::ROUTING_DECISION,
                        json!("Default to knowledge (no messages)"),
                    ),
            ));
        }

        let last = &messages[messages.len() - 1];
        if last.role == Role::User {
            if let Some(document) = last.content.strip_prefix(SUMMARIZE_MARKER) {
                // Marker bypass: no classification, and any pipeline output
                // left over from a previous turn is cleared
                return Ok(NodeOutput::Update(
                    Update::new()
                        .set(channel::ROUTE, json!(Route::DocumentSummarizer.node_name()))
                        .set(channel::DOCUMENT_CONTENT, json!(document))
                        .set(
                            channel::ROUTING_DECISION,
                            json!("Routing to document summarizer due to prefix."),
                        )
                        .clear(channel::KNOWLEDGE_FINDINGS)
                        .clear(channel::SUMMARIZER_RESPONSE),
                ));
            }
        }

        let (route, decision) = match self.classify(&messages).await {
            Ok(response) => {
                let route = parse_selected_route(&response).unwrap_or(Route::Knowledge);
                (route, response)
            }
            Err(e) => {
                tracing::warn!("routing classification failed, defaulting to knowledge: {:#}", e);
                (Route::Knowledge, format!("Routing failed: {}", e))
            }
        };

        tracing::debug!(route = route.node_name(), "turn routed");

        Ok(NodeOutput::Update(
            Update::new()
                .set(channel::ROUTE, json!(route.node_name()))
                .set(channel::ROUTING_DECISION, json!(decision)),
        ))
    }
}
