use crate::prompts::{render, ANSWER_PROMPT};
use anyhow::Result;
use async_trait::async_trait;
use estuary_graph::{EventSender, Node, NodeOutput, StateSnapshot, Update};
use estuary_llm::{ChatClient, ChatOptions, ChatRequest, StreamEvent};
use estuary_types::{channel, KnowledgeFindings, Message, SummarizerResponse, TraceEvent};
use futures::StreamExt;
use std::sync::Arc;

const FALLBACK_ANSWER: &str = "I encountered an error generating a response.";

/// Terminal node: generates the user-visible reply, streaming each text
/// fragment as an `AssistantDelta` trace event.
///
/// Context selection keys off whichever pipeline output is populated for
/// this turn; at most one of them ever is.
pub struct AnswerNode {
    client: Arc<dyn ChatClient>,
    model: String,
    temperature: f32,
}

impl AnswerNode {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

/// Render the answer-stage context block from this turn's pipeline output
pub fn answer_context(
    findings: Option<&KnowledgeFindings>,
    summarizer: Option<&SummarizerResponse>,
) -> String {
    if let Some(findings) = findings {
        if !findings.formatted_context.is_empty() {
            return format!(
                "Context from Knowledge Agent:\n{}\n",
                findings.formatted_context
            );
        }
    }

    if let Some(response) = summarizer {
        return format!(
            "Individual Chunk Summaries:\n{}\n(Processed {} chunks)\n",
            response.formatted_chunk_summaries, response.num_chunks
        );
    }

    String::new()
}

#[async_trait]
impl Node for AnswerNode {
    async fn run(&self, state: &StateSnapshot, events: &EventSender) -> Result<NodeOutput> {
        let messages: Vec<Message> = state.get_as(channel::MESSAGES).unwrap_or_default();
        let findings: Option<KnowledgeFindings> = state.get_as(channel::KNOWLEDGE_FINDINGS);
        let summarizer: Option<SummarizerResponse> = state.get_as(channel::SUMMARIZER_RESPONSE);

        let context = answer_context(findings.as_ref(), summarizer.as_ref());
        let context = if context.is_empty() {
            "No specialized context available for this query.".to_string()
        } else {
            context
        };

        let prompt = render(ANSWER_PROMPT, &[("context", context.as_str())]);
        let mut request_messages = messages;
        request_messages.push(Message::system(prompt));

        let request = ChatRequest::new(&self.model, request_messages)
            .with_options(ChatOptions::new().temperature(self.temperature));

        let mut answer = String::new();
        match self.client.chat_stream(request).await {
            Ok(mut stream) => {
                while let Some(event) = stream.next().await {
                    match event {
                        Ok(StreamEvent::Message { content }) => {
                            let _ = events
                                .send(TraceEvent::AssistantDelta {
                                    content: content.clone(),
                                })
                                .await;
                            answer.push_str(&content);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!("answer stream broke: {:#}", e);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!("failed to start answer stream: {:#}", e);
            }
        }

        if answer.is_empty() {
            let _ = events
                .send(TraceEvent::AssistantDelta {
                    content: FALLBACK_ANSWER.to_string(),
                })
                .await;
            answer = FALLBACK_ANSWER.to_string();
        }

        Ok(NodeOutput::Update(
            Update::new().push_message(channel::MESSAGES, Message::assistant(answer)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_prefers_knowledge_findings() {
        let findings = KnowledgeFindings {
            documents: vec![],
            formatted_context: "Source 1 [Internal - a.md]: text".to_string(),
        };
        let context = answer_context(Some(&findings), None);
        assert!(context.starts_with("Context from Knowledge Agent:\n"));
        assert!(context.contains("Source 1"));
    }

    #[test]
    fn test_context_uses_summaries_when_present() {
        let response = SummarizerResponse {
            chunk_summaries: vec!["[Chunk 0] intro".to_string()],
            formatted_chunk_summaries: "[Chunk 0] intro".to_string(),
            num_chunks: 1,
            metadata: Default::default(),
        };
        let context = answer_context(None, Some(&response));
        assert!(context.contains("[Chunk 0] intro"));
        assert!(context.contains("(Processed 1 chunks)"));
    }

    #[test]
    fn test_context_empty_without_pipeline_output() {
        assert!(answer_context(None, None).is_empty());
    }

    #[test]
    fn test_empty_findings_fall_through_to_summaries() {
        let findings = KnowledgeFindings::default();
        let response = SummarizerResponse {
            formatted_chunk_summaries: "summary".to_string(),
            num_chunks: 1,
            ..Default::default()
        };
        let context = answer_context(Some(&findings), Some(&response));
        assert!(context.contains("Individual Chunk Summaries:"));
    }
}
