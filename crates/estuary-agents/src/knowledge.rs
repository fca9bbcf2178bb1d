//! Knowledge pipeline: query refinement, internal retrieval, relevance
//! evaluation, conditional external search and merge/rank.
//!
//! Every external call degrades to a safe default on failure; the pipeline
//! itself never aborts the run.

use crate::prompts::{render, DOCUMENT_EVALUATION_PROMPT, QUERY_REFINEMENT_PROMPT};
use crate::util::{format_conversation_history, last_user_message, recent_messages};
use anyhow::Result;
use async_trait::async_trait;
use estuary_graph::{
    CompiledGraph, EventSender, GraphBuilder, GraphError, Node, NodeOutput, StateSnapshot, Update,
    END, START,
};
use estuary_llm::{ChatClient, ChatRequest, Retriever, ScoredDocument, WebSearch, WebSearchResult};
use estuary_types::{
    channel, KnowledgeFinding, KnowledgeFindings, Message, SourceType, TraceEvent,
};
use serde_json::json;
use std::sync::Arc;

const RELEVANT_YES: &str = "yes";
const RELEVANT_NO: &str = "no";

/// Rewrites the latest user message into a retrieval-optimized query
pub struct RefineQueryNode {
    client: Arc<dyn ChatClient>,
    model: String,
}

impl RefineQueryNode {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Node for RefineQueryNode {
    async fn run(&self, state: &StateSnapshot, _events: &EventSender) -> Result<NodeOutput> {
        let messages: Vec<Message> = state.get_as(channel::MESSAGES).unwrap_or_default();

        let Some(raw_query) = last_user_message(&messages).map(|m| m.content.clone()) else {
            // No user message to refine; downstream nodes short-circuit on
            // the missing query
            return Ok(NodeOutput::empty());
        };

        let history = format_conversation_history(recent_messages(&messages, true));
        let request = ChatRequest::new(
            &self.model,
            vec![
                Message::system(QUERY_REFINEMENT_PROMPT),
                Message::user(format!(
                    "Original query: {}\n\nConversation history:\n{}\n\nOptimize this query for knowledge retrieval.",
                    raw_query, history
                )),
            ],
        );

        let refined = match self.client.chat(request).await {
            Ok(response) => {
                let refined = response.content.trim().to_string();
                if refined.is_empty() {
                    raw_query.clone()
                } else {
                    refined
                }
            }
            Err(e) => {
                tracing::warn!("query refinement failed, using raw query: {:#}", e);
                raw_query.clone()
            }
        };

        Ok(NodeOutput::Update(
            Update::new()
                .set(channel::QUERY, json!(refined))
                .set(channel::ORIGINAL_QUERY, json!(raw_query)),
        ))
    }
}

/// Retrieves candidate documents from the internal index
pub struct RetrieveNode {
    retriever: Arc<dyn Retriever>,
    k: usize,
}

impl RetrieveNode {
    pub fn new(retriever: Arc<dyn Retriever>, k: usize) -> Self {
        Self { retriever, k }
    }
}

#[async_trait]
impl Node for RetrieveNode {
    async fn run(&self, state: &StateSnapshot, events: &EventSender) -> Result<NodeOutput> {
        let Some(query) = state.text(channel::QUERY).map(str::to_string) else {
            return Ok(NodeOutput::Update(
                Update::new().set(channel::INTERNAL_DOCS, json!([])),
            ));
        };

        let arguments = json!({ "query": query, "k": self.k }).to_string();
        let _ = events
            .send(TraceEvent::ToolCallDelta {
                name: Some("retrieve_context".to_string()),
                arguments: Some(arguments),
            })
            .await;

        let docs = match self.retriever.search(&query, self.k).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!("internal retrieval failed: {:#}", e);
                Vec::new()
            }
        };

        let _ = events
            .send(TraceEvent::ToolResult {
                name: "retrieve_context".to_string(),
                result: format!("Retrieved {} documents", docs.len()),
            })
            .await;

        Ok(NodeOutput::Update(
            Update::new().set_ser(channel::INTERNAL_DOCS, &docs),
        ))
    }
}

/// Grades document relevance and extracts an analysis in one model call
pub struct EvaluateDocsNode {
    client: Arc<dyn ChatClient>,
    model: String,
}

impl EvaluateDocsNode {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

/// Parsed relevance-protocol block
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub relevant: bool,
    pub explanation: String,
    pub analysis: String,
}

impl Default for Evaluation {
    fn default() -> Self {
        Self {
            relevant: false,
            explanation: "Documents do not contain relevant information.".to_string(),
            analysis: "No relevant information found.".to_string(),
        }
    }
}

/// Line-prefix scan of the `RELEVANT:` / `EXPLANATION:` / `ANALYSIS:` block.
///
/// The analysis field captures everything after its marker, including
/// further lines, since the model frequently writes multi-line analyses.
pub fn parse_evaluation(response: &str) -> Evaluation {
    let mut evaluation = Evaluation::default();

    for line in response.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("RELEVANT:") {
            evaluation.relevant = rest.trim().to_lowercase().contains("yes");
        } else if let Some(rest) = line.strip_prefix("EXPLANATION:") {
            evaluation.explanation = rest.trim().to_string();
        }
    }

    if let Some((_, rest)) = response.split_once("ANALYSIS:") {
        let analysis = rest.trim();
        if !analysis.is_empty() {
            evaluation.analysis = analysis.to_string();
        }
    }

    evaluation
}

#[async_trait]
impl Node for EvaluateDocsNode {
    async fn run(&self, state: &StateSnapshot, _events: &EventSender) -> Result<NodeOutput> {
        let docs: Vec<ScoredDocument> = state.get_as(channel::INTERNAL_DOCS).unwrap_or_default();
        let query = state.text(channel::QUERY).unwrap_or_default().to_string();

        let contents: Vec<&str> = docs
            .iter()
            .map(|d| d.content.as_str())
            .filter(|c| !c.is_empty())
            .collect();

        if contents.is_empty() || query.is_empty() {
            return Ok(NodeOutput::Update(
                Update::new().set(channel::DOCS_RELEVANT, json!(RELEVANT_NO)),
            ));
        }

        let context = contents.join("\n\n---\n\n");
        let prompt = render(
            DOCUMENT_EVALUATION_PROMPT,
            &[("query", query.as_str()), ("context", context.as_str())],
        );
        let request = ChatRequest::new(&self.model, vec![Message::system(prompt)]);

        let evaluation = match self.client.chat(request).await {
            Ok(response) => parse_evaluation(&response.content),
            Err(e) => {
                tracing::warn!("document evaluation failed, grading not relevant: {:#}", e);
                Evaluation::default()
            }
        };

        let relevant = if evaluation.relevant {
            RELEVANT_YES
        } else {
            RELEVANT_NO
        };

        Ok(NodeOutput::Update(
            Update::new()
                .set(channel::DOCS_RELEVANT, json!(relevant))
                .set(channel::DOCS_GRADE_EXPLANATION, json!(evaluation.explanation))
                .set(channel::DOCS_ANALYSIS, json!(evaluation.analysis)),
        ))
    }
}

/// Searches the web; runs only when internal documents were not relevant
pub struct ExternalSearchNode {
    web_search: Arc<dyn WebSearch>,
}

impl ExternalSearchNode {
    pub fn new(web_search: Arc<dyn WebSearch>) -> Self {
        Self { web_search }
    }
}

#[async_trait]
impl Node for ExternalSearchNode {
    async fn run(&self, state: &StateSnapshot, events: &EventSender) -> Result<NodeOutput> {
        let Some(query) = state.text(channel::QUERY).map(str::to_string) else {
            return Ok(NodeOutput::Update(
                Update::new().set(channel::EXTERNAL_RESULTS, json!([])),
            ));
        };

        let _ = events
            .send(TraceEvent::ToolCallDelta {
                name: Some("web_search".to_string()),
                arguments: Some(json!({ "query": query }).to_string()),
            })
            .await;

        let results = match self.web_search.search(&query).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("external search failed: {:#}", e);
                Vec::new()
            }
        };

        let _ = events
            .send(TraceEvent::ToolResult {
                name: "web_search".to_string(),
                result: format!("Found {} results", results.len()),
            })
            .await;

        Ok(NodeOutput::Update(
            Update::new().set_ser(channel::EXTERNAL_RESULTS, &results),
        ))
    }
}

/// Normalizes findings, ranks them and renders the answer-stage context block
pub struct PrepareOutputNode;

/// Merge internal XOR external results into ranked findings.
///
/// Sorting is stable descending by score; the "Source N" labels are
/// assigned after sorting so they match the emitted order.
pub fn merge_findings(
    internal: Vec<ScoredDocument>,
    external: Vec<WebSearchResult>,
    docs_relevant: bool,
) -> KnowledgeFindings {
    let mut documents: Vec<KnowledgeFinding> = if docs_relevant && !internal.is_empty() {
        internal
            .into_iter()
            .map(|doc| {
                let source = doc
                    .metadata
                    .get("source")
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string());
                KnowledgeFinding {
                    context: doc.content,
                    source_type: SourceType::Internal,
                    source,
                    title: None,
                    score: doc.score,
                }
            })
            .collect()
    } else {
        external
            .into_iter()
            .map(|result| KnowledgeFinding {
                context: result.content,
                source_type: SourceType::External,
                source: result.url,
                title: Some(result.title),
                score: result.score,
            })
            .collect()
    };

    documents.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let formatted_context = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| match doc.source_type {
            SourceType::Internal => {
                format!("Source {} [Internal - {}]: {}", i + 1, doc.source, doc.context)
            }
            SourceType::External => format!(
                "Source {} [Web - {} ({})]: {}",
                i + 1,
                doc.title.as_deref().unwrap_or("Unknown Title"),
                doc.source,
                doc.context
            ),
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    KnowledgeFindings {
        documents,
        formatted_context,
    }
}

#[async_trait]
impl Node for PrepareOutputNode {
    async fn run(&self, state: &StateSnapshot, _events: &EventSender) -> Result<NodeOutput> {
        let docs_relevant = state.text(channel::DOCS_RELEVANT) == Some(RELEVANT_YES);
        let internal: Vec<ScoredDocument> =
            state.get_as(channel::INTERNAL_DOCS).unwrap_or_default();
        let external: Vec<WebSearchResult> =
            state.get_as(channel::EXTERNAL_RESULTS).unwrap_or_default();

        let findings = merge_findings(internal, external, docs_relevant);
        tracing::debug!(documents = findings.documents.len(), "knowledge findings prepared");

        Ok(NodeOutput::Update(
            Update::new().set_ser(channel::KNOWLEDGE_FINDINGS, &findings),
        ))
    }
}

/// Build the knowledge sub-graph.
///
/// The compiled graph reads only the messages channel from the parent and
/// exports only the findings.
pub fn knowledge_graph(
    client: Arc<dyn ChatClient>,
    retriever: Arc<dyn Retriever>,
    web_search: Arc<dyn WebSearch>,
    model: &str,
    retrieval_k: usize,
) -> Result<CompiledGraph, GraphError> {
    let graph = GraphBuilder::new()
        .add_node("refine_query", RefineQueryNode::new(client.clone(), model))
        .add_node("retrieve", RetrieveNode::new(retriever, retrieval_k))
        .add_node("check_internal", EvaluateDocsNode::new(client, model))
        .add_node("external_search", ExternalSearchNode::new(web_search))
        .add_node("prepare_output", PrepareOutputNode)
        .add_edge(START, "refine_query")
        .add_edge("refine_query", "retrieve")
        .add_edge("retrieve", "check_internal")
        .add_conditional_edges(
            "check_internal",
            |state: &StateSnapshot| {
                state
                    .text(channel::DOCS_RELEVANT)
                    .unwrap_or(RELEVANT_NO)
                    .to_string()
            },
            [
                (RELEVANT_YES, "prepare_output"),
                (RELEVANT_NO, "external_search"),
            ],
        )
        .add_edge("external_search", "prepare_output")
        .add_edge("prepare_output", END)
        .compile()?;

    Ok(graph
        .with_input_channels([channel::MESSAGES])
        .with_output_channels([channel::KNOWLEDGE_FINDINGS]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_evaluation_relevant_block() {
        let response = "RELEVANT: YES\nEXPLANATION: Directly answers the question.\nANALYSIS: The documents describe the retry policy.";
        let evaluation = parse_evaluation(response);
        assert!(evaluation.relevant);
        assert_eq!(evaluation.explanation, "Directly answers the question.");
        assert_eq!(evaluation.analysis, "The documents describe the retry policy.");
    }

    #[test]
    fn test_parse_evaluation_multiline_analysis_captures_remainder() {
        let response = "RELEVANT: yes\nEXPLANATION: Good match.\nANALYSIS: First point.\nSecond point.\n\nThird point.";
        let evaluation = parse_evaluation(response);
        assert_eq!(
            evaluation.analysis,
            "First point.\nSecond point.\n\nThird point."
        );
    }

    #[test]
    fn test_parse_evaluation_defaults_on_garbage() {
        let evaluation = parse_evaluation("I cannot evaluate this.");
        assert!(!evaluation.relevant);
        assert_eq!(evaluation.analysis, "No relevant information found.");
    }

    #[test]
    fn test_parse_evaluation_case_insensitive_relevance() {
        assert!(parse_evaluation("RELEVANT: Yes").relevant);
        assert!(!parse_evaluation("RELEVANT: NO").relevant);
    }

    fn internal_doc(content: &str, source: &str, score: f64) -> ScoredDocument {
        ScoredDocument {
            content: content.to_string(),
            metadata: HashMap::from([("source".to_string(), source.to_string())]),
            score,
        }
    }

    #[test]
    fn test_merge_sorts_descending_with_matching_labels() {
        let internal = vec![
            internal_doc("low", "a.md", 0.2),
            internal_doc("high", "b.md", 0.9),
            internal_doc("mid", "c.md", 0.5),
        ];

        let findings = merge_findings(internal, vec![], true);

        let scores: Vec<f64> = findings.documents.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.5, 0.2]);

        let lines: Vec<&str> = findings.formatted_context.split("\n\n").collect();
        assert!(lines[0].starts_with("Source 1 [Internal - b.md]: high"));
        assert!(lines[1].starts_with("Source 2 [Internal - c.md]: mid"));
        assert!(lines[2].starts_with("Source 3 [Internal - a.md]: low"));
    }

    #[test]
    fn test_merge_stable_on_tied_scores() {
        let internal = vec![
            internal_doc("first", "a.md", 0.5),
            internal_doc("second", "b.md", 0.5),
        ];

        let findings = merge_findings(internal, vec![], true);
        assert_eq!(findings.documents[0].context, "first");
        assert_eq!(findings.documents[1].context, "second");
    }

    #[test]
    fn test_merge_uses_external_when_not_relevant() {
        let internal = vec![internal_doc("ignored", "a.md", 0.9)];
        let external = vec![WebSearchResult {
            title: "Rust Book".to_string(),
            url: "https://doc.rust-lang.org".to_string(),
            content: "ownership".to_string(),
            score: 0.8,
        }];

        let findings = merge_findings(internal, external, false);
        assert_eq!(findings.documents.len(), 1);
        assert_eq!(findings.documents[0].source_type, SourceType::External);
        assert!(findings
            .formatted_context
            .starts_with("Source 1 [Web - Rust Book (https://doc.rust-lang.org)]: ownership"));
    }

    #[test]
    fn test_merge_empty_inputs_yield_empty_findings() {
        let findings = merge_findings(vec![], vec![], false);
        assert!(findings.documents.is_empty());
        assert!(findings.formatted_context.is_empty());
    }
}
