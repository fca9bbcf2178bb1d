//! Summarizer pipeline: chunk-plan analysis, boundary-aware chunking,
//! parallel per-chunk summarization (fan-out) and index-ordered combine.

use crate::chunking::{count_tokens, create_chunks};
use crate::prompts::{render, CHUNK_SIZE_PROMPT, CHUNK_SUMMARY_PROMPT};
use anyhow::Result;
use async_trait::async_trait;
use estuary_graph::{
    Branch, CompiledGraph, EventSender, GraphBuilder, GraphError, MergePlan, Node, NodeOutput,
    StateSnapshot, Update, END, START,
};
use estuary_llm::{ChatClient, ChatRequest, JsonSchemaFormat};
use estuary_types::{channel, IndexedSummary, Message, SummarizerMetadata, SummarizerResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const SUMMARIZE_CHUNK_NODE: &str = "summarize_chunk";

/// Chunking parameters recommended by the analyze step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChunkPlan {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkPlan {
    /// Bounds the model's recommendation to sane token ranges
    pub fn clamped(self) -> Self {
        Self {
            chunk_size: self.chunk_size.clamp(100, 4000),
            chunk_overlap: self.chunk_overlap.clamp(20, 500),
        }
    }
}

fn chunk_plan_schema() -> JsonSchemaFormat {
    JsonSchemaFormat::new(
        "chunk_plan",
        json!({
            "type": "object",
            "properties": {
                "chunk_size": {
                    "type": "integer",
                    "description": "Target size for each chunk in tokens",
                    "minimum": 100,
                    "maximum": 4000
                },
                "chunk_overlap": {
                    "type": "integer",
                    "description": "Number of tokens to overlap between chunks",
                    "minimum": 20,
                    "maximum": 500
                }
            },
            "required": ["chunk_size", "chunk_overlap"],
            "additionalProperties": false
        }),
    )
}

/// Selects the document source, picks a chunk plan and fans out one branch
/// per chunk.
///
/// With no content in either source channel the node spawns zero branches,
/// so the combine step produces the explicit "no summaries" result instead
/// of the pipeline failing.
pub struct AnalyzeAndChunkNode {
    client: Arc<dyn ChatClient>,
    model: String,
    default_plan: ChunkPlan,
}

impl AnalyzeAndChunkNode {
    pub fn new(
        client: Arc<dyn ChatClient>,
        model: impl Into<String>,
        default_plan: ChunkPlan,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            default_plan,
        }
    }

    async fn recommend_plan(&self, document: &str) -> ChunkPlan {
        let preview: String = document.chars().take(500).collect();
        let total_tokens = count_tokens(document).unwrap_or(0);
        let metadata = json!({
            "total_tokens": total_tokens,
            "total_length": document.len(),
            "has_headers": document.contains('#'),
        })
        .to_string();

        let prompt = render(
            CHUNK_SIZE_PROMPT,
            &[("document_preview", preview.as_str()), ("metadata", metadata.as_str())],
        );
        let request = ChatRequest::new(&self.model, vec![Message::system(prompt)]);

        match self
            .client
            .chat_structured(request, chunk_plan_schema())
            .await
            .and_then(|value| Ok(serde_json::from_value::<ChunkPlan>(value)?))
        {
            Ok(plan) => plan.clamped(),
            Err(e) => {
                tracing::warn!("chunk plan analysis failed, using default plan: {:#}", e);
                self.default_plan
            }
        }
    }
}

#[async_trait]
impl Node for AnalyzeAndChunkNode {
    async fn run(&self, state: &StateSnapshot, _events: &EventSender) -> Result<NodeOutput> {
        // Upstream-provided content wins over direct input
        let document = [channel::DOCUMENT_CONTENT, channel::INPUT_DOCUMENT]
            .iter()
            .filter_map(|field| state.text(field))
            .find(|content| !content.trim().is_empty())
            .map(str::to_string);

        let Some(document) = document else {
            tracing::warn!("no document content found, skipping summarization");
            return Ok(NodeOutput::Spawn {
                update: Update::new(),
                branches: Vec::new(),
            });
        };

        let plan = self.recommend_plan(&document).await;
        let chunks = match create_chunks(&document, plan.chunk_size, plan.chunk_overlap) {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!("chunking failed, summarizing document whole: {:#}", e);
                vec![document.clone()]
            }
        };

        tracing::debug!(
            chunks = chunks.len(),
            chunk_size = plan.chunk_size,
            chunk_overlap = plan.chunk_overlap,
            "document chunked"
        );

        let branches = chunks
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                Branch::new(
                    SUMMARIZE_CHUNK_NODE,
                    Update::new()
                        .set(channel::CHUNK_TEXT, json!(text))
                        .set(channel::CHUNK_INDEX, json!(index)),
                )
            })
            .collect();

        Ok(NodeOutput::Spawn {
            update: Update::new().set(channel::DOCUMENT, json!(document)),
            branches,
        })
    }
}

/// Summarizes one chunk; a failure yields an error-marked summary for its
/// index instead of aborting the pipeline.
pub struct SummarizeChunkNode {
    client: Arc<dyn ChatClient>,
    model: String,
}

impl SummarizeChunkNode {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Node for SummarizeChunkNode {
    async fn run(&self, state: &StateSnapshot, _events: &EventSender) -> Result<NodeOutput> {
        let chunk = state.text(channel::CHUNK_TEXT).unwrap_or_default();
        let index: usize = state.get_as(channel::CHUNK_INDEX).unwrap_or(0);

        let prompt = render(CHUNK_SUMMARY_PROMPT, &[("chunk", chunk)]);
        let request = ChatRequest::new(&self.model, vec![Message::system(prompt)]);

        let text = match self.client.chat(request).await {
            Ok(response) => format!("[Chunk {}] {}", index, response.content),
            Err(e) => {
                tracing::warn!(index, "chunk summarization failed: {:#}", e);
                format!("[Chunk {}] Error summarizing this chunk.", index)
            }
        };

        Ok(NodeOutput::Update(Update::new().set_ser(
            channel::CHUNK_SUMMARIES,
            &vec![IndexedSummary { index, text }],
        )))
    }
}

/// Join barrier: sorts the accumulated summaries by chunk index and renders
/// the combined output.
pub struct CombineSummariesNode;

/// Assemble the pipeline output from the accumulated branch summaries.
///
/// Branches complete in arbitrary order, so ordering here comes from the
/// carried chunk index, never from arrival order.
pub fn combine_summaries(mut summaries: Vec<IndexedSummary>) -> SummarizerResponse {
    summaries.sort_by_key(|s| s.index);

    let texts: Vec<String> = summaries.into_iter().map(|s| s.text).collect();
    let formatted = if texts.is_empty() {
        "No summaries generated.".to_string()
    } else {
        texts.join("\n\n")
    };

    let avg_summary_length = if texts.is_empty() {
        0.0
    } else {
        texts.iter().map(|t| t.len()).sum::<usize>() as f64 / texts.len() as f64
    };

    SummarizerResponse {
        num_chunks: texts.len(),
        metadata: SummarizerMetadata {
            num_chunks: texts.len(),
            avg_summary_length,
        },
        chunk_summaries: texts,
        formatted_chunk_summaries: formatted,
    }
}

#[async_trait]
impl Node for CombineSummariesNode {
    async fn run(&self, state: &StateSnapshot, _events: &EventSender) -> Result<NodeOutput> {
        let summaries: Vec<IndexedSummary> =
            state.get_as(channel::CHUNK_SUMMARIES).unwrap_or_default();
        let response = combine_summaries(summaries);

        tracing::debug!(num_chunks = response.num_chunks, "summaries combined");

        Ok(NodeOutput::Update(
            Update::new().set_ser(channel::SUMMARIZER_RESPONSE, &response),
        ))
    }
}

/// Build the summarizer sub-graph.
///
/// Chunk summaries accumulate under an append reducer, which is
/// order-independent because each entry carries its chunk index.
pub fn summarizer_graph(
    client: Arc<dyn ChatClient>,
    model: &str,
    default_plan: ChunkPlan,
) -> Result<CompiledGraph, GraphError> {
    let graph = GraphBuilder::new()
        .merge_plan(MergePlan::new().append(channel::CHUNK_SUMMARIES))
        .add_node(
            "process_document",
            AnalyzeAndChunkNode::new(client.clone(), model, default_plan),
        )
        .add_node(SUMMARIZE_CHUNK_NODE, SummarizeChunkNode::new(client, model))
        .add_node("combine_summaries", CombineSummariesNode)
        .add_edge(START, "process_document")
        .add_fanout("process_document", SUMMARIZE_CHUNK_NODE)
        .add_edge(SUMMARIZE_CHUNK_NODE, "combine_summaries")
        .add_edge("combine_summaries", END)
        .compile()?;

    Ok(graph
        .with_input_channels([channel::DOCUMENT_CONTENT, channel::INPUT_DOCUMENT])
        .with_output_channels([channel::SUMMARIZER_RESPONSE]))
}
