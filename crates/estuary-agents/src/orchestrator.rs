//! Top-level turn graph: router, pipeline sub-graphs, optional history
//! compaction and the terminal answer node.

use crate::answer::AnswerNode;
use crate::compaction::{should_compact, CompactionNode};
use crate::config::AgentConfig;
use crate::knowledge::knowledge_graph;
use crate::router::RouterNode;
use crate::summarizer::{summarizer_graph, ChunkPlan};
use estuary_graph::{
    CompiledGraph, GraphBuilder, GraphError, MergePlan, StateSnapshot, END, START,
};
use estuary_llm::{ChatClient, Retriever, WebSearch};
use estuary_types::{channel, Message, Route};
use std::sync::Arc;

/// Node the stream reconstructor treats as the terminal answer source
pub const ANSWER_NODE: &str = "answer";
pub const ROUTER_NODE: &str = "router";
pub const COMPACTION_NODE: &str = "summarize_conversation";

const COMPACT_KEY: &str = "summarize";
const ANSWER_KEY: &str = "answer";

fn compaction_key(state: &StateSnapshot, threshold: usize) -> String {
    let messages: Vec<Message> = state.get_as(channel::MESSAGES).unwrap_or_default();
    if should_compact(&messages, threshold) {
        COMPACT_KEY.to_string()
    } else {
        ANSWER_KEY.to_string()
    }
}

/// Build the complete conversational turn graph.
///
/// The messages channel merges through a tombstone-aware append reducer,
/// which is what lets compaction drop old messages and append the summary
/// in a single update.
pub fn conversation_graph(
    client: Arc<dyn ChatClient>,
    retriever: Arc<dyn Retriever>,
    web_search: Arc<dyn WebSearch>,
    config: &AgentConfig,
) -> Result<CompiledGraph, GraphError> {
    let model = config.llm.model.as_str();
    let temperature = config.llm.temperature;
    let threshold = config.compaction.threshold;

    let knowledge = knowledge_graph(
        client.clone(),
        retriever,
        web_search,
        model,
        config.retrieval.k,
    )?;
    let summarizer = summarizer_graph(
        client.clone(),
        model,
        ChunkPlan {
            chunk_size: config.summarizer.default_chunk_size,
            chunk_overlap: config.summarizer.default_chunk_overlap,
        },
    )?;

    GraphBuilder::new()
        .merge_plan(MergePlan::new().append_with_tombstones(channel::MESSAGES))
        .add_node(ROUTER_NODE, RouterNode::new(client.clone(), model, temperature))
        .add_node(Route::Knowledge.node_name(), knowledge)
        .add_node(Route::DocumentSummarizer.node_name(), summarizer)
        .add_node(
            COMPACTION_NODE,
            CompactionNode::new(client.clone(), model, config.compaction.keep_recent),
        )
        .add_node(ANSWER_NODE, AnswerNode::new(client, model, temperature))
        .add_edge(START, ROUTER_NODE)
        .add_conditional_edges(
            ROUTER_NODE,
            |state: &StateSnapshot| {
                state
                    .text(channel::ROUTE)
                    .unwrap_or(Route::Knowledge.node_name())
                    .to_string()
            },
            [
                (Route::Answer.node_name(), ANSWER_NODE),
                (Route::Knowledge.node_name(), Route::Knowledge.node_name()),
                (
                    Route::DocumentSummarizer.node_name(),
                    Route::DocumentSummarizer.node_name(),
                ),
            ],
        )
        .add_conditional_edges(
            Route::Knowledge.node_name(),
            move |state: &StateSnapshot| compaction_key(state, threshold),
            [(COMPACT_KEY, COMPACTION_NODE), (ANSWER_KEY, ANSWER_NODE)],
        )
        .add_conditional_edges(
            Route::DocumentSummarizer.node_name(),
            move |state: &StateSnapshot| compaction_key(state, threshold),
            [(COMPACT_KEY, COMPACTION_NODE), (ANSWER_KEY, ANSWER_NODE)],
        )
        .add_edge(COMPACTION_NODE, ANSWER_NODE)
        .add_edge(ANSWER_NODE, END)
        .compile()
}
