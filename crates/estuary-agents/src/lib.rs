//! Conversational pipelines built on the graph engine: a router dispatches
//! each turn to a knowledge retrieval or document summarization sub-graph
//! (or straight to answer generation), and a terminal answer node streams
//! the user-visible reply.

pub mod answer;
pub mod chunking;
pub mod compaction;
pub mod config;
pub mod knowledge;
pub mod orchestrator;
pub mod prompts;
pub mod router;
pub mod summarizer;
pub mod util;

pub use answer::AnswerNode;
pub use compaction::{should_compact, CompactionNode};
pub use config::AgentConfig;
pub use knowledge::knowledge_graph;
pub use orchestrator::{conversation_graph, ANSWER_NODE, COMPACTION_NODE, ROUTER_NODE};
pub use router::{RouterNode, SUMMARIZE_MARKER};
pub use summarizer::{summarizer_graph, ChunkPlan};
