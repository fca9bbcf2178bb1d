//! # Estuary - Conversational Turn Engine for Rust
//!
//! Estuary routes each conversational turn through one of several
//! processing pipelines and streams the final answer incrementally:
//! - 🧭 **Routing** (answer / knowledge retrieval / document summarization)
//! - 🕸️ **Graph execution** (conditional edges, fan-out/join, sub-graphs,
//!   per-channel merge reducers)
//! - 📚 **Knowledge pipeline** (query refinement, internal retrieval,
//!   relevance grading, conditional web search, ranked merge)
//! - 📄 **Summarizer pipeline** (chunk-plan analysis, token-exact chunking,
//!   parallel per-chunk summarization)
//! - 📡 **Streaming** (raw trace reconstructed into clean SSE events)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use estuary::prelude::*;
//! use estuary::stream::{render_event, StreamReconstructor};
//! # use std::sync::Arc;
//! # fn retriever() -> Arc<dyn estuary::llm::Retriever> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = EngineBuilder::new()
//!         .openai_key(std::env::var("OPENAI_API_KEY")?)
//!         .tavily_key(std::env::var("TAVILY_API_KEY").unwrap_or_default())
//!         .retriever(retriever())
//!         .build()?;
//!
//!     let (handle, mut events) =
//!         engine.run_turn(vec![Message::user("What is an estuary?")], "conv-1");
//!
//!     let mut reconstructor = StreamReconstructor::new("answer");
//!     while let Some(event) = events.recv().await {
//!         for client_event in reconstructor.push(&event) {
//!             print!("{}", render_event(&client_event));
//!         }
//!     }
//!     for client_event in reconstructor.finish() {
//!         print!("{}", render_event(&client_event));
//!     }
//!
//!     println!("run {} finished: {:?}", handle.run_id, handle.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Estuary consists of several composable crates:
//!
//! - **estuary-types**: Core types (Message, TraceEvent, pipeline outputs)
//! - **estuary-graph**: Execution engine (nodes, edges, reducers, fan-out)
//! - **estuary-llm**: Model and search clients (OpenAI, Tavily, traits)
//! - **estuary-agents**: The pipelines (router, knowledge, summarizer,
//!   compaction, answer)
//! - **estuary-stream**: Trace-to-client event reconstruction and SSE

// Re-export all public APIs
pub use estuary_agents as agents;
pub use estuary_graph as graph;
pub use estuary_llm as llm;
pub use estuary_stream as stream;
pub use estuary_types as types;

// Re-export commonly used types
pub use estuary_agents::{conversation_graph, AgentConfig, SUMMARIZE_MARKER};
pub use estuary_graph::{CompiledGraph, GraphBuilder, Node, RunHandle, RunStatus, Update};
pub use estuary_llm::{ChatClient, OpenAiClient, Retriever, TavilyClient, WebSearch};
pub use estuary_stream::{ClientEvent, StreamReconstructor};
pub use estuary_types::{Message, Role, Route, TraceEvent};

/// High-level builder for the turn engine
pub mod builder;

/// Convenient prelude with commonly used types
pub mod prelude {
    pub use crate::builder::{EngineBuilder, TurnEngine};
    pub use crate::graph::{RunHandle, RunStatus, Update};
    pub use crate::types::{Message, Role, Route, TraceEvent};
    pub use anyhow::Result;
}
