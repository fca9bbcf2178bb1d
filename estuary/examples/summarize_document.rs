//! Document summarization through the marker-prefixed fast path
//!
//! Prefixing the user message with the summarize marker skips the router
//! classification entirely and sends the payload straight into the
//! chunked summarization pipeline.
//!
//! # Usage
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! cargo run --example summarize_document -- path/to/document.txt
//! ```

use estuary::llm::{Retriever, ScoredDocument};
use estuary::prelude::*;
use estuary::SUMMARIZE_MARKER;
use std::sync::Arc;

/// Retrieval is never consulted on the summarize path, so a stub is fine
struct NoRetriever;

#[async_trait::async_trait]
impl Retriever for NoRetriever {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ScoredDocument>> {
        Ok(Vec::new())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let openai_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
    let path = std::env::args().nth(1).expect("usage: summarize_document <file>");
    let document = std::fs::read_to_string(&path)?;

    println!("📄 Summarizing {} ({} bytes)\n", path, document.len());

    let engine = EngineBuilder::new()
        .openai_key(&openai_key)
        .retriever(Arc::new(NoRetriever))
        .build()?;

    let history = vec![Message::user(format!("{}{}", SUMMARIZE_MARKER, document))];
    let (handle, mut events) = engine.run_turn(history, "summarize-example");

    while let Some(event) = events.recv().await {
        match event {
            TraceEvent::NodeStarted { node } => println!("▶ {}", node),
            TraceEvent::AssistantDelta { content } => print!("{}", content),
            TraceEvent::RunError { message, .. } => eprintln!("\n❌ {}", message),
            _ => {}
        }
    }

    println!("\n\n✨ Done! final status: {:?}", handle.status());
    Ok(())
}
