//! Minimal conversational turn using the Estuary engine
//!
//! This example wires a tiny in-memory retriever into the full turn
//! graph and streams the assistant reply to stdout.
//!
//! # Usage
//!
//! ```bash
//! # Set environment variables
//! export OPENAI_API_KEY=sk-...
//! export TAVILY_API_KEY=tvly-...   # optional, for web fallback
//!
//! # Run the example
//! cargo run --example simple_turn
//! ```

use estuary::llm::{Retriever, ScoredDocument};
use estuary::prelude::*;
use estuary::stream::StreamReconstructor;
use estuary_agents::ANSWER_NODE;
use std::collections::HashMap;
use std::sync::Arc;

/// Toy retriever that scores a fixed set of notes by shared words
struct NotesRetriever {
    notes: Vec<(&'static str, &'static str)>,
}

#[async_trait::async_trait]
impl Retriever for NotesRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        let query_words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut docs: Vec<ScoredDocument> = self
            .notes
            .iter()
            .map(|(source, content)| {
                let lower = content.to_lowercase();
                let hits = query_words.iter().filter(|w| lower.contains(*w)).count();
                ScoredDocument {
                    content: content.to_string(),
                    metadata: HashMap::from([("source".to_string(), source.to_string())]),
                    score: hits as f64 / query_words.len().max(1) as f64,
                }
            })
            .filter(|d| d.score > 0.0)
            .collect();

        docs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        docs.truncate(k);
        Ok(docs)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("🌊 Estuary Simple Turn Example\n");

    let openai_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
    let tavily_key = std::env::var("TAVILY_API_KEY").unwrap_or_default();

    let retriever = Arc::new(NotesRetriever {
        notes: vec![
            ("rust.md", "Rust guarantees memory safety through ownership and borrowing."),
            ("async.md", "Tokio is the most widely used async runtime for Rust."),
            ("web.md", "Axum builds on tower services for ergonomic web handlers."),
        ],
    });

    println!("📦 Building engine...");
    let engine = EngineBuilder::new()
        .openai_key(&openai_key)
        .tavily_key(&tavily_key)
        .retriever(retriever)
        .model("gpt-4o")
        .temperature(0.7)
        .build()?;

    println!("✅ Engine ready!\n");

    let history = vec![Message::user("How does Rust guarantee memory safety?")];
    let (handle, mut events) = engine.run_turn(history, "example-conversation");
    println!("▶ run {} started", handle.run_id);

    let mut reconstructor = StreamReconstructor::new(ANSWER_NODE);
    while let Some(event) = events.recv().await {
        for client_event in reconstructor.push(&event) {
            match client_event {
                estuary::ClientEvent::AssistantToken { content } => print!("{}", content),
                estuary::ClientEvent::ToolCombined { name, result, .. } => {
                    println!("\n🔧 {}: {}", name, result)
                }
                other => println!("\n[{:?}]", other),
            }
        }
    }
    for client_event in reconstructor.finish() {
        println!("\n[{:?}]", client_event);
    }

    println!("\n\n✨ Done! final status: {:?}", handle.status());
    Ok(())
}
