//! High-level builder API for the conversational turn engine

use anyhow::{Context, Result};
use estuary_agents::{conversation_graph, AgentConfig};
use estuary_graph::{CompiledGraph, RunHandle, Update};
use estuary_llm::{OpenAiClient, Retriever, TavilyClient, WebSearch};
use estuary_types::{channel, Message, TraceEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Builder wiring the model client, retrieval backends and configuration
/// into a compiled turn graph.
///
/// # Example
///
/// ```rust,no_run
/// use estuary::prelude::*;
/// # use std::sync::Arc;
/// # fn retriever() -> Arc<dyn estuary::llm::Retriever> { unimplemented!() }
///
/// # fn main() -> Result<()> {
/// let engine = EngineBuilder::new()
///     .openai_key(std::env::var("OPENAI_API_KEY")?)
///     .tavily_key(std::env::var("TAVILY_API_KEY")?)
///     .retriever(retriever())
///     .model("gpt-4o")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct EngineBuilder {
    openai_key: Option<String>,
    tavily_key: Option<String>,
    retriever: Option<Arc<dyn Retriever>>,
    web_search: Option<Arc<dyn WebSearch>>,
    config: AgentConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self {
            openai_key: None,
            tavily_key: None,
            retriever: None,
            web_search: None,
            config: AgentConfig::default(),
        }
    }

    /// Set OpenAI API key (required)
    pub fn openai_key(mut self, key: impl Into<String>) -> Self {
        self.openai_key = Some(key.into());
        self
    }

    /// Set Tavily API key for external web search
    pub fn tavily_key(mut self, key: impl Into<String>) -> Self {
        self.tavily_key = Some(key.into());
        self
    }

    /// Set the internal retrieval backend (required)
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Override the web search backend (defaults to Tavily)
    pub fn web_search(mut self, web_search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(web_search);
        self
    }

    /// Set LLM model (default: gpt-4o)
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.llm.model = model.into();
        self
    }

    /// Set temperature (default: 0.7)
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.llm.temperature = temperature;
        self
    }

    /// Replace the whole configuration (loaded from files/env)
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Compile the turn graph
    pub fn build(self) -> Result<TurnEngine> {
        let openai_key = self
            .openai_key
            .context("OpenAI API key is required (use .openai_key())")?;
        let retriever = self
            .retriever
            .context("a retriever is required (use .retriever())")?;

        let client = Arc::new(OpenAiClient::new(openai_key)?);
        let web_search: Arc<dyn WebSearch> = match self.web_search {
            Some(web_search) => web_search,
            None => Arc::new(TavilyClient::new(self.tavily_key.unwrap_or_default())),
        };

        let graph = conversation_graph(client, retriever, web_search, &self.config)?;

        Ok(TurnEngine {
            graph: Arc::new(graph),
        })
    }
}

/// A compiled conversational turn engine
pub struct TurnEngine {
    graph: Arc<CompiledGraph>,
}

impl TurnEngine {
    /// Execute one turn over the given history, returning a run handle and
    /// the raw trace event receiver.
    ///
    /// Feed the receiver through a [`estuary_stream::StreamReconstructor`]
    /// to get client-facing events.
    pub fn run_turn(
        &self,
        messages: Vec<Message>,
        conversation_id: impl Into<String>,
    ) -> (RunHandle, mpsc::Receiver<TraceEvent>) {
        let mut input = Update::new();
        for message in messages {
            input = input.push_message(channel::MESSAGES, message);
        }
        self.graph.spawn_run(input, conversation_id)
    }

    /// The underlying compiled graph
    pub fn graph(&self) -> &Arc<CompiledGraph> {
        &self.graph
    }
}
