pub mod openai;
pub mod search;
pub mod streaming;
pub mod traits;

pub use openai::OpenAiClient;
pub use search::{
    normalize_relevance, Retriever, ScoredDocument, TavilyClient, WebSearch, WebSearchResult,
};
pub use streaming::StreamEvent;
pub use traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse, JsonSchemaFormat};
