pub mod channel;
pub mod events;
pub mod message;
pub mod pipeline;

pub use events::TraceEvent;
pub use message::{Message, Role};
pub use pipeline::{
    IndexedSummary, KnowledgeFinding, KnowledgeFindings, Route, SourceType, SummarizerMetadata,
    SummarizerResponse,
};
