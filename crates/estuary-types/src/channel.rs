//! Channel (state field) names shared between the graph wiring and the
//! pipeline nodes. Merge behavior per channel is declared in the merge plan
//! at graph construction, not here.

// Conversation-level channels
pub const MESSAGES: &str = "messages";
pub const SUMMARY: &str = "summary";
pub const ROUTE: &str = "route";
pub const ROUTING_DECISION: &str = "routing_decision";
pub const KNOWLEDGE_FINDINGS: &str = "knowledge_findings";
pub const SUMMARIZER_RESPONSE: &str = "summarizer_response";
pub const DOCUMENT_CONTENT: &str = "document_content";

// Knowledge pipeline internals
pub const QUERY: &str = "query";
pub const ORIGINAL_QUERY: &str = "original_query";
pub const INTERNAL_DOCS: &str = "internal_docs";
pub const DOCS_RELEVANT: &str = "docs_relevant";
pub const DOCS_GRADE_EXPLANATION: &str = "docs_grade_explanation";
pub const DOCS_ANALYSIS: &str = "docs_analysis";
pub const EXTERNAL_RESULTS: &str = "external_results";

// Summarizer pipeline internals
pub const DOCUMENT: &str = "document";
pub const INPUT_DOCUMENT: &str = "input_document";
pub const CHUNK_SUMMARIES: &str = "chunk_summaries";

// Fan-out branch seed fields
pub const CHUNK_TEXT: &str = "chunk_text";
pub const CHUNK_INDEX: &str = "chunk_index";
