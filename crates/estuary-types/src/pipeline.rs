use serde::{Deserialize, Serialize};

/// Routing destination for one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Answer,
    Knowledge,
    DocumentSummarizer,
}

impl Route {
    /// Graph node name this route dispatches to
    pub fn node_name(&self) -> &'static str {
        match self {
            Route::Answer => "answer",
            Route::Knowledge => "knowledge",
            Route::DocumentSummarizer => "document_summarizer",
        }
    }

    /// Parse a classifier token (`ANSWER`/`KNOWLEDGE`/`SUMMARIZE`).
    ///
    /// Anything unrecognized maps to None; the caller falls back to
    /// Knowledge, which is the safe default.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_uppercase().as_str() {
            "ANSWER" => Some(Route::Answer),
            "KNOWLEDGE" => Some(Route::Knowledge),
            "SUMMARIZE" => Some(Route::DocumentSummarizer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Internal,
    External,
}

/// One normalized finding handed to the answer stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeFinding {
    pub context: String,
    pub source_type: SourceType,
    /// Document name for internal findings, URL for external ones
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub score: f64,
}

/// Knowledge pipeline output: structured findings plus the pre-rendered
/// "Source N [...]" context block the answer stage injects verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeFindings {
    pub documents: Vec<KnowledgeFinding>,
    pub formatted_context: String,
}

/// A chunk summary carrying the index of the chunk it came from.
///
/// Fan-out branches complete in arbitrary order; the index is what restores
/// document order at the combine step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedSummary {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummarizerMetadata {
    pub num_chunks: usize,
    pub avg_summary_length: f64,
}

/// Summarizer pipeline output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummarizerResponse {
    pub chunk_summaries: Vec<String>,
    pub formatted_chunk_summaries: String,
    pub num_chunks: usize,
    pub metadata: SummarizerMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_token_parsing() {
        assert_eq!(Route::from_token("answer"), Some(Route::Answer));
        assert_eq!(Route::from_token(" KNOWLEDGE "), Some(Route::Knowledge));
        assert_eq!(Route::from_token("Summarize"), Some(Route::DocumentSummarizer));
        assert_eq!(Route::from_token("banana"), None);
    }

    #[test]
    fn test_finding_serialization_skips_missing_title() {
        let finding = KnowledgeFinding {
            context: "text".to_string(),
            source_type: SourceType::Internal,
            source: "notes.md".to_string(),
            title: None,
            score: 0.8,
        };

        let json = serde_json::to_string(&finding).unwrap();
        assert!(json.contains("\"source_type\":\"internal\""));
        assert!(!json.contains("title"));
    }
}
