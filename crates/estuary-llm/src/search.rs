use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Document retrieved from the internal knowledge index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Relevance in [0, 1] (already normalized)
    pub score: f64,
}

/// Result from an external web search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: f64,
}

/// Internal retrieval capability (vector index behind the scenes)
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>>;
}

/// External web search capability
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<WebSearchResult>>;
}

/// Map a similarity score reported in [-1, 1] into [0, 1], clamped.
pub fn normalize_relevance(score: f64) -> f64 {
    ((score + 1.0) / 2.0).clamp(0.0, 1.0)
}

const TAVILY_API_URL: &str = "https://api.tavily.com/search";

/// Tavily web search client
pub struct TavilyClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_results: usize,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: TAVILY_API_URL.to_string(),
            max_results: 5,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn search(&self, query: &str) -> Result<Vec<WebSearchResult>> {
        let payload = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": self.max_results,
            "search_depth": "advanced",
        });

        let response = self
            .http_client
            .post(&self.base_url)
            .json(&payload)
            .send()
            .await
            .context("Failed to send search request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Tavily API error ({}): {}", status, error_text);
        }

        let raw: TavilyResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        Ok(raw
            .results
            .into_iter()
            .map(|r| WebSearchResult {
                title: r.title,
                url: r.url,
                content: r.content,
                score: r.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relevance_maps_range() {
        assert_eq!(normalize_relevance(-1.0), 0.0);
        assert_eq!(normalize_relevance(0.0), 0.5);
        assert_eq!(normalize_relevance(1.0), 1.0);
    }

    #[test]
    fn test_normalize_relevance_clamps_out_of_range() {
        assert_eq!(normalize_relevance(-3.0), 0.0);
        assert_eq!(normalize_relevance(2.5), 1.0);
    }

    #[test]
    fn test_tavily_response_parsing_tolerates_missing_fields() {
        let raw: TavilyResponse =
            serde_json::from_str(r#"{"results":[{"url":"https://example.com","score":0.7}]}"#)
                .unwrap();
        assert_eq!(raw.results.len(), 1);
        assert_eq!(raw.results[0].title, "");
        assert_eq!(raw.results[0].score, 0.7);
    }
}
