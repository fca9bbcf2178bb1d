use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub compaction: CompactionConfig,
    pub summarizer: SummarizerConfig,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub tavily_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Documents fetched per internal search
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Message count above which the history is compacted
    pub threshold: usize,
    /// Messages kept verbatim after compaction
    pub keep_recent: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            keep_recent: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Chunk plan used when the analyze step cannot produce one
    pub default_chunk_size: usize,
    pub default_chunk_overlap: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: 500,
            default_chunk_overlap: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            compaction: CompactionConfig::default(),
            summarizer: SummarizerConfig::default(),
            logging: LoggingConfig::default(),
            openai_api_key: String::new(),
            tavily_api_key: String::new(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. Compiled-in defaults
    /// 2. config/default.toml
    /// 3. config/{ENV}.toml (if ENV is set)
    /// 4. Environment variables: underscores separate path segments, so
    ///    `LLM_MODEL` overrides `llm.model` and `COMPACTION_THRESHOLD`
    ///    overrides `compaction.threshold`; snake_case keys
    ///    (`COMPACTION_KEEP_RECENT`, `SUMMARIZER_DEFAULT_CHUNK_SIZE`,
    ///    `SUMMARIZER_DEFAULT_CHUNK_OVERLAP`) are read directly
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::default().separator("_").try_parsing(true));

        let config = builder.build()?;
        let mut cfg: AgentConfig = config.try_deserialize()?;

        // Keys containing underscores cannot be addressed through the
        // separator-based source, so they are read directly
        for (var, slot) in [
            ("COMPACTION_KEEP_RECENT", &mut cfg.compaction.keep_recent),
            (
                "SUMMARIZER_DEFAULT_CHUNK_SIZE",
                &mut cfg.summarizer.default_chunk_size,
            ),
            (
                "SUMMARIZER_DEFAULT_CHUNK_OVERLAP",
                &mut cfg.summarizer.default_chunk_overlap,
            ),
        ] {
            if let Ok(raw) = std::env::var(var) {
                *slot = raw
                    .parse()
                    .map_err(|_| ConfigError::Message(format!("{} must be an integer", var)))?;
            }
        }

        // Secrets come from ENV, never from TOML
        cfg.openai_api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ConfigError::Message("OPENAI_API_KEY environment variable is required".to_string())
        })?;
        cfg.tavily_api_key = std::env::var("TAVILY_API_KEY").unwrap_or_default();

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));
        let config = builder.build()?;
        config.try_deserialize()
    }
}
