use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::search::vector::Metric;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the chunk, manifest and vector files are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Embedding provider configuration
    pub llm: LlmConfig,
    /// Ranking knobs applied to every search
    pub retrieval: RetrievalConfig,
    /// Offline chunking parameters
    pub chunking: ChunkingConfig,
    /// Similarity metric used when building a new index
    pub metric: Metric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the embedding API
    pub base_url: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
    /// Texts per embedding request
    pub batch_size: usize,
    /// Attempts per batch before giving up
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts
    pub retry_base_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of results returned
    pub top_k: usize,
    /// First-stage candidate count (0 = derive from top_k)
    pub search_k: usize,
    /// Base section weights, e.g. "META=0.92,ELIGIBILITY=1.10"
    pub section_weights: String,
    pub section_weighting: bool,
    pub dynamic_section_weighting: bool,
    pub dynamic_category_weighting: bool,
    pub text_dedup: bool,
    /// Texts shorter than this (in chars) are never treated as duplicates
    pub text_dedup_min_len: usize,
    pub preview_chars: usize,
}

/// Character budgets for policy chunking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap: usize,
    /// Pieces shorter than this absorb their successor
    pub min_chars: usize,
    /// Pieces shorter than this are discarded
    pub drop_under: usize,
}

pub const DEFAULT_SECTION_WEIGHTS: &str = "META=0.92,ELIGIBILITY=1.10,BENEFIT=1.03,PROCESS=1.00";

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9100".to_string(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunking: ChunkingConfig::default(),
            metric: Metric::Cosine,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_key: None,
            embedding_dim: 1536,
            batch_size: 32,
            max_retries: 5,
            retry_base_ms: 1200,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            search_k: 0,
            section_weights: DEFAULT_SECTION_WEIGHTS.to_string(),
            section_weighting: true,
            dynamic_section_weighting: true,
            dynamic_category_weighting: true,
            text_dedup: true,
            text_dedup_min_len: 80,
            preview_chars: 300,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 900,
            overlap: 120,
            min_chars: 180,
            drop_under: 35,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = std::env::var(key) {
        match val.trim().parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!("Ignoring unparseable {key}={val}"),
        }
    }
}

fn env_flag(key: &str, target: &mut bool) {
    if let Ok(val) = std::env::var(key) {
        match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => tracing::warn!("Ignoring unparseable {key}={val}"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("POLICY_SEARCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("POLICY_SEARCH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(metric) = std::env::var("POLICY_SEARCH_METRIC") {
            match metric.parse() {
                Ok(m) => config.metric = m,
                Err(e) => tracing::warn!("{e}"),
            }
        }

        // Embedding provider
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY")) {
            if !key.trim().is_empty() {
                config.llm.api_key = Some(key.trim().to_string());
            }
        }
        env_parse("LLM_EMBEDDING_DIM", &mut config.llm.embedding_dim);
        env_parse("LLM_EMBED_BATCH_SIZE", &mut config.llm.batch_size);
        env_parse("LLM_EMBED_MAX_RETRIES", &mut config.llm.max_retries);
        env_parse("LLM_EMBED_RETRY_BASE_MS", &mut config.llm.retry_base_ms);

        // Retrieval
        let r = &mut config.retrieval;
        env_parse("POLICY_SEARCH_TOP_K", &mut r.top_k);
        env_parse("POLICY_SEARCH_SEARCH_K", &mut r.search_k);
        if let Ok(weights) = std::env::var("POLICY_SEARCH_SECTION_WEIGHTS") {
            r.section_weights = weights;
        }
        env_flag("POLICY_SEARCH_SECTION_WEIGHTING", &mut r.section_weighting);
        env_flag("POLICY_SEARCH_DYNAMIC_SECTION_WEIGHTING", &mut r.dynamic_section_weighting);
        env_flag("POLICY_SEARCH_DYNAMIC_CATEGORY_WEIGHTING", &mut r.dynamic_category_weighting);
        env_flag("POLICY_SEARCH_TEXT_DEDUP", &mut r.text_dedup);
        env_parse("POLICY_SEARCH_TEXT_DEDUP_MIN_LEN", &mut r.text_dedup_min_len);
        env_parse("POLICY_SEARCH_PREVIEW_CHARS", &mut r.preview_chars);

        // Chunking
        let c = &mut config.chunking;
        env_parse("POLICY_SEARCH_CHUNK_MAX_CHARS", &mut c.max_chars);
        env_parse("POLICY_SEARCH_CHUNK_OVERLAP", &mut c.overlap);
        env_parse("POLICY_SEARCH_CHUNK_MIN_CHARS", &mut c.min_chars);
        env_parse("POLICY_SEARCH_CHUNK_DROP_UNDER", &mut c.drop_under);
        if c.overlap >= c.max_chars {
            tracing::warn!(
                "Chunk overlap {} must be below max_chars {}, clamping",
                c.overlap,
                c.max_chars
            );
            c.overlap = c.max_chars / 2;
        }

        config
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let config = Config::default();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.text_dedup_min_len, 80);
        assert_eq!(config.chunking.max_chars, 900);
        assert_eq!(config.chunking.overlap, 120);
        assert_eq!(config.metric, Metric::Cosine);
        assert_eq!(config.index_dir(), PathBuf::from("./data/index"));
    }
}
