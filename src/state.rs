use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::Config;
use crate::corpus::PolicyCorpus;
use crate::models::BuildStatus;
use crate::search::retriever::RetrievalOptions;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Swapped wholesale when a rebuild finishes; searches hold their own Arc
    pub corpus: Arc<RwLock<Option<Arc<PolicyCorpus>>>>,
    pub build_status: Arc<RwLock<BuildStatus>>,
    /// Ranking options from config; requests override top_k/search_k on a copy
    pub retrieval_options: Arc<RetrievalOptions>,
    pub http_client: reqwest::Client,
    /// Single permit: builds share one index directory
    pub build_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let index_dir = config.index_dir();
        std::fs::create_dir_all(&index_dir)?;

        // Bad section weights are a startup error, not a per-request one
        let retrieval_options =
            RetrievalOptions::from_config(&config.retrieval, &config.llm.embedding_model)?;

        // Load a previously built corpus, if any
        let corpus = if PolicyCorpus::exists(&index_dir) {
            match PolicyCorpus::load(&index_dir) {
                Ok(corpus) => Some(Arc::new(corpus)),
                Err(e) => {
                    tracing::error!("Failed to load index from {}: {e:#}", index_dir.display());
                    None
                }
            }
        } else {
            tracing::info!("No index at {}; POST /api/index to build one", index_dir.display());
            None
        };

        Ok(Self {
            config,
            corpus: Arc::new(RwLock::new(corpus)),
            build_status: Arc::new(RwLock::new(BuildStatus::Idle)),
            retrieval_options: Arc::new(retrieval_options),
            http_client: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            build_semaphore: Arc::new(tokio::sync::Semaphore::new(1)),
        })
    }

    /// The corpus searches should run against, if one is loaded.
    pub fn current_corpus(&self) -> Option<Arc<PolicyCorpus>> {
        self.corpus.read().clone()
    }
}
