//! A built, searchable policy corpus: chunks, manifest, policy metadata and
//! the vector index, plus its on-disk layout.
//!
//! ```text
//! <dir>/chunks.jsonl      one Chunk per line
//! <dir>/manifest.jsonl    one ManifestRow per vector
//! <dir>/metadata.json     policy_id -> PolicyMeta
//! <dir>/vectors.json      flat index rows
//! <dir>/index_info.json   metric, dimension, embedding model, build time
//! ```

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::chunking::{build_policy_metadata_map, chunk_policies};
use crate::config::{ChunkingConfig, Config};
use crate::llm::embeddings;
use crate::models::{Chunk, ManifestRow, Policy, PolicyMeta};
use crate::normalize::{normalize_policy, NormalizeStats};
use crate::search::filter::FilterCriteria;
use crate::search::retriever::{self, Retrieval, RetrievalContext, RetrievalOptions, RetrievalSummary};
use crate::search::vector::{IndexInfo, Metric, VectorStore, INDEX_INFO_FILE, VECTORS_FILE};

pub const CHUNKS_FILE: &str = "chunks.jsonl";
pub const MANIFEST_FILE: &str = "manifest.jsonl";
pub const METADATA_FILE: &str = "metadata.json";

/// What an index build produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub policies: usize,
    pub skipped_policies: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub metric: Metric,
    pub embedding_model: String,
    pub normalize: NormalizeStats,
}

/// Normalised policies and their chunks, ready for embedding.
#[derive(Debug, Clone, Default)]
pub struct PreparedPolicies {
    pub policies: Vec<Policy>,
    pub chunks: Vec<Chunk>,
    pub skipped: usize,
    pub stats: NormalizeStats,
}

/// Offline half of a build that needs no network: normalise and chunk.
/// Policies without an id are skipped.
pub fn prepare_policies(policies: &[Policy], chunking: &ChunkingConfig) -> PreparedPolicies {
    let mut prepared = PreparedPolicies::default();
    for policy in policies {
        if policy.policy_id.trim().is_empty() {
            tracing::warn!("Skipping policy without policy_id: {:?}", policy.title);
            prepared.skipped += 1;
            continue;
        }
        let (normalized, stats) = normalize_policy(policy);
        prepared.stats.merge(&stats);
        prepared.policies.push(normalized);
    }
    prepared.chunks = chunk_policies(&prepared.policies, chunking);
    prepared
}

pub struct PolicyCorpus {
    chunks: HashMap<String, Chunk>,
    manifest: BTreeMap<usize, ManifestRow>,
    metadata: BTreeMap<String, PolicyMeta>,
    store: VectorStore,
    info: IndexInfo,
}

impl PolicyCorpus {
    /// Assemble a corpus from chunks and their embeddings, which must be
    /// parallel: row `i` of the index is `chunks[i]`.
    pub fn from_parts(
        chunks: Vec<Chunk>,
        metadata: BTreeMap<String, PolicyMeta>,
        embeddings: Vec<Vec<f32>>,
        metric: Metric,
        embedding_model: &str,
    ) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            anyhow::bail!(
                "Got {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }
        let store = VectorStore::build(embeddings, metric)?;
        let info = IndexInfo::for_store(&store, embedding_model);
        let manifest = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, ManifestRow::from_chunk(c, i)))
            .collect();
        let chunks = chunks.into_iter().map(|c| (c.chunk_id.clone(), c)).collect();

        Ok(Self {
            chunks,
            manifest,
            metadata,
            store,
            info,
        })
    }

    /// Normalise, chunk, embed and index `policies`.
    pub async fn build(
        policies: &[Policy],
        config: &Config,
        client: &reqwest::Client,
    ) -> Result<(Self, BuildReport)> {
        let prepared = prepare_policies(policies, &config.chunking);
        if prepared.chunks.is_empty() {
            anyhow::bail!("No chunks produced from {} policies", policies.len());
        }
        tracing::info!(
            "Prepared {} chunks from {} policies ({} skipped)",
            prepared.chunks.len(),
            prepared.policies.len(),
            prepared.skipped
        );

        let texts: Vec<String> = prepared.chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embeddings::embed_batch(client, &config.llm, &texts)
            .await
            .context("Failed to embed policy chunks")?;

        let metadata = build_policy_metadata_map(&prepared.policies);
        let corpus = Self::from_parts(
            prepared.chunks,
            metadata,
            embeddings,
            config.metric,
            &config.llm.embedding_model,
        )?;

        if corpus.info.dimension != config.llm.embedding_dim {
            tracing::warn!(
                "Embedding dimension {} differs from configured {}",
                corpus.info.dimension,
                config.llm.embedding_dim
            );
        }

        let report = BuildReport {
            policies: prepared.policies.len(),
            skipped_policies: prepared.skipped,
            chunks: corpus.chunk_count(),
            dimension: corpus.info.dimension,
            metric: corpus.info.metric,
            embedding_model: corpus.info.embedding_model.clone(),
            normalize: prepared.stats,
        };
        Ok((corpus, report))
    }

    /// Whether `dir` holds a saved corpus.
    pub fn exists(dir: &Path) -> bool {
        [CHUNKS_FILE, MANIFEST_FILE, VECTORS_FILE, INDEX_INFO_FILE]
            .iter()
            .all(|f| dir.join(f).exists())
    }

    /// Save into a staging directory next to `dir`, then swap it into place,
    /// so `dir` never mixes files from two builds.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let staging = sibling_dir(dir, "staging")?;
        if staging.exists() {
            std::fs::remove_dir_all(&staging)
                .with_context(|| format!("Failed to clear {}", staging.display()))?;
        }
        std::fs::create_dir_all(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;

        if let Err(e) = self.write_files(&staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }
        replace_dir(&staging, dir, &sibling_dir(dir, "previous")?)?;

        tracing::info!("Saved corpus ({} vectors) to {}", self.store.len(), dir.display());
        Ok(())
    }

    fn write_files(&self, dir: &Path) -> Result<()> {
        let mut chunks: Vec<&Chunk> = self
            .manifest
            .values()
            .filter_map(|r| self.chunks.get(&r.chunk_id))
            .collect();
        chunks.dedup_by(|a, b| a.chunk_id == b.chunk_id);
        write_jsonl(&dir.join(CHUNKS_FILE), chunks)?;
        write_jsonl(&dir.join(MANIFEST_FILE), self.manifest.values())?;
        write_atomic(
            &dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&self.metadata)?.as_bytes(),
        )?;
        self.store.save(dir)?;
        self.info.save(dir)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let store = VectorStore::load(dir)?;
        let info = IndexInfo::load(dir)?;
        let rows: Vec<ManifestRow> = read_jsonl(&dir.join(MANIFEST_FILE))?;
        if rows.len() != store.len() {
            anyhow::bail!(
                "Manifest has {} rows but the index holds {} vectors",
                rows.len(),
                store.len()
            );
        }
        if info.num_vectors != store.len() || info.metric != store.metric() {
            anyhow::bail!("index_info.json does not describe the stored vectors");
        }

        let mut manifest = BTreeMap::new();
        for row in rows {
            if row.vector_idx >= store.len() {
                anyhow::bail!("Manifest row {} points past the index", row.vector_idx);
            }
            if let Some(prev) = manifest.insert(row.vector_idx, row) {
                anyhow::bail!("Duplicate manifest row for vector {}", prev.vector_idx);
            }
        }

        let chunks: HashMap<String, Chunk> = read_jsonl::<Chunk>(&dir.join(CHUNKS_FILE))?
            .into_iter()
            .map(|c| (c.chunk_id.clone(), c))
            .collect();
        if let Some(row) = manifest.values().find(|r| !chunks.contains_key(&r.chunk_id)) {
            anyhow::bail!(
                "Manifest row {} references chunk {} missing from {CHUNKS_FILE}",
                row.vector_idx,
                row.chunk_id
            );
        }

        let metadata_path = dir.join(METADATA_FILE);
        let metadata = if metadata_path.exists() {
            let data = std::fs::read_to_string(&metadata_path)
                .with_context(|| format!("Failed to read {}", metadata_path.display()))?;
            serde_json::from_str(&data).context("Failed to parse policy metadata")?
        } else {
            tracing::warn!("No {METADATA_FILE} in {}, eligibility filters will pass everything", dir.display());
            BTreeMap::new()
        };

        tracing::info!(
            "Loaded corpus: {} vectors, {} chunks, {} policies ({}, dim {})",
            store.len(),
            chunks.len(),
            metadata.len(),
            info.metric,
            info.dimension
        );

        Ok(Self {
            chunks,
            manifest,
            metadata,
            store,
            info,
        })
    }

    pub fn info(&self) -> &IndexInfo {
        &self.info
    }

    pub fn chunk_count(&self) -> usize {
        self.manifest.len()
    }

    pub fn policy_count(&self) -> usize {
        self.metadata.len()
    }

    pub fn retrieve(
        &self,
        query: &str,
        query_embedding: &[f32],
        criteria: &FilterCriteria,
        options: &RetrievalOptions,
    ) -> Result<Retrieval> {
        let ctx = RetrievalContext {
            store: &self.store,
            manifest: &self.manifest,
            chunks: &self.chunks,
            metadata: &self.metadata,
        };
        retriever::retrieve(&ctx, query, query_embedding, criteria, options)
    }

    pub fn summarize(&self, retrieval: &Retrieval) -> RetrievalSummary {
        retriever::summarize(retrieval, &self.metadata)
    }
}

/// Read policies from a JSON array, or from JSONL when the file extension
/// is `.jsonl`.
pub fn read_policies(path: &Path) -> Result<Vec<Policy>> {
    if path.extension().is_some_and(|e| e == "jsonl") {
        return read_jsonl(path);
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse one JSON value per non-blank line.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row = serde_json::from_str(line)
            .with_context(|| format!("Invalid JSONL at {}:{}", path.display(), i + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

fn write_jsonl<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut buf = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut buf, &row)?;
        buf.write_all(b"\n")?;
    }
    write_atomic(path, &buf)
}

/// `<parent>/<name>.<suffix>` for a directory `dir`.
fn sibling_dir(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .with_context(|| format!("Index directory {} has no name", dir.display()))?;
    let mut sibling = name.to_os_string();
    sibling.push(".");
    sibling.push(suffix);
    Ok(dir.with_file_name(sibling))
}

/// Move `staging` to `dir`, parking the old `dir` at `previous` until the
/// move succeeds. On failure the old directory is put back.
fn replace_dir(staging: &Path, dir: &Path, previous: &Path) -> Result<()> {
    if previous.exists() {
        std::fs::remove_dir_all(previous)
            .with_context(|| format!("Failed to clear {}", previous.display()))?;
    }
    let had_previous = dir.exists();
    if had_previous {
        std::fs::rename(dir, previous)
            .with_context(|| format!("Failed to move {} aside", dir.display()))?;
    }
    if let Err(e) = std::fs::rename(staging, dir) {
        if had_previous {
            let _ = std::fs::rename(previous, dir);
        }
        return Err(e).with_context(|| format!("Failed to move new index into {}", dir.display()));
    }
    if had_previous {
        if let Err(e) = std::fs::remove_dir_all(previous) {
            tracing::warn!("Failed to remove old index at {}: {e}", previous.display());
        }
    }
    Ok(())
}

/// Write via a temp file and rename so readers never see a partial file.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, data)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
