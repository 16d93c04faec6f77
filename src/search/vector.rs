use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::corpus::write_atomic;

pub const VECTORS_FILE: &str = "vectors.json";
pub const INDEX_INFO_FILE: &str = "index_info.json";

/// Similarity metric of a flat index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Inner product over L2-normalised rows; higher is better
    #[default]
    Cosine,
    /// Squared euclidean distance; lower is better
    L2,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::L2 => "l2",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cosine" | "ip" => Ok(Metric::Cosine),
            "l2" => Ok(Metric::L2),
            other => anyhow::bail!("Unknown metric '{other}', expected 'cosine' or 'l2'"),
        }
    }
}

/// Describes how a persisted index was built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub metric: Metric,
    pub normalized: bool,
    pub num_vectors: usize,
    pub dimension: usize,
    pub embedding_model: String,
    pub built_at: DateTime<Utc>,
}

impl IndexInfo {
    pub fn for_store(store: &VectorStore, embedding_model: &str) -> Self {
        Self {
            metric: store.metric,
            normalized: store.metric == Metric::Cosine,
            num_vectors: store.len(),
            dimension: store.dimension,
            embedding_model: embedding_model.to_string(),
            built_at: Utc::now(),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        write_atomic(&dir.join(INDEX_INFO_FILE), data.as_bytes()).context("Failed to write index info")
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_INFO_FILE);
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&data).context("Failed to parse index info")
    }
}

#[derive(Serialize, Deserialize)]
struct StoredVectors {
    metric: Metric,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// Exact (brute force) vector index. Row `i` is vector index `i`.
#[derive(Debug, Clone)]
pub struct VectorStore {
    metric: Metric,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl VectorStore {
    /// Build an index from embeddings. Rows are normalised for cosine.
    pub fn build(mut vectors: Vec<Vec<f32>>, metric: Metric) -> Result<Self> {
        let dimension = vectors
            .first()
            .map(Vec::len)
            .context("Cannot build an index from zero vectors")?;
        if dimension == 0 {
            anyhow::bail!("Embedding dimension is zero");
        }
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
            anyhow::bail!(
                "Vector {i} has dimension {}, expected {dimension}",
                v.len()
            );
        }

        if metric == Metric::Cosine {
            for v in vectors.iter_mut() {
                normalize(v);
            }
        }

        Ok(Self {
            metric,
            dimension,
            vectors,
        })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Top `k` rows for `query`, best first, as `(score, vector_idx)`.
    /// Cosine scores are inner products with the normalised query; l2 scores
    /// are squared distances.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(f32, usize)>> {
        if query.len() != self.dimension {
            anyhow::bail!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            );
        }

        let mut scored: Vec<(f32, usize)> = match self.metric {
            Metric::Cosine => {
                let mut q = query.to_vec();
                normalize(&mut q);
                self.vectors
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (dot(&q, v), i))
                    .collect()
            }
            Metric::L2 => self
                .vectors
                .iter()
                .enumerate()
                .map(|(i, v)| (squared_l2(query, v), i))
                .collect(),
        };

        match self.metric {
            // Sort descending by similarity
            Metric::Cosine => scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))),
            // Sort ascending by distance
            Metric::L2 => scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))),
        }
        scored.truncate(k);
        Ok(scored)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let stored = StoredVectors {
            metric: self.metric,
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        };
        let data = serde_json::to_string(&stored)?;
        write_atomic(&dir.join(VECTORS_FILE), data.as_bytes()).context("Failed to write vector store")
    }

    /// Load a persisted index. Rows are stored already normalised.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(VECTORS_FILE);
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let stored: StoredVectors =
            serde_json::from_str(&data).context("Failed to parse vector store")?;
        if stored.vectors.iter().any(|v| v.len() != stored.dimension) {
            anyhow::bail!("Vector store rows do not match dimension {}", stored.dimension);
        }
        Ok(Self {
            metric: stored.metric,
            dimension: stored.dimension,
            vectors: stored.vectors,
        })
    }
}

/// Scale `v` to unit length in place; zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_parse_and_display() {
        assert_eq!("COSINE".parse::<Metric>().unwrap(), Metric::Cosine);
        assert_eq!(" l2 ".parse::<Metric>().unwrap(), Metric::L2);
        assert!("dot".parse::<Metric>().is_err());
        assert_eq!(Metric::L2.to_string(), "l2");
        assert_eq!(serde_json::to_value(Metric::Cosine).unwrap(), "cosine");
    }

    #[test]
    fn test_build_rejects_empty_and_ragged() {
        assert!(VectorStore::build(vec![], Metric::Cosine).is_err());
        assert!(VectorStore::build(vec![vec![]], Metric::Cosine).is_err());
        let err = VectorStore::build(vec![vec![1.0, 0.0], vec![1.0]], Metric::L2).unwrap_err();
        assert!(err.to_string().contains("Vector 1"));
    }

    #[test]
    fn test_cosine_search_orders_by_similarity() {
        let store = VectorStore::build(
            vec![vec![0.0, 1.0], vec![3.0, 0.0], vec![1.0, 1.0]],
            Metric::Cosine,
        )
        .unwrap();
        let hits = store.search(&[2.0, 0.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.1).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!((hits[0].0 - 1.0).abs() < 1e-6);
        assert!((hits[1].0 - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!(hits[2].0.abs() < 1e-6);
    }

    #[test]
    fn test_l2_search_orders_by_distance() {
        let store =
            VectorStore::build(vec![vec![5.0, 5.0], vec![1.0, 0.0], vec![0.0, 2.0]], Metric::L2)
                .unwrap();
        let hits = store.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits, vec![(1.0, 1), (4.0, 2)]);
    }

    #[test]
    fn test_search_truncates_and_checks_dimension() {
        let store = VectorStore::build(vec![vec![1.0, 0.0]; 4], Metric::Cosine).unwrap();
        assert_eq!(store.search(&[1.0, 0.0], 10).unwrap().len(), 4);
        assert_eq!(store.search(&[1.0, 0.0], 2).unwrap().len(), 2);
        assert!(store.search(&[1.0, 0.0, 0.0], 2).is_err());
    }

    #[test]
    fn test_ties_keep_index_order() {
        let store = VectorStore::build(vec![vec![1.0, 0.0]; 3], Metric::Cosine).unwrap();
        let order: Vec<usize> = store.search(&[1.0, 0.0], 3).unwrap().iter().map(|h| h.1).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_zero_vector_normalize_is_noop() {
        let mut v = vec![0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::build(vec![vec![3.0, 4.0], vec![0.0, 1.0]], Metric::Cosine).unwrap();
        store.save(dir.path()).unwrap();
        let info = IndexInfo::for_store(&store, "test-model");
        info.save(dir.path()).unwrap();

        let loaded = VectorStore::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.metric(), Metric::Cosine);
        let hits = loaded.search(&[3.0, 4.0], 1).unwrap();
        assert_eq!(hits[0].1, 0);

        let info = IndexInfo::load(dir.path()).unwrap();
        assert!(info.normalized);
        assert_eq!(info.num_vectors, 2);
        assert_eq!(info.dimension, 2);
        assert_eq!(info.embedding_model, "test-model");
    }
}
