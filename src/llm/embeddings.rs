use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;

/// Maximum characters to send per text to the embedding API.
/// Policy chunks are capped well below this by the chunker; the limit only
/// guards against hand-written queries or oversized META blocks.
const MAX_EMBED_CHARS: usize = 6_000;

/// Truncate `text` to at most `MAX_EMBED_CHARS` characters.
fn truncate_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Backoff before retry `attempt` (0-based): `base * 2^attempt`.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(16)))
}

/// Generate embeddings for a batch of texts using the configured provider.
/// The result is parallel with `texts`.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let truncated: Vec<String> = texts
        .iter()
        .map(|t| truncate_for_embedding(t).to_string())
        .collect();

    let batch_size = config.batch_size.max(1);
    let total = truncated.len();
    let mut all_embeddings = Vec::with_capacity(total);

    for batch in truncated.chunks(batch_size) {
        let embeddings = embed_with_retry(client, config, batch).await?;
        if embeddings.len() != batch.len() {
            anyhow::bail!(
                "Embedding API returned {} vectors for a batch of {}",
                embeddings.len(),
                batch.len()
            );
        }
        all_embeddings.extend(embeddings);
        tracing::info!("Embedded {}/{} chunks", all_embeddings.len(), total);
    }

    Ok(all_embeddings)
}

/// Generate embedding for a single text.
pub async fn embed_single(
    client: &reqwest::Client,
    config: &LlmConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let results = embed_batch(client, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .context("No embedding returned")
}

async fn embed_with_retry(
    client: &reqwest::Client,
    config: &LlmConfig,
    batch: &[String],
) -> Result<Vec<Vec<f32>>> {
    let attempts = config.max_retries.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        let result = match config.provider.as_str() {
            "ollama" => embed_ollama(client, config, batch).await,
            "openai" => embed_openai(client, config, batch).await,
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        };

        match result {
            Ok(embeddings) => return Ok(embeddings),
            Err(e) => {
                if attempt + 1 < attempts {
                    let delay = backoff_delay(config.retry_base_ms, attempt);
                    tracing::warn!(
                        "Embedding request failed ({}/{attempts}), retrying in {:?}: {e:#}",
                        attempt + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("no embedding attempt made"))
        .context(format!("Embedding failed after {attempts} attempts")))
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    /// Ask Ollama to silently truncate inputs that exceed the model's context
    /// length instead of returning a 400 error.
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/api/embed", config.base_url.trim_end_matches('/'));

    let req = OllamaEmbedRequest {
        model: &config.embedding_model,
        input: texts,
        truncate: true,
    };

    let resp = client
        .post(&url)
        .json(&req)
        .send()
        .await
        .context("Failed to call Ollama embed API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Ollama embed API returned {status}: {body}");
    }

    let body: OllamaEmbedResponse = resp
        .json()
        .await
        .context("Failed to parse Ollama embed response")?;

    Ok(body.embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/v1/embeddings", config.base_url.trim_end_matches('/'));
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let req = OpenAiEmbedRequest {
        model: &config.embedding_model,
        input: texts,
    };

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .context("Failed to call OpenAI embed API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI embed API returned {status}: {body}");
    }

    let body: OpenAiEmbedResponse = resp
        .json()
        .await
        .context("Failed to parse OpenAI embed response")?;

    let mut data = body.data;
    // The API may reorder items; restore input order when indices are present
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}
