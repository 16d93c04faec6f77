use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::models::{SearchRequest, SearchResponse};
use crate::profile::build_auto_query;
use crate::search::filter::FilterCriteria;
use crate::search::retriever::RetrievalOptions;
use crate::state::AppState;

/// Upper bound on `top_k` accepted from clients
const MAX_TOP_K: usize = 50;

/// Explicit request filters, falling back to the ones in the profile.
fn request_criteria(req: &SearchRequest) -> FilterCriteria {
    let explicit = FilterCriteria {
        age: req.age,
        region_sido: req.region_sido.clone(),
        region_sigungu: req.region_sigungu.clone(),
        monthly_income_m: req.monthly_income_m,
    };
    explicit.or(req
        .profile
        .as_ref()
        .map(FilterCriteria::from_profile)
        .unwrap_or_default())
}

fn request_options(base: &RetrievalOptions, req: &SearchRequest) -> RetrievalOptions {
    let mut options = base.clone();
    if let Some(top_k) = req.top_k {
        options.top_k = top_k.clamp(1, MAX_TOP_K);
    }
    if let Some(search_k) = req.search_k {
        options.search_k = Some(search_k);
    }
    options
}

/// POST /api/search - Policy retrieval:
///   1. Query from the request, or composed from the profile
///   2. Eligibility criteria (explicit fields win over profile fields)
///   3. Query embedding with the model the index was built with
///   4. Flat vector search, filter, dedup and intent-weighted re-rank
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let corpus = state.current_corpus().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "No index loaded; build one with POST /api/index".to_string(),
    ))?;

    let query = match (req.query.trim(), &req.profile) {
        ("", Some(profile)) => build_auto_query(profile),
        ("", None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "Query or profile is required".to_string(),
            ))
        }
        (q, _) => q.to_string(),
    };

    let criteria = request_criteria(&req);
    let mut options = request_options(&state.retrieval_options, &req);

    // Queries must be embedded with the model the index was built with
    let mut llm_config = state.config.llm.clone();
    llm_config.embedding_model = corpus.info().embedding_model.clone();
    options.query_model = llm_config.embedding_model.clone();

    let embedding =
        crate::llm::embeddings::embed_single(&state.http_client, &llm_config, &query)
            .await
            .map_err(|e| {
                tracing::warn!("Query embedding failed: {e:#}");
                (StatusCode::BAD_GATEWAY, format!("Embedding error: {e}"))
            })?;

    let query_for_rank = query.clone();
    let retrieval = tokio::task::spawn_blocking(move || {
        let retrieval = corpus.retrieve(&query_for_rank, &embedding, &criteria, &options)?;
        let summary = corpus.summarize(&retrieval);
        anyhow::Ok((retrieval, summary))
    })
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Search task failed: {e}"),
        )
    })?
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Search error: {e:#}"),
        )
    })?;
    let (retrieval, summary) = retrieval;

    tracing::info!(
        "Search '{}': {} results, {} dedup skipped, allowed policies {:?}",
        query,
        summary.result_count,
        summary.dedup_skipped,
        retrieval.debug.allowed_policy_ids_count
    );

    Ok(Json(SearchResponse {
        query,
        results: retrieval.results,
        summary,
        debug: retrieval.debug,
    }))
}
