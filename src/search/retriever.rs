//! Vector retrieval with eligibility filtering, de-duplication and
//! intent-weighted re-ranking.
//!
//! ```text
//! query ──► intent weights ─────────────────────────┐
//! embedding ──► flat index (search_k) ──► manifest ─┤
//!                                    filter/dedup ──┴─► rank_score ──► top_k
//! ```

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use super::filter::{build_allowed_policy_ids, FilterCriteria};
use super::intent::{
    effective_section_weights, infer_dynamic_category_weights, infer_dynamic_section_weights,
    neutral_weights, parse_section_weights, zero_scores, IntentScores, Weights,
};
use super::vector::{Metric, VectorStore};
use crate::config::RetrievalConfig;
use crate::models::{Category, Chunk, ManifestRow, PolicyMeta, RetrievalHit, Section};

/// Number of hits listed in a [`RetrievalSummary`].
const SUMMARY_ITEMS: usize = 5;

/// Per-search ranking options.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub top_k: usize,
    /// First-stage candidate count; `None` derives it from `top_k`
    pub search_k: Option<usize>,
    pub base_section_weights: Weights<Section>,
    pub section_weighting: bool,
    pub dynamic_section_weighting: bool,
    pub dynamic_category_weighting: bool,
    pub text_dedup: bool,
    pub text_dedup_min_len: usize,
    pub preview_chars: usize,
    /// Reported in debug output only
    pub query_model: String,
}

impl RetrievalOptions {
    pub fn from_config(config: &RetrievalConfig, query_model: &str) -> Result<Self> {
        Ok(Self {
            top_k: config.top_k,
            search_k: (config.search_k > 0).then_some(config.search_k),
            base_section_weights: parse_section_weights(&config.section_weights)?,
            section_weighting: config.section_weighting,
            dynamic_section_weighting: config.dynamic_section_weighting,
            dynamic_category_weighting: config.dynamic_category_weighting,
            text_dedup: config.text_dedup,
            text_dedup_min_len: config.text_dedup_min_len,
            preview_chars: config.preview_chars,
            query_model: query_model.to_string(),
        })
    }
}

/// Read-only data a retrieval runs against.
pub struct RetrievalContext<'a> {
    pub store: &'a VectorStore,
    pub manifest: &'a BTreeMap<usize, ManifestRow>,
    pub chunks: &'a HashMap<String, Chunk>,
    pub metadata: &'a BTreeMap<String, PolicyMeta>,
}

/// Diagnostics describing how a result list was produced.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalDebug {
    pub query_model: String,
    pub metric: Metric,
    pub search_k: usize,
    pub base_section_weights: Weights<Section>,
    pub section_intent_scores: IntentScores<Section>,
    pub dynamic_section_weights: Weights<Section>,
    pub effective_section_weights: Weights<Section>,
    pub category_intent_scores: IntentScores<Category>,
    pub dynamic_category_weights: Weights<Category>,
    pub age: Option<u32>,
    pub region_sido: String,
    pub region_sigungu: String,
    pub monthly_income_m: Option<u32>,
    pub allowed_policy_ids_count: Option<usize>,
    pub dedup_skipped: usize,
    pub result_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryItem {
    pub policy_id: String,
    pub chunk_id: String,
    pub section: Section,
    pub score: f32,
    pub rank_score: f32,
    pub source_url: Option<String>,
}

/// Compact view of a retrieval, suitable for logs and API clients.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalSummary {
    pub result_count: usize,
    pub dedup_skipped: usize,
    pub top_items: Vec<SummaryItem>,
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    pub results: Vec<RetrievalHit>,
    pub debug: RetrievalDebug,
}

/// De-dup key for chunk text: empty for texts shorter than `min_len` chars,
/// otherwise the lowercase text with non-word characters removed.
pub fn text_key(text: &str, min_len: usize) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let t = text.trim();
    if t.chars().count() < min_len.max(1) {
        return String::new();
    }
    let re = RE.get_or_init(|| Regex::new(r"[^\w가-힣]+").expect("valid text key regex"));
    re.replace_all(&t.to_lowercase(), "").into_owned()
}

/// Higher is better for both metrics: l2 distances are negated.
pub fn compute_rank_score(score: f32, metric: Metric, section_weight: f32, category_weight: f32) -> f32 {
    let base = match metric {
        Metric::Cosine => score,
        Metric::L2 => -score,
    };
    base * section_weight * category_weight
}

/// First-stage candidate count.
pub fn resolve_search_k(
    top_k: usize,
    explicit: Option<usize>,
    filter_active: bool,
    manifest_len: usize,
) -> usize {
    let mut search_k = explicit
        .filter(|k| *k > 0)
        .unwrap_or_else(|| top_k.saturating_mul(8).max(top_k));
    if filter_active {
        search_k = search_k.max(top_k.saturating_mul(20));
    }
    search_k.min(manifest_len)
}

fn preview(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect::<String>().trim().to_string()
}

/// Run one retrieval. `query` drives intent weighting, `query_embedding`
/// drives the vector search.
pub fn retrieve(
    ctx: &RetrievalContext<'_>,
    query: &str,
    query_embedding: &[f32],
    criteria: &FilterCriteria,
    options: &RetrievalOptions,
) -> Result<Retrieval> {
    let metric = ctx.store.metric();

    let base_section_weights = if options.section_weighting {
        options.base_section_weights.clone()
    } else {
        neutral_weights(&Section::ALL)
    };
    let (dynamic_section_weights, section_intent_scores) =
        if options.section_weighting && options.dynamic_section_weighting {
            infer_dynamic_section_weights(query)
        } else {
            (neutral_weights(&Section::ALL), zero_scores(&Section::ALL))
        };
    let section_weights = effective_section_weights(&base_section_weights, &dynamic_section_weights);

    let (category_weights, category_intent_scores) = if options.dynamic_category_weighting {
        infer_dynamic_category_weights(query)
    } else {
        (neutral_weights(&Category::ALL), zero_scores(&Category::ALL))
    };

    let allowed = build_allowed_policy_ids(ctx.metadata, criteria);
    let search_k = resolve_search_k(
        options.top_k,
        options.search_k,
        allowed.is_some(),
        ctx.manifest.len(),
    );

    let candidates = if search_k == 0 {
        Vec::new()
    } else {
        ctx.store.search(query_embedding, search_k)?
    };

    let mut results: Vec<RetrievalHit> = Vec::new();
    let mut seen_chunk_ids: HashSet<&str> = HashSet::new();
    let mut seen_text_keys: HashSet<String> = HashSet::new();
    let mut dedup_skipped = 0usize;

    for (score, vidx) in candidates {
        let Some(row) = ctx.manifest.get(&vidx) else {
            continue;
        };
        if let Some(allowed) = &allowed {
            if !allowed.contains(&row.policy_id) {
                continue;
            }
        }
        if seen_chunk_ids.contains(row.chunk_id.as_str()) {
            dedup_skipped += 1;
            continue;
        }

        let text = ctx
            .chunks
            .get(&row.chunk_id)
            .map(|c| c.text.as_str())
            .unwrap_or_default();
        let key = if options.text_dedup {
            text_key(text, options.text_dedup_min_len)
        } else {
            String::new()
        };
        if !key.is_empty() && seen_text_keys.contains(&key) {
            dedup_skipped += 1;
            continue;
        }

        seen_chunk_ids.insert(row.chunk_id.as_str());
        if !key.is_empty() {
            seen_text_keys.insert(key);
        }

        let section_weight = section_weights.get(&row.section).copied().unwrap_or(1.0);
        let category_weight = category_weights.get(&row.category).copied().unwrap_or(1.0);
        results.push(RetrievalHit {
            score,
            rank_score: compute_rank_score(score, metric, section_weight, category_weight),
            section_weight,
            category_weight,
            vector_idx: vidx,
            policy_id: row.policy_id.clone(),
            chunk_id: row.chunk_id.clone(),
            section: row.section,
            title: row.title.clone(),
            category: row.category,
            text_preview: preview(text, options.preview_chars),
            text: text.to_string(),
        });
    }

    // Stable: equal rank scores keep vector order
    results.sort_by(|a, b| b.rank_score.total_cmp(&a.rank_score));
    results.truncate(options.top_k);

    let debug = RetrievalDebug {
        query_model: options.query_model.clone(),
        metric,
        search_k,
        base_section_weights,
        section_intent_scores,
        dynamic_section_weights,
        effective_section_weights: section_weights,
        category_intent_scores,
        dynamic_category_weights: category_weights,
        age: criteria.age,
        region_sido: criteria.region_sido.as_deref().unwrap_or_default().trim().to_string(),
        region_sigungu: criteria.region_sigungu.as_deref().unwrap_or_default().trim().to_string(),
        monthly_income_m: criteria.monthly_income_m,
        allowed_policy_ids_count: allowed.as_ref().map(HashSet::len),
        dedup_skipped,
        result_count: results.len(),
    };

    tracing::debug!(
        "Retrieved {} hits (search_k={search_k}, dedup_skipped={dedup_skipped})",
        results.len()
    );

    Ok(Retrieval { results, debug })
}

/// Top hits with their policy source urls.
pub fn summarize(
    retrieval: &Retrieval,
    metadata: &BTreeMap<String, PolicyMeta>,
) -> RetrievalSummary {
    RetrievalSummary {
        result_count: retrieval.debug.result_count,
        dedup_skipped: retrieval.debug.dedup_skipped,
        top_items: retrieval
            .results
            .iter()
            .take(SUMMARY_ITEMS)
            .map(|hit| SummaryItem {
                policy_id: hit.policy_id.clone(),
                chunk_id: hit.chunk_id.clone(),
                section: hit.section,
                score: hit.score,
                rank_score: hit.rank_score,
                source_url: metadata
                    .get(&hit.policy_id)
                    .and_then(|m| m.source_url.clone()),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EligibilityStruct, Regions};

    struct Fixture {
        store: VectorStore,
        manifest: BTreeMap<usize, ManifestRow>,
        chunks: HashMap<String, Chunk>,
        metadata: BTreeMap<String, PolicyMeta>,
    }

    impl Fixture {
        fn ctx(&self) -> RetrievalContext<'_> {
            RetrievalContext {
                store: &self.store,
                manifest: &self.manifest,
                chunks: &self.chunks,
                metadata: &self.metadata,
            }
        }
    }

    fn chunk(policy_id: &str, n: usize, category: Category, section: Section, text: &str) -> Chunk {
        Chunk {
            chunk_id: format!("{policy_id}#{n:03}"),
            policy_id: policy_id.to_string(),
            category,
            title: format!("{policy_id} 정책"),
            section,
            text: text.to_string(),
        }
    }

    /// Vectors are unit vectors at decreasing angles from the query [1, 0].
    fn fixture(chunks: Vec<Chunk>, metric: Metric) -> Fixture {
        let vectors: Vec<Vec<f32>> = (0..chunks.len())
            .map(|i| {
                let angle = 0.1 * i as f32;
                vec![angle.cos(), angle.sin()]
            })
            .collect();
        let store = VectorStore::build(vectors, metric).unwrap();
        let manifest = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, ManifestRow::from_chunk(c, i)))
            .collect();
        let mut metadata = BTreeMap::new();
        for c in &chunks {
            metadata.entry(c.policy_id.clone()).or_insert_with(|| PolicyMeta {
                eligibility_struct: None,
                source_url: Some(format!("https://example.org/{}", c.policy_id)),
            });
        }
        let chunks = chunks.into_iter().map(|c| (c.chunk_id.clone(), c)).collect();
        Fixture {
            store,
            manifest,
            chunks,
            metadata,
        }
    }

    fn options() -> RetrievalOptions {
        RetrievalOptions::from_config(&RetrievalConfig::default(), "test-model").unwrap()
    }

    #[test]
    fn test_text_key() {
        assert_eq!(text_key("short", 80), "");
        assert_eq!(text_key("  Hello, World! 청년-주거  ", 5), "helloworld청년주거");
        assert_eq!(text_key("abc", 0), "abc");
    }

    #[test]
    fn test_compute_rank_score() {
        assert!((compute_rank_score(0.5, Metric::Cosine, 1.1, 1.2) - 0.66).abs() < 1e-6);
        assert!((compute_rank_score(2.0, Metric::L2, 1.0, 0.5) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_resolve_search_k() {
        assert_eq!(resolve_search_k(5, None, false, 1000), 40);
        assert_eq!(resolve_search_k(5, Some(0), false, 1000), 40);
        assert_eq!(resolve_search_k(5, None, true, 1000), 100);
        assert_eq!(resolve_search_k(5, Some(200), true, 1000), 200);
        assert_eq!(resolve_search_k(5, Some(12), false, 1000), 12);
        assert_eq!(resolve_search_k(5, None, true, 30), 30);
        assert_eq!(resolve_search_k(0, None, false, 30), 0);
    }

    #[test]
    fn test_resolve_search_k_huge_top_k_caps_at_manifest() {
        assert_eq!(resolve_search_k(usize::MAX, None, false, 30), 30);
        assert_eq!(resolve_search_k(usize::MAX / 4, None, true, 30), 30);
    }

    #[test]
    fn test_unweighted_order_follows_similarity() {
        let f = fixture(
            vec![
                chunk("A", 0, Category::Finance, Section::Meta, "A meta"),
                chunk("B", 0, Category::Finance, Section::Benefit, "B benefit"),
                chunk("C", 0, Category::Finance, Section::Process, "C process"),
            ],
            Metric::Cosine,
        );
        let mut opts = options();
        opts.section_weighting = false;
        opts.dynamic_category_weighting = false;
        let r = retrieve(&f.ctx(), "", &[1.0, 0.0], &FilterCriteria::default(), &opts).unwrap();
        let ids: Vec<&str> = r.results.iter().map(|h| h.policy_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert!(r.results.iter().all(|h| h.section_weight == 1.0 && h.category_weight == 1.0));
        assert_eq!(r.debug.allowed_policy_ids_count, None);
        assert_eq!(r.debug.search_k, 3);
    }

    #[test]
    fn test_section_intent_reorders() {
        // META is closest to the query but an eligibility question boosts
        // the ELIGIBILITY chunk above it
        let f = fixture(
            vec![
                chunk("A", 0, Category::HousingSupply, Section::Meta, "제목: 행복주택"),
                chunk("A", 1, Category::HousingSupply, Section::Eligibility, "만 19세~39세 무주택"),
            ],
            Metric::Cosine,
        );
        let r = retrieve(
            &f.ctx(),
            "행복주택 신청 자격 조건이 뭐야",
            &[1.0, 0.0],
            &FilterCriteria::default(),
            &options(),
        )
        .unwrap();
        assert_eq!(r.results[0].section, Section::Eligibility);
        assert_eq!(r.results[1].section, Section::Meta);
        assert!(r.results[0].rank_score > r.results[1].rank_score);
        assert!(r.results[0].score < r.results[1].score);
        assert_eq!(r.debug.section_intent_scores[&Section::Eligibility], 2);
    }

    #[test]
    fn test_category_intent_reorders() {
        let f = fixture(
            vec![
                chunk("DORM", 0, Category::Dormitory, Section::Benefit, "생활관 입사 안내"),
                chunk("FIN", 0, Category::Finance, Section::Benefit, "전세자금 대출 한도 안내"),
            ],
            Metric::Cosine,
        );
        let r = retrieve(
            &f.ctx(),
            "전세자금 대출 금리",
            &[1.0, 0.0],
            &FilterCriteria::default(),
            &options(),
        )
        .unwrap();
        assert_eq!(r.results[0].policy_id, "FIN");
        assert_eq!(r.results[0].category_weight, 1.14);
        assert_eq!(r.results[1].category_weight, 0.93);
    }

    #[test]
    fn test_unknown_category_weight_is_neutral() {
        let f = fixture(
            vec![chunk("X", 0, Category::Unknown, Section::Benefit, "기타 안내")],
            Metric::Cosine,
        );
        let r = retrieve(&f.ctx(), "대출 금리", &[1.0, 0.0], &FilterCriteria::default(), &options())
            .unwrap();
        assert_eq!(r.results[0].category_weight, 1.0);
    }

    #[test]
    fn test_filter_excludes_ineligible_policies() {
        let mut f = fixture(
            vec![
                chunk("OLD", 0, Category::Finance, Section::Benefit, "대출 안내"),
                chunk("YOUNG", 0, Category::Finance, Section::Benefit, "대출 안내 두번째"),
            ],
            Metric::Cosine,
        );
        f.metadata.get_mut("YOUNG").unwrap().eligibility_struct = Some(EligibilityStruct {
            age_min: Some(19),
            age_max: Some(34),
            regions: Regions {
                sido: vec!["서울".into()],
                sigungu: vec![],
            },
            ..Default::default()
        });
        let crit = FilterCriteria {
            age: Some(40),
            ..Default::default()
        };
        let r = retrieve(&f.ctx(), "대출", &[1.0, 0.0], &crit, &options()).unwrap();
        assert_eq!(r.results.len(), 1);
        assert_eq!(r.results[0].policy_id, "OLD");
        assert_eq!(r.debug.allowed_policy_ids_count, Some(1));
        assert_eq!(r.debug.age, Some(40));
    }

    #[test]
    fn test_text_dedup() {
        let long = "청년 전세자금 대출은 무주택 세대주인 만 19세 이상 34세 이하 청년을 대상으로 보증금의 80% 이내에서 최대 1억원까지 지원합니다.";
        let f = fixture(
            vec![
                chunk("A", 0, Category::Finance, Section::Benefit, long),
                chunk("B", 0, Category::Finance, Section::Benefit, &format!("  {}  ", long.replace(',', ""))),
                chunk("C", 0, Category::Finance, Section::Benefit, "짧은 문장"),
                chunk("D", 0, Category::Finance, Section::Benefit, "짧은 문장"),
            ],
            Metric::Cosine,
        );
        let mut opts = options();
        opts.text_dedup_min_len = 20;
        let r = retrieve(&f.ctx(), "", &[1.0, 0.0], &FilterCriteria::default(), &opts).unwrap();
        let ids: Vec<&str> = r.results.iter().map(|h| h.policy_id.as_str()).collect();
        // short texts are never treated as duplicates
        assert_eq!(ids, vec!["A", "C", "D"]);
        assert_eq!(r.debug.dedup_skipped, 1);

        opts.text_dedup = false;
        let r = retrieve(&f.ctx(), "", &[1.0, 0.0], &FilterCriteria::default(), &opts).unwrap();
        assert_eq!(r.results.len(), 4);
        assert_eq!(r.debug.dedup_skipped, 0);
    }

    #[test]
    fn test_duplicate_chunk_ids_counted() {
        let c = chunk("A", 0, Category::Finance, Section::Benefit, "대출 안내");
        // both vector rows point at the same chunk id
        let f = fixture(vec![c.clone(), c], Metric::Cosine);
        let r = retrieve(&f.ctx(), "", &[1.0, 0.0], &FilterCriteria::default(), &options()).unwrap();
        assert_eq!(r.results.len(), 1);
        assert_eq!(r.debug.dedup_skipped, 1);
    }

    #[test]
    fn test_missing_manifest_rows_are_skipped() {
        let mut f = fixture(
            vec![
                chunk("A", 0, Category::Finance, Section::Benefit, "첫번째"),
                chunk("B", 0, Category::Finance, Section::Benefit, "두번째"),
            ],
            Metric::Cosine,
        );
        f.manifest.remove(&0);
        let r = retrieve(&f.ctx(), "", &[1.0, 0.0], &FilterCriteria::default(), &options()).unwrap();
        // search_k is capped at the manifest size, so only row 0 is fetched
        assert!(r.results.is_empty());
    }

    #[test]
    fn test_l2_rank_is_negated_distance() {
        let f = fixture(
            vec![
                chunk("A", 0, Category::Finance, Section::Process, "a"),
                chunk("B", 0, Category::Finance, Section::Process, "b"),
            ],
            Metric::L2,
        );
        let mut opts = options();
        opts.section_weighting = false;
        opts.dynamic_category_weighting = false;
        let r = retrieve(&f.ctx(), "", &[1.0, 0.0], &FilterCriteria::default(), &opts).unwrap();
        assert_eq!(r.results[0].policy_id, "A");
        assert!(r.results[0].score.abs() < 1e-6);
        assert!(r.results[1].rank_score < 0.0);
        assert_eq!(r.debug.metric, Metric::L2);
    }

    #[test]
    fn test_top_k_preview_and_summary() {
        let chunks: Vec<Chunk> = (0..8)
            .map(|i| chunk(&format!("P{i}"), 0, Category::HousingCost, Section::Benefit, &"월세 지원 ".repeat(10)))
            .collect();
        let f = fixture(chunks, Metric::Cosine);
        let mut opts = options();
        opts.top_k = 6;
        opts.preview_chars = 7;
        opts.text_dedup = false;
        let r = retrieve(&f.ctx(), "", &[1.0, 0.0], &FilterCriteria::default(), &opts).unwrap();
        assert_eq!(r.results.len(), 6);
        assert_eq!(r.results[0].text_preview, "월세 지원 월");

        let summary = summarize(&r, &f.metadata);
        assert_eq!(summary.result_count, 6);
        assert_eq!(summary.top_items.len(), 5);
        assert_eq!(summary.top_items[0].source_url.as_deref(), Some("https://example.org/P0"));
    }
}
