//! Integration tests for the policy-search pipeline.
//!
//! These tests exercise normalise → chunk → index → retrieve end to end
//! without a running embedding provider: chunks and queries are embedded
//! with a deterministic keyword-count embedder.

use std::collections::HashSet;

use policy_search::chunking::build_policy_metadata_map;
use policy_search::config::{ChunkingConfig, Config, RetrievalConfig};
use policy_search::corpus::{prepare_policies, PolicyCorpus};
use policy_search::models::{Category, Policy, Section};
use policy_search::profile::{build_auto_query, ProfileRegion, UserProfile};
use policy_search::search::filter::FilterCriteria;
use policy_search::search::retriever::RetrievalOptions;
use policy_search::search::vector::Metric;

const VOCAB: &[&str] = &[
    "전세", "대출", "금리", "보증금", "행복주택", "임대료", "월세", "기숙사", "생활관", "신청",
    "자격", "서울", "부산", "청년", "보조", "지급",
];

const SHARED_BENEFIT: &str = "청년 가구의 주거비 부담을 덜기 위해 월 임대료의 일부를 최대 24개월 동안 보조하며, 보조 금액은 임차 보증금 규모에 따라 월 10만원에서 20만원 사이로 차등 지급됩니다.";

/// Keyword counts plus a small bias so no vector is all zeros.
fn embed(text: &str) -> Vec<f32> {
    let mut v: Vec<f32> = VOCAB.iter().map(|kw| text.matches(kw).count() as f32).collect();
    v.push(0.05);
    v
}

fn policy(
    id: &str,
    category: Category,
    title: &str,
    region: &str,
    eligibility: &str,
    benefit: &str,
    process: &str,
) -> Policy {
    Policy {
        policy_id: id.to_string(),
        category,
        title: title.to_string(),
        region: Some(region.to_string()),
        provider: Some("테스트기관".to_string()),
        source_url: Some(format!("https://example.org/{id}")),
        eligibility_text: Some(eligibility.to_string()),
        benefit_text: Some(benefit.to_string()),
        process_text: Some(process.to_string()),
        ..Default::default()
    }
}

fn sample_policies() -> Vec<Policy> {
    vec![
        policy(
            "FIN_001",
            Category::Finance,
            "청년 전세자금 대출",
            "전국",
            "만 19세 이상 34세 이하 무주택 세대주인 청년",
            "전세자금 대출 최대 2억원, 연 1.5% 금리로 지원합니다. 보증금의 80% 이내에서 대출 가능",
            "기금 홈페이지에서 온라인 신청 후 취급 은행을 방문하여 서류를 제출합니다",
        ),
        policy(
            "SUP_001",
            Category::HousingSupply,
            "서울 청년 행복주택",
            "서울",
            "만 19세~39세 무주택 청년으로서 서울특별시에 거주하거나 직장이 있는 자",
            "시세 대비 60~80% 수준의 임대료로 최장 6년간 행복주택에 거주할 수 있습니다",
            "입주자 모집 공고 기간 중 청약센터에서 온라인으로 신청합니다",
        ),
        policy(
            "COST_001",
            Category::HousingCost,
            "부산 청년 월세 지원",
            "부산",
            "만 19세~34세 부산광역시에 거주하는 무주택 청년 1인 가구",
            "월세 월 최대 20만원을 12개월 동안 지급하여 청년의 주거비 부담을 덜어 드립니다",
            "거주지 주민센터 방문 또는 복지로 홈페이지에서 신청 접수",
        ),
        policy(
            "DORM_001",
            Category::Dormitory,
            "대학생 연합기숙사",
            "서울",
            "수도권 외 지역 출신으로 서울 소재 대학에 재학 중인 대학생 및 대학원생",
            "2인 1실 생활관을 월 기숙사비 24만원 수준으로 제공하며 식당과 열람실을 이용할 수 있습니다",
            "학기별 입사 신청 기간에 재단 홈페이지에서 온라인 신청",
        ),
        policy(
            "DUP_A",
            Category::HousingCost,
            "대구 청년 주거비 보조",
            "대구",
            "대구광역시에 주민등록을 둔 무주택 청년 세대주",
            SHARED_BENEFIT,
            "구청 누리집에서 신청서를 내려받아 방문 접수합니다",
        ),
        policy(
            "DUP_B",
            Category::HousingCost,
            "광주 청년 주거비 보조",
            "광주",
            "광주광역시에 주민등록을 둔 무주택 청년 세대주",
            SHARED_BENEFIT,
            "시청 누리집에서 온라인으로 신청합니다",
        ),
    ]
}

fn build_corpus(policies: &[Policy]) -> PolicyCorpus {
    let prepared = prepare_policies(policies, &ChunkingConfig::default());
    let embeddings = prepared.chunks.iter().map(|c| embed(&c.text)).collect();
    let metadata = build_policy_metadata_map(&prepared.policies);
    PolicyCorpus::from_parts(
        prepared.chunks,
        metadata,
        embeddings,
        Metric::Cosine,
        "keyword-test",
    )
    .unwrap()
}

fn options() -> RetrievalOptions {
    RetrievalOptions::from_config(&RetrievalConfig::default(), "keyword-test").unwrap()
}

#[test]
fn test_end_to_end_build_and_search() {
    let corpus = build_corpus(&sample_policies());
    assert_eq!(corpus.policy_count(), 6);
    assert!(corpus.chunk_count() >= 6 * 2);

    let query = "전세자금 대출 금리";
    let r = corpus
        .retrieve(query, &embed(query), &FilterCriteria::default(), &options())
        .unwrap();

    assert_eq!(r.results.len(), 5);
    assert_eq!(r.results[0].policy_id, "FIN_001");
    assert_eq!(r.results[0].category_weight, 1.14);
    assert_eq!(r.debug.allowed_policy_ids_count, None);

    // rank_score is non-increasing
    for pair in r.results.windows(2) {
        assert!(pair[0].rank_score >= pair[1].rank_score);
    }

    let summary = corpus.summarize(&r);
    assert_eq!(summary.top_items.len(), 5);
    assert_eq!(
        summary.top_items[0].source_url.as_deref(),
        Some("https://example.org/FIN_001")
    );
}

#[test]
fn test_every_policy_has_meta_chunk() {
    let prepared = prepare_policies(&sample_policies(), &ChunkingConfig::default());
    for p in &prepared.policies {
        let first = prepared
            .chunks
            .iter()
            .find(|c| c.policy_id == p.policy_id)
            .unwrap();
        assert_eq!(first.section, Section::Meta);
        assert_eq!(first.chunk_id, format!("{}#000", p.policy_id));
    }
}

#[test]
fn test_extracted_eligibility_drives_filter() {
    let corpus = build_corpus(&sample_policies());
    let criteria = FilterCriteria {
        age: Some(37),
        region_sido: Some("서울".to_string()),
        ..Default::default()
    };
    let query = "청년 주거 지원";
    let r = corpus
        .retrieve(query, &embed(query), &criteria, &options())
        .unwrap();

    // FIN_001 and COST_001 cap age at 34; COST/DUP policies are outside Seoul
    assert_eq!(r.debug.allowed_policy_ids_count, Some(2));
    let allowed: HashSet<&str> = ["SUP_001", "DORM_001"].into_iter().collect();
    assert!(!r.results.is_empty());
    assert!(r.results.iter().all(|h| allowed.contains(h.policy_id.as_str())));
    assert_eq!(r.debug.age, Some(37));
    assert_eq!(r.debug.region_sido, "서울");
}

#[test]
fn test_profile_query_and_filters() {
    let corpus = build_corpus(&sample_policies());
    let profile = UserProfile {
        age: Some(25),
        region: ProfileRegion {
            city: Some("부산".to_string()),
            gu: None,
        },
        rent_type: Some("월세".to_string()),
        ..Default::default()
    };
    let query = build_auto_query(&profile);
    assert_eq!(query, "25세 부산 거주 희망 월세 중심 조건에 맞는 청년 주거 지원 정책 추천");

    let criteria = FilterCriteria::from_profile(&profile);
    let r = corpus
        .retrieve(&query, &embed(&query), &criteria, &options())
        .unwrap();

    // nationwide FIN_001 and Busan COST_001 remain
    assert_eq!(r.debug.allowed_policy_ids_count, Some(2));
    assert_eq!(r.results[0].policy_id, "COST_001");
    assert!(r
        .results
        .iter()
        .all(|h| h.policy_id == "COST_001" || h.policy_id == "FIN_001"));
}

#[test]
fn test_identical_text_across_policies_is_deduped() {
    let corpus = build_corpus(&sample_policies());
    let r = corpus
        .retrieve(
            "임대료 보조 금액",
            &embed(SHARED_BENEFIT),
            &FilterCriteria::default(),
            &options(),
        )
        .unwrap();

    let shared: Vec<_> = r
        .results
        .iter()
        .filter(|h| h.text == SHARED_BENEFIT)
        .collect();
    assert_eq!(shared.len(), 1);
    assert!(r.debug.dedup_skipped >= 1);

    let mut no_dedup = options();
    no_dedup.text_dedup = false;
    let r = corpus
        .retrieve(
            "임대료 보조 금액",
            &embed(SHARED_BENEFIT),
            &FilterCriteria::default(),
            &no_dedup,
        )
        .unwrap();
    assert_eq!(
        r.results.iter().filter(|h| h.text == SHARED_BENEFIT).count(),
        2
    );
}

#[test]
fn test_persisted_corpus_gives_same_results() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = build_corpus(&sample_policies());
    corpus.save(dir.path()).unwrap();

    let loaded = PolicyCorpus::load(dir.path()).unwrap();
    assert_eq!(loaded.chunk_count(), corpus.chunk_count());
    assert_eq!(loaded.info().metric, Metric::Cosine);
    assert!(loaded.info().normalized);

    let query = "행복주택 신청 자격";
    let before = corpus
        .retrieve(query, &embed(query), &FilterCriteria::default(), &options())
        .unwrap();
    let after = loaded
        .retrieve(query, &embed(query), &FilterCriteria::default(), &options())
        .unwrap();
    let ids = |r: &policy_search::search::retriever::Retrieval| {
        r.results.iter().map(|h| h.chunk_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn test_build_surfaces_provider_errors() {
    let mut config = Config::default();
    config.llm.provider = "not-a-provider".to_string();
    let client = reqwest::Client::new();
    let err = PolicyCorpus::build(&sample_policies(), &config, &client)
        .await
        .err()
        .unwrap();
    assert!(format!("{err:#}").contains("Unknown LLM provider"));
}
