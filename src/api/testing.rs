//! Handler test fixtures: an in-process Ollama-compatible embedder and an
//! `AppState` rooted in a temp directory.

use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::models::{BuildStatus, Category, Policy};
use crate::state::AppState;

const VOCAB: &[&str] = &[
    "전세", "대출", "행복주택", "임대료", "월세", "기숙사", "서울", "부산", "청년", "신청",
];

#[derive(Deserialize)]
struct EmbedRequest {
    input: Vec<String>,
}

fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v: Vec<f32> = VOCAB.iter().map(|kw| text.matches(kw).count() as f32).collect();
    v.push(0.05);
    v
}

async fn embed(Json(req): Json<EmbedRequest>) -> Json<serde_json::Value> {
    let embeddings: Vec<Vec<f32>> = req.input.iter().map(|t| keyword_vector(t)).collect();
    Json(serde_json::json!({ "embeddings": embeddings }))
}

/// Serve `/api/embed` on a loopback port; returns the base URL.
pub(crate) async fn spawn_embedder() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/api/embed", post(embed));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub(crate) fn test_config(data_dir: &Path, base_url: &str) -> Config {
    let mut config = Config::default();
    config.data_dir = data_dir.to_path_buf();
    config.llm.provider = "ollama".to_string();
    config.llm.base_url = base_url.to_string();
    config.llm.embedding_model = "keyword-test".to_string();
    config.llm.embedding_dim = VOCAB.len() + 1;
    config.llm.max_retries = 1;
    config
}

pub(crate) fn test_state(config: Config) -> AppState {
    let mut state = AppState::new(config).unwrap();
    state.http_client = reqwest::Client::builder().no_proxy().build().unwrap();
    state
}

pub(crate) fn sample_policies() -> Vec<Policy> {
    let policy = |id: &str, category, title: &str, region: &str, eligibility: &str, benefit: &str| {
        Policy {
            policy_id: id.to_string(),
            category,
            title: title.to_string(),
            region: Some(region.to_string()),
            source_url: Some(format!("https://example.org/{id}")),
            eligibility_text: Some(eligibility.to_string()),
            benefit_text: Some(benefit.to_string()),
            process_text: Some("누리집에서 온라인으로 신청합니다".to_string()),
            ..Default::default()
        }
    };
    vec![
        policy(
            "FIN_001",
            Category::Finance,
            "청년 전세자금 대출",
            "전국",
            "만 19세 이상 34세 이하 무주택 세대주인 청년",
            "전세자금 대출 최대 2억원을 연 1.5% 금리로 지원합니다",
        ),
        policy(
            "SUP_001",
            Category::HousingSupply,
            "서울 청년 행복주택",
            "서울",
            "만 19세~39세 무주택 청년으로서 서울특별시에 거주하는 자",
            "시세 대비 60~80% 수준의 임대료로 행복주택에 거주할 수 있습니다",
        ),
        policy(
            "COST_001",
            Category::HousingCost,
            "부산 청년 월세 지원",
            "부산",
            "만 19세~34세 부산광역시에 거주하는 무주택 청년",
            "월세 월 최대 20만원을 12개월 동안 지급합니다",
        ),
    ]
}

/// Poll until the background build leaves the `building` state.
pub(crate) async fn wait_for_build(state: &AppState) -> BuildStatus {
    for _ in 0..400 {
        let status = state.build_status.read().clone();
        if !matches!(status, BuildStatus::Building { .. }) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("index build did not finish");
}
