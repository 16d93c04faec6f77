//! Lexical intent detection. Keyword hits in the query nudge the weights of
//! the sections and categories the user appears to be asking about.

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::models::{Category, Section};

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Finance,
        &[
            "대출", "금리", "융자", "상환", "보증금", "전세자금", "보증료", "이자", "담보", "기금",
            "loan", "interest", "mortgage", "deposit",
        ],
    ),
    (
        Category::HousingSupply,
        &[
            "행복주택", "공공임대", "매입임대", "전세임대", "주택공급", "분양", "청약", "입주자모집",
            "입주", "public rental", "subscription", "move-in",
        ],
    ),
    (
        Category::HousingCost,
        &[
            "월세", "임대료", "주거비", "관리비", "주거급여", "보조금", "임차료", "주거비용",
            "monthly rent", "housing cost", "subsidy",
        ],
    ),
    (
        Category::Dormitory,
        &["기숙사", "생활관", "사생", "입사", "퇴사", "호실", "dormitory", "dorm"],
    ),
];

const SECTION_KEYWORDS: &[(Section, &[&str])] = &[
    (
        Section::Eligibility,
        &[
            "자격", "조건", "대상", "요건", "연령", "나이", "소득", "무주택", "가능", "해당",
            "eligib", "qualif", "requirement", "income",
        ],
    ),
    (
        Section::Benefit,
        &[
            "혜택", "지원금", "금액", "얼마", "한도", "금리", "지원내용", "얼마나", "보조",
            "benefit", "how much", "amount", "limit",
        ],
    ),
    (
        Section::Process,
        &[
            "신청", "절차", "방법", "기간", "접수", "서류", "문의", "어떻게", "언제",
            "apply", "application", "procedure", "document", "deadline",
        ],
    ),
    (
        Section::Meta,
        &["출처", "기관", "운영", "정책명", "어느 지역", "어디", "개요", "source", "agency", "overview"],
    ),
];

/// Weight shape for one dictionary: inactive entries get `inactive`, active
/// ones `active_base + 0.08 * score / max`, and when a single entry is active
/// with at least two hits the rest drop to `focused`.
struct WeightShape {
    inactive: f32,
    active_base: f64,
    focused: f32,
}

const SECTION_SHAPE: WeightShape = WeightShape {
    inactive: 0.97,
    active_base: 1.05,
    focused: 0.94,
};

const CATEGORY_SHAPE: WeightShape = WeightShape {
    inactive: 0.96,
    active_base: 1.06,
    focused: 0.93,
};

pub type Weights<K> = BTreeMap<K, f32>;
pub type IntentScores<K> = BTreeMap<K, u32>;

fn round_to(x: f64, places: i32) -> f32 {
    let scale = 10f64.powi(places);
    ((x * scale).round() / scale) as f32
}

fn keyword_hits(query: &str, keywords: &[&str]) -> u32 {
    let q = query.trim().to_lowercase();
    let q_nospace: String = q.chars().filter(|c| !c.is_whitespace()).collect();
    keywords
        .iter()
        .map(|kw| kw.to_lowercase())
        .filter(|k| q.contains(k.as_str()) || q_nospace.contains(k.as_str()))
        .count() as u32
}

fn infer_weights<K: Ord + Copy>(
    query: &str,
    all: &[K],
    dictionary: &[(K, &[&str])],
    shape: &WeightShape,
) -> (Weights<K>, IntentScores<K>) {
    let mut scores: IntentScores<K> = all.iter().map(|k| (*k, 0)).collect();
    for (key, keywords) in dictionary {
        scores.insert(*key, keyword_hits(query, keywords));
    }

    let max_score = scores.values().copied().max().unwrap_or(0);
    if max_score == 0 {
        return (all.iter().map(|k| (*k, 1.0)).collect(), scores);
    }

    let active: Vec<K> = scores
        .iter()
        .filter(|(_, s)| **s > 0)
        .map(|(k, _)| *k)
        .collect();

    let mut weights: Weights<K> = all
        .iter()
        .map(|k| {
            let score = scores.get(k).copied().unwrap_or(0);
            let w = if score == 0 {
                shape.inactive
            } else {
                let ratio = f64::from(score) / f64::from(max_score);
                round_to(shape.active_base + 0.08 * ratio, 3)
            };
            (*k, w)
        })
        .collect();

    if active.len() == 1 && max_score >= 2 {
        for (k, w) in weights.iter_mut() {
            if *k != active[0] && scores.get(k).copied().unwrap_or(0) == 0 {
                *w = shape.focused;
            }
        }
    }

    (weights, scores)
}

/// Section weights inferred from the query, with the per-section hit counts.
pub fn infer_dynamic_section_weights(query: &str) -> (Weights<Section>, IntentScores<Section>) {
    infer_weights(query, &Section::ALL, SECTION_KEYWORDS, &SECTION_SHAPE)
}

/// Category weights inferred from the query, with the per-category hit counts.
pub fn infer_dynamic_category_weights(query: &str) -> (Weights<Category>, IntentScores<Category>) {
    infer_weights(query, &Category::ALL, CATEGORY_KEYWORDS, &CATEGORY_SHAPE)
}

/// Every weight set to 1.0.
pub fn neutral_weights<K: Ord + Copy>(all: &[K]) -> Weights<K> {
    all.iter().map(|k| (*k, 1.0)).collect()
}

/// All scores zero.
pub fn zero_scores<K: Ord + Copy>(all: &[K]) -> IntentScores<K> {
    all.iter().map(|k| (*k, 0)).collect()
}

/// Parse `"META=0.92,ELIGIBILITY=1.10"`. Section names are case-insensitive;
/// sections left out keep weight 1.0 downstream.
pub fn parse_section_weights(raw: &str) -> Result<Weights<Section>> {
    let mut out = BTreeMap::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .with_context(|| format!("Malformed section weight '{part}', expected NAME=VALUE"))?;
        let value: f32 = value
            .trim()
            .parse()
            .with_context(|| format!("Invalid section weight value in '{part}'"))?;
        if !(value > 0.0) {
            anyhow::bail!("Section weight must be positive: '{part}'");
        }
        match Section::parse(key) {
            Some(section) => {
                out.insert(section, value);
            }
            None => tracing::warn!("Ignoring weight for unknown section '{}'", key.trim()),
        }
    }
    Ok(out)
}

/// `round4(base * dynamic)` for every section; missing entries count as 1.0.
pub fn effective_section_weights(
    base: &Weights<Section>,
    dynamic: &Weights<Section>,
) -> Weights<Section> {
    Section::ALL
        .iter()
        .map(|s| {
            let b = f64::from(base.get(s).copied().unwrap_or(1.0));
            let d = f64::from(dynamic.get(s).copied().unwrap_or(1.0));
            (*s, round_to(b * d, 4))
        })
        .collect()
}
