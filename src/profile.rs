//! User profile submitted alongside (or instead of) a free-text query.

use serde::{Deserialize, Serialize};

/// Query used when the profile carries no usable fields.
pub const DEFAULT_QUERY: &str = "청년 주거 지원 정책 추천";

/// Rent type meaning "no preference"; left out of generated queries.
const RENT_TYPE_ANY: &str = "상관없음";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRegion {
    /// Province-level region (시/도)
    #[serde(default)]
    pub city: Option<String>,
    /// District (시/군/구)
    #[serde(default)]
    pub gu: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub household_type: Option<String>,
    #[serde(default)]
    pub region: ProfileRegion,
    /// Monthly income in 만원
    #[serde(default)]
    pub monthly_income_m: Option<u32>,
    /// Monthly housing budget in 만원
    #[serde(default)]
    pub monthly_housing_budget_m: Option<u32>,
    #[serde(default)]
    pub rent_type: Option<String>,
    #[serde(default)]
    pub move_timeline: Option<String>,
}

fn field(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Compose a retrieval query from the profile fields.
pub fn build_auto_query(profile: &UserProfile) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(age) = profile.age.filter(|a| *a > 0) {
        parts.push(format!("{age}세"));
    }

    match (field(&profile.region.city), field(&profile.region.gu)) {
        (Some(city), Some(gu)) => parts.push(format!("{city} {gu} 거주 희망")),
        (Some(city), None) => parts.push(format!("{city} 거주 희망")),
        _ => {}
    }

    if let Some(household) = field(&profile.household_type) {
        parts.push(household.to_string());
    }
    if let Some(rent) = field(&profile.rent_type).filter(|r| *r != RENT_TYPE_ANY) {
        parts.push(format!("{rent} 중심"));
    }
    if let Some(timeline) = field(&profile.move_timeline) {
        parts.push(format!("입주 시점 {timeline}"));
    }
    if let Some(income) = profile.monthly_income_m {
        parts.push(format!("월소득 {income}만원"));
    }
    if let Some(budget) = profile.monthly_housing_budget_m {
        parts.push(format!("월 주거예산 {budget}만원"));
    }

    if parts.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        format!("{} 조건에 맞는 {DEFAULT_QUERY}", parts.join(" "))
    }
}
