//! Policy-level eligibility filter applied before ranking.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::models::{EligibilityStruct, PolicyMeta};
use crate::profile::UserProfile;

/// User attributes a policy must accommodate. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterCriteria {
    pub age: Option<u32>,
    pub region_sido: Option<String>,
    pub region_sigungu: Option<String>,
    /// Monthly income in units of 10,000 won (만원)
    pub monthly_income_m: Option<u32>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.age.is_none()
            && non_blank(&self.region_sido).is_none()
            && non_blank(&self.region_sigungu).is_none()
            && self.monthly_income_m.is_none()
    }

    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            age: profile.age,
            region_sido: profile.region.city.clone(),
            region_sigungu: profile.region.gu.clone(),
            monthly_income_m: profile.monthly_income_m,
        }
    }

    /// Fields set on `self` win over the ones in `fallback`.
    pub fn or(self, fallback: FilterCriteria) -> Self {
        Self {
            age: self.age.or(fallback.age),
            region_sido: non_blank(&self.region_sido)
                .map(str::to_string)
                .or(fallback.region_sido),
            region_sigungu: non_blank(&self.region_sigungu)
                .map(str::to_string)
                .or(fallback.region_sigungu),
            monthly_income_m: self.monthly_income_m.or(fallback.monthly_income_m),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn region_normalize(value: &str) -> String {
    value.trim().replace(' ', "")
}

/// Whether the queried region is compatible with a policy's region list.
/// An empty query or an empty list always matches; otherwise any entry that
/// equals, contains or is contained in the query matches.
pub fn region_match(query_region: &str, policy_regions: &[String]) -> bool {
    let q = region_normalize(query_region);
    if q.is_empty() {
        return true;
    }
    let regions: Vec<String> = policy_regions
        .iter()
        .filter(|r| !r.trim().is_empty())
        .map(|r| region_normalize(r))
        .collect();
    if regions.is_empty() {
        return true;
    }
    regions
        .iter()
        .any(|r| *r == q || r.contains(q.as_str()) || q.contains(r.as_str()))
}

fn passes_struct(es: &EligibilityStruct, criteria: &FilterCriteria) -> bool {
    if let Some(age) = criteria.age {
        if es.age_min.is_some_and(|min| age < min) || es.age_max.is_some_and(|max| age > max) {
            return false;
        }
    }

    if let Some(sido) = non_blank(&criteria.region_sido) {
        if !region_match(sido, &es.regions.sido) {
            return false;
        }
    }
    if let Some(sigungu) = non_blank(&criteria.region_sigungu) {
        if !region_match(sigungu, &es.regions.sigungu) {
            return false;
        }
    }

    if let (Some(income_m), Some(ceiling)) = (criteria.monthly_income_m, es.income_monthly_max_won) {
        if u64::from(income_m) * 10_000 > ceiling {
            return false;
        }
    }

    true
}

/// A policy without an eligibility struct passes every criterion.
pub fn policy_passes(meta: &PolicyMeta, criteria: &FilterCriteria) -> bool {
    match &meta.eligibility_struct {
        Some(es) => passes_struct(es, criteria),
        None => true,
    }
}

/// Ids of the policies that pass, or `None` when no criterion is set.
pub fn build_allowed_policy_ids(
    metadata: &BTreeMap<String, PolicyMeta>,
    criteria: &FilterCriteria,
) -> Option<HashSet<String>> {
    if criteria.is_empty() {
        return None;
    }
    Some(
        metadata
            .iter()
            .filter(|(_, meta)| policy_passes(meta, criteria))
            .map(|(id, _)| id.clone())
            .collect(),
    )
}
