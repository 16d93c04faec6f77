use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::corpus::BuildReport;
use crate::profile::UserProfile;
use crate::search::retriever::{RetrievalDebug, RetrievalSummary};

/// Policy category as assigned by the upstream crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Finance,
    HousingSupply,
    HousingCost,
    Dormitory,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Category {
    /// Every category that takes part in intent weighting.
    pub const ALL: [Category; 4] = [
        Category::Finance,
        Category::HousingSupply,
        Category::HousingCost,
        Category::Dormitory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Finance => "finance",
            Category::HousingSupply => "housing_supply",
            Category::HousingCost => "housing_cost",
            Category::Dormitory => "dormitory",
            Category::Unknown => "unknown",
        }
    }
}

/// Section tag carried by every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Section {
    Meta,
    Eligibility,
    Benefit,
    Process,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Meta,
        Section::Eligibility,
        Section::Benefit,
        Section::Process,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Meta => "META",
            Section::Eligibility => "ELIGIBILITY",
            Section::Benefit => "BENEFIT",
            Section::Process => "PROCESS",
        }
    }

    /// Case-insensitive lookup used when parsing weight strings.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "META" => Some(Section::Meta),
            "ELIGIBILITY" => Some(Section::Eligibility),
            "BENEFIT" => Some(Section::Benefit),
            "PROCESS" => Some(Section::Process),
            _ => None,
        }
    }
}

/// Geographic reach of a policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionScope {
    Nationwide,
    Local,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regions {
    #[serde(default)]
    pub sido: Vec<String>,
    #[serde(default)]
    pub sigungu: Vec<String>,
}

/// Structured eligibility conditions extracted from a policy's free text.
/// Every field is optional: `None` means "not stated", never "no limit".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EligibilityStruct {
    #[serde(default, alias = "min_age")]
    pub age_min: Option<u32>,
    #[serde(default, alias = "max_age")]
    pub age_max: Option<u32>,
    #[serde(default)]
    pub income_monthly_max_won: Option<u64>,
    #[serde(default)]
    pub income_annual_max_won: Option<u64>,
    /// Ceiling as a percentage of the standard median income.
    #[serde(default)]
    pub income_median_ratio_max: Option<u32>,
    #[serde(default)]
    pub asset_total_max_won: Option<u64>,
    #[serde(default)]
    pub requires_no_house: Option<bool>,
    #[serde(default)]
    pub region_scope: RegionScope,
    #[serde(default)]
    pub regions: Regions,
}

/// A normalised housing policy record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub eligibility_text: Option<String>,
    #[serde(default)]
    pub benefit_text: Option<String>,
    #[serde(default)]
    pub process_text: Option<String>,
    /// Unstructured page text, used to recover lines the section fields missed.
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub eligibility_struct: Option<EligibilityStruct>,
}

/// A single retrievable chunk of policy text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub policy_id: String,
    pub category: Category,
    pub title: String,
    pub section: Section,
    pub text: String,
}

/// Maps a row of the vector matrix back to its chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRow {
    pub vector_idx: usize,
    pub chunk_id: String,
    pub policy_id: String,
    pub category: Category,
    pub title: String,
    pub section: Section,
}

impl ManifestRow {
    pub fn from_chunk(chunk: &Chunk, vector_idx: usize) -> Self {
        Self {
            vector_idx,
            chunk_id: chunk.chunk_id.clone(),
            policy_id: chunk.policy_id.clone(),
            category: chunk.category,
            title: chunk.title.clone(),
            section: chunk.section,
        }
    }
}

/// Policy-level metadata consulted by the eligibility filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyMeta {
    #[serde(default)]
    pub eligibility_struct: Option<EligibilityStruct>,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// A ranked retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    /// Raw similarity (cosine) or distance (l2) from the vector index
    pub score: f32,
    pub rank_score: f32,
    pub section_weight: f32,
    pub category_weight: f32,
    pub vector_idx: usize,
    pub policy_id: String,
    pub chunk_id: String,
    pub section: Section,
    pub title: String,
    pub category: Category,
    pub text_preview: String,
    pub text: String,
}

/// Search request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    /// Free-text query; derived from `profile` when empty
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    /// Explicit filters override the ones derived from the profile
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub region_sido: Option<String>,
    #[serde(default)]
    pub region_sigungu: Option<String>,
    #[serde(default)]
    pub monthly_income_m: Option<u32>,
    pub top_k: Option<usize>,
    pub search_k: Option<usize>,
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<RetrievalHit>,
    pub summary: RetrievalSummary,
    pub debug: RetrievalDebug,
}

/// Progress of the most recent index build
#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BuildStatus {
    #[default]
    Idle,
    Building {
        started_at: DateTime<Utc>,
        policies: usize,
    },
    Ready {
        finished_at: DateTime<Utc>,
        report: BuildReport,
    },
    Failed {
        finished_at: DateTime<Utc>,
        error: String,
    },
}
