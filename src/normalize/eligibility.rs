//! Regex heuristics that turn free-text eligibility conditions into an
//! [`EligibilityStruct`].

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{EligibilityStruct, Policy, RegionScope, Regions};

/// Province-level region names as they appear in policy text.
pub const SIDO: &[&str] = &[
    "서울", "부산", "대구", "인천", "광주", "대전", "울산", "세종", "경기", "강원", "충북", "충남",
    "전북", "전남", "경북", "경남", "제주",
];

/// Amount expression: "1.5억 원", "5천만원", "3700만원".
const AMOUNT: &str = r"([0-9\.]+\s*억\s*원?|[0-9\.]+\s*천\s*만원|[0-9\.]+\s*만원)";

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid eligibility regex"))
}

/// Strips thousands separators, normalises separators and whitespace.
fn clean_text(s: &str) -> String {
    static DIGIT_COMMA: OnceLock<Regex> = OnceLock::new();
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();

    let t = s.replace('\u{00a0}', " ");
    let t = regex(&DIGIT_COMMA, r"(\d),(\d)").replace_all(&t, "$1$2");
    let t = regex(&SEPARATORS, r"[,·]").replace_all(&t, " ");
    regex(&SPACES, r"\s+").replace_all(&t, " ").trim().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgeRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub evidence: Option<String>,
}

/// An explicit "19~34세" range wins; otherwise every lower and upper bound
/// found in the text is intersected. Contradictory bounds yield no range.
pub fn parse_age_range(text: &str) -> AgeRange {
    static RANGE: OnceLock<Regex> = OnceLock::new();
    static LOWER: OnceLock<Regex> = OnceLock::new();
    static UPPER: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();

    let t = text.replace(',', "");
    let t = regex(&SPACES, r"\s+").replace_all(&t, " ");
    let t = t.trim();
    if t.is_empty() {
        return AgeRange::default();
    }

    let range = regex(
        &RANGE,
        r"만?\s*(\d{1,2})\s*세?\s*[~\-∼〜～]\s*만?\s*(\d{1,2})\s*세",
    );
    if let Some(caps) = range.captures(t) {
        let a: u32 = caps[1].parse().unwrap_or(0);
        let b: u32 = caps[2].parse().unwrap_or(0);
        return AgeRange {
            min: Some(a.min(b)),
            max: Some(a.max(b)),
            evidence: Some(caps[0].to_string()),
        };
    }

    let mut min_age: Option<u32> = None;
    let mut max_age: Option<u32> = None;
    let mut evidence = Vec::new();

    for caps in regex(&LOWER, r"만?\s*(\d{1,2})\s*세\s*(이상|초과)").captures_iter(t) {
        let base: u32 = caps[1].parse().unwrap_or(0);
        // 초과 is exclusive
        let cand = if &caps[2] == "초과" { base + 1 } else { base };
        min_age = Some(min_age.map_or(cand, |m| m.max(cand)));
        evidence.push(caps[0].to_string());
    }

    for caps in regex(&UPPER, r"만?\s*(\d{1,2})\s*세\s*(이하|미만)").captures_iter(t) {
        let base: u32 = caps[1].parse().unwrap_or(0);
        // 미만 is exclusive
        let cand = if &caps[2] == "미만" { base.saturating_sub(1) } else { base };
        max_age = Some(max_age.map_or(cand, |m| m.min(cand)));
        evidence.push(caps[0].to_string());
    }

    if let (Some(lo), Some(hi)) = (min_age, max_age) {
        if lo > hi {
            return AgeRange {
                min: None,
                max: None,
                evidence: Some(format!("INFEASIBLE: {}", evidence.join(" / "))),
            };
        }
    }

    AgeRange {
        min: min_age,
        max: max_age,
        evidence: (!evidence.is_empty()).then(|| evidence.join(" / ")),
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a Korean money expression to won. Units are additive, so
/// "1억 5000만원" is 150,000,000.
pub fn money_to_won(expr: &str) -> Option<u64> {
    static UK: OnceLock<Regex> = OnceLock::new();
    static CHEONMAN: OnceLock<Regex> = OnceLock::new();
    static MANWON: OnceLock<Regex> = OnceLock::new();
    static MAN: OnceLock<Regex> = OnceLock::new();
    static WON: OnceLock<Regex> = OnceLock::new();

    let compact = clean_text(expr).replace(' ', "");
    if compact.is_empty() {
        return None;
    }

    let mut total: f64 = 0.0;
    let unit = |cell: &'static OnceLock<Regex>, pattern: &str, scale: f64| -> f64 {
        regex(cell, pattern)
            .captures(&compact)
            .and_then(|c| parse_number(&c[1]))
            .map_or(0.0, |v| v * scale)
    };

    total += unit(&UK, r"(\d+(?:\.\d+)?)억", 100_000_000.0);
    total += unit(&CHEONMAN, r"(\d+(?:\.\d+)?)천만원", 10_000_000.0);
    total += unit(&MANWON, r"(\d+(?:\.\d+)?)만원", 10_000.0);
    if !compact.contains("만원") {
        total += unit(&MAN, r"(\d+(?:\.\d+)?)만(?:원)?", 10_000.0);
    }
    if total == 0.0 {
        total = unit(&WON, r"(\d+(?:\.\d+)?)원", 1.0);
    }

    let won = total.round() as u64;
    (won > 0).then_some(won)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomeCeiling {
    pub monthly_max_won: Option<u64>,
    pub annual_max_won: Option<u64>,
    pub median_ratio_max: Option<u32>,
    pub evidence: Vec<String>,
}

/// An unqualified "소득 N만원" is read as annual and flagged AMBIGUOUS.
pub fn parse_income(text: &str) -> IncomeCeiling {
    static MEDIAN: OnceLock<Regex> = OnceLock::new();
    static ANNUAL: OnceLock<Regex> = OnceLock::new();
    static MONTHLY: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();

    let t = clean_text(text);
    let mut out = IncomeCeiling::default();

    if let Some(caps) = regex(&MEDIAN, r"기준\s*중위\s*소득\s*(\d+)\s*%").captures(&t) {
        out.median_ratio_max = caps[1].parse().ok();
        out.evidence.push(caps[0].to_string());
    }

    let annual = regex(&ANNUAL, &format!(r"(연\s*소득|연소득)\s*{AMOUNT}"));
    if let Some(caps) = annual.captures(&t) {
        if let Some(val) = money_to_won(&caps[2]) {
            out.annual_max_won = Some(val);
            out.evidence.push(caps[0].to_string());
        }
    }

    let monthly = regex(
        &MONTHLY,
        r"(월\s*소득|월소득|월\s*평균\s*소득|월평균소득)\s*([0-9\.]+\s*만원)",
    );
    if let Some(caps) = monthly.captures(&t) {
        if let Some(val) = money_to_won(&caps[2]) {
            out.monthly_max_won = Some(val);
            out.evidence.push(caps[0].to_string());
        }
    }

    if out.annual_max_won.is_none() {
        let bare = regex(&BARE, &format!(r"소득\s*{AMOUNT}"));
        if let Some(caps) = bare.captures(&t) {
            let qualified = caps
                .get(0)
                .map(|m| {
                    let before = t[..m.start()].trim_end();
                    before.ends_with('월') || before.ends_with("평균")
                })
                .unwrap_or(false);
            if !qualified {
                if let Some(val) = money_to_won(&caps[1]) {
                    out.annual_max_won = Some(val);
                    out.evidence.push(format!("AMBIGUOUS:{}", &caps[0]));
                }
            }
        }
    }

    out
}

pub fn parse_asset(text: &str) -> Option<u64> {
    static ASSET: OnceLock<Regex> = OnceLock::new();

    let t = clean_text(text);
    regex(&ASSET, &format!(r"(총\s*자산|자산)\s*{AMOUNT}"))
        .captures(&t)
        .and_then(|caps| money_to_won(&caps[2]))
}

/// `Some(false)` when home owners are explicitly allowed, `Some(true)` when
/// the text requires a homeless household, `None` when silent.
pub fn parse_requires_no_house(text: &str) -> Option<bool> {
    let t = clean_text(text).replace(' ', "");
    if t.is_empty() {
        return None;
    }

    const ALLOWS_OWNERS: &[&str] = &["유주택", "주택보유", "무주택요건없", "무주택제한없", "무주택아님"];
    if ALLOWS_OWNERS.iter().any(|k| t.contains(k)) {
        return Some(false);
    }
    if t.contains("무주택") {
        return Some(true);
    }
    None
}

/// Region scope and province list. Nationwide wins outright; otherwise
/// provinces named in the region field, falling back to suffixed mentions
/// ("서울특별시", "경기도") anywhere in the text.
pub fn parse_region(region_field: &str, text: &str) -> (RegionScope, Regions) {
    static NATIONWIDE: OnceLock<Regex> = OnceLock::new();

    let rf = clean_text(region_field);
    let t = clean_text(text);
    let merged = [rf.as_str(), t.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n");

    if regex(&NATIONWIDE, r"(전국|전\s*국|전국단위|전국민)").is_match(&merged) {
        return (RegionScope::Nationwide, Regions::default());
    }

    let mut sido: Vec<String> = Vec::new();
    if !rf.is_empty() {
        for s in SIDO {
            if rf.contains(s) {
                sido.push(s.to_string());
            }
        }
    }

    if sido.is_empty() {
        for s in SIDO {
            let suffixed = [
                "특별시",
                "광역시",
                "특별자치시",
                "특별자치도",
                "도",
                "시",
            ]
            .iter()
            .any(|suffix| merged.contains(&format!("{s}{suffix}")));
            if suffixed {
                sido.push(s.to_string());
            }
        }
    }

    let mut uniq: Vec<String> = Vec::new();
    for s in sido {
        if !uniq.contains(&s) {
            uniq.push(s);
        }
    }

    let scope = if uniq.is_empty() {
        RegionScope::Unknown
    } else {
        RegionScope::Local
    };
    (
        scope,
        Regions {
            sido: uniq,
            sigungu: Vec::new(),
        },
    )
}

/// Recompute the eligibility struct from the policy's section texts.
/// District (sigungu) lists already present on the policy are kept since
/// the text heuristics never produce them.
pub fn build_eligibility_struct(policy: &Policy) -> EligibilityStruct {
    let region_field = policy.region.as_deref().unwrap_or_default();
    let all_text = [
        policy.eligibility_text.as_deref(),
        policy.benefit_text.as_deref(),
        policy.process_text.as_deref(),
        policy.region.as_deref(),
        policy.provider.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.trim().is_empty())
    .collect::<Vec<_>>()
    .join("\n");

    let age = parse_age_range(&all_text);
    let income = parse_income(&all_text);
    let (region_scope, mut regions) = parse_region(region_field, &all_text);

    if let Some(previous) = &policy.eligibility_struct {
        if regions.sigungu.is_empty() && region_scope != RegionScope::Nationwide {
            regions.sigungu = previous.regions.sigungu.clone();
        }
    }

    EligibilityStruct {
        age_min: age.min,
        age_max: age.max,
        income_monthly_max_won: income.monthly_max_won,
        income_annual_max_won: income.annual_max_won,
        income_median_ratio_max: income.median_ratio_max,
        asset_total_max_won: parse_asset(&all_text),
        requires_no_house: parse_requires_no_house(&all_text),
        region_scope,
        regions,
    }
}
