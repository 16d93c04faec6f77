//! Keyword/regex scoring that decides which section a line of policy text
//! belongs to.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::Section;

const APPLY_KW: &[&str] = &[
    "신청", "접수", "절차", "방법", "제출서류", "모집", "기간", "기한", "방문", "온라인",
    "문의", "연락처", "상담", "콜센터", "전화", "홈페이지", "이의신청",
];

const ELIGIBILITY_KW: &[&str] = &[
    "지원대상", "대상자", "신청자격", "자격", "요건", "무주택", "소득", "자산", "연령",
    "세대주", "기준중위소득", "우선순위", "1순위", "2순위", "3순위", "가능한 자", "청년",
];

const BENEFIT_KW: &[&str] = &[
    "지원내용", "혜택", "지원금", "한도", "금리", "보증금", "임대료", "월세", "지급",
    "감면", "수용인원", "기숙사비", "서비스 내용", "최대", "만원", "억원",
];

fn priority_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(1순위|2순위|3순위|4순위|5순위|우선|기준\s*중위소득|소득기준|무주택|세대주)")
            .expect("valid priority regex")
    })
}

/// Matches "19~34세", "만 19세 이상" and similar age conditions.
pub(crate) fn age_condition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"만?\s*\d{1,2}\s*세?\s*[~\-∼〜～]\s*만?\s*\d{1,2}\s*세|만?\s*\d{1,2}\s*세\s*(이상|이하|미만|초과)",
        )
        .expect("valid age condition regex")
    })
}

fn money_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(만원|억원|금리|한도|보증금|임대료|월세|지원금|지급|감면)")
            .expect("valid money regex")
    })
}

fn apply_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(신청|접수|제출|문의|연락처|콜센터|홈페이지|방문|온라인|이의신청)")
            .expect("valid apply regex")
    })
}

pub(crate) fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{2,4}-\d{3,4}(?:-\d{4})?").expect("valid phone regex"))
}

/// Per-bucket evidence for a single line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineScores {
    pub apply: u32,
    pub eligibility: u32,
    pub benefit: u32,
}

fn keyword_hits(text: &str, keywords: &[&str]) -> u32 {
    keywords.iter().filter(|k| text.contains(*k)).count() as u32
}

pub fn line_scores(text: &str) -> LineScores {
    let mut scores = LineScores {
        apply: keyword_hits(text, APPLY_KW),
        eligibility: keyword_hits(text, ELIGIBILITY_KW),
        benefit: keyword_hits(text, BENEFIT_KW),
    };

    if priority_regex().is_match(text) {
        scores.eligibility += 2;
    }
    if age_condition_regex().is_match(text) {
        scores.eligibility += 2;
    }
    if money_regex().is_match(text) {
        scores.benefit += 2;
    }
    if apply_regex().is_match(text) {
        scores.apply += 2;
    }
    if phone_regex().is_match(text) {
        scores.apply += 2;
    }

    scores
}

/// Classify a section heading. Requires a strict winner.
pub fn bucket_from_title(title: &str) -> Option<Section> {
    let t = title.trim();
    if t.is_empty() {
        return None;
    }
    let s = line_scores(t);

    if s.apply > s.eligibility.max(s.benefit) {
        Some(Section::Process)
    } else if s.eligibility > s.apply.max(s.benefit) {
        Some(Section::Eligibility)
    } else if s.benefit > s.apply.max(s.eligibility) {
        Some(Section::Benefit)
    } else {
        None
    }
}

/// Classify a body line. Ties go to process, then eligibility; a score
/// below 2 is not enough evidence.
pub fn bucket_from_line(line: &str) -> Option<Section> {
    let t = line.trim();
    if t.is_empty() {
        return None;
    }
    let s = line_scores(t);

    if s.apply >= s.eligibility.max(s.benefit) && s.apply >= 2 {
        Some(Section::Process)
    } else if s.eligibility >= s.apply.max(s.benefit) && s.eligibility >= 2 {
        Some(Section::Eligibility)
    } else if s.benefit >= s.apply.max(s.eligibility) && s.benefit >= 2 {
        Some(Section::Benefit)
    } else {
        None
    }
}

/// Line evidence wins over the heading; `fallback` when neither decides.
pub fn final_bucket(title: &str, line: &str, fallback: Section) -> Section {
    bucket_from_line(line)
        .or_else(|| bucket_from_title(title))
        .unwrap_or(fallback)
}
