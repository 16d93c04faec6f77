//! Policy normalisation: line-level section re-bucketing, recovery of lines
//! from the raw page text, and eligibility struct extraction.

pub mod classify;
pub mod eligibility;

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::models::{Policy, Section};
use classify::{age_condition_regex, final_bucket, line_scores, phone_regex};

/// Inline headings that switch the effective section title while walking
/// raw page text.
const INLINE_TITLES: &[&str] = &["지원대상", "지원내용", "문의처", "신청방법", "신청절차", "자격요건"];

/// Counters describing what normalisation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub moved_benefit_to_process: usize,
    pub moved_benefit_to_eligibility: usize,
    pub moved_process_to_eligibility: usize,
    pub moved_process_to_benefit: usize,
    pub added_from_raw: usize,
}

impl NormalizeStats {
    pub fn merge(&mut self, other: &NormalizeStats) {
        self.moved_benefit_to_process += other.moved_benefit_to_process;
        self.moved_benefit_to_eligibility += other.moved_benefit_to_eligibility;
        self.moved_process_to_eligibility += other.moved_process_to_eligibility;
        self.moved_process_to_benefit += other.moved_process_to_benefit;
        self.added_from_raw += other.added_from_raw;
    }
}

/// Non-empty trimmed lines.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Comparison key: lowercase ASCII alphanumerics and Hangul only.
pub fn line_key(line: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[^0-9A-Za-z가-힣]+").expect("valid line key regex"));
    re.replace_all(&line.to_lowercase(), "").into_owned()
}

fn norm_keep_lines(s: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[ \t]+").expect("valid blank regex"));
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| re.replace_all(l, " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_noise(t: &str) -> bool {
    static PHONE_FULL: OnceLock<Regex> = OnceLock::new();
    let phone = PHONE_FULL.get_or_init(|| {
        Regex::new(r"^(\d{2,4}-\d{3,4}-\d{4}|\d{3,4}-\d{4})$").expect("valid bare phone regex")
    });

    t.chars().count() <= 2 || phone.is_match(t) || t == "홈페이지 바로가기" || t == "바로가기"
}

/// Exact de-dup, noise removal, then removal of lines that are strict
/// substrings of another kept line. Order is preserved.
pub fn dedup_texts<S: AsRef<str>>(texts: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let uniq: Vec<String> = texts
        .iter()
        .map(|t| norm_keep_lines(t.as_ref()))
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .filter(|t| !is_noise(t))
        .collect();

    uniq.iter()
        .enumerate()
        .filter(|(i, t)| {
            !uniq
                .iter()
                .enumerate()
                .any(|(j, u)| *i != j && t.len() < u.len() && u.contains(t.as_str()))
        })
        .map(|(_, t)| t.clone())
        .collect()
}

/// (section title, line) pairs recovered from the raw page text.
fn raw_units(raw_text: &str) -> Vec<(String, String)> {
    let mut current_title = String::new();
    let mut units = Vec::new();
    for line in split_lines(raw_text) {
        if INLINE_TITLES.contains(&line.as_str()) {
            current_title = line.clone();
            units.push((line.clone(), line));
            continue;
        }
        units.push((current_title.clone(), line));
    }
    units
}

#[derive(Default)]
struct Buckets {
    eligibility: Vec<String>,
    benefit: Vec<String>,
    process: Vec<String>,
}

impl Buckets {
    fn push(&mut self, section: Section, line: String) {
        match section {
            Section::Eligibility => self.eligibility.push(line),
            Section::Process => self.process.push(line),
            Section::Benefit | Section::Meta => self.benefit.push(line),
        }
    }

    fn all(&self) -> impl Iterator<Item = &String> {
        self.eligibility
            .iter()
            .chain(self.benefit.iter())
            .chain(self.process.iter())
    }
}

fn joined(lines: &[String]) -> Option<String> {
    let kept = dedup_texts(lines);
    if kept.is_empty() {
        None
    } else {
        Some(kept.join("\n"))
    }
}

/// Move clearly misfiled lines between sections, recover lines that only
/// exist in `raw_text`, de-dup every section and recompute the eligibility
/// struct.
pub fn normalize_policy(policy: &Policy) -> (Policy, NormalizeStats) {
    let mut stats = NormalizeStats::default();
    let mut buckets = Buckets::default();

    for line in split_lines(policy.eligibility_text.as_deref().unwrap_or_default()) {
        buckets.eligibility.push(line);
    }

    for line in split_lines(policy.benefit_text.as_deref().unwrap_or_default()) {
        let s = line_scores(&line);
        if age_condition_regex().is_match(&line) {
            buckets.eligibility.push(line);
            stats.moved_benefit_to_eligibility += 1;
        } else if phone_regex().is_match(&line) && s.benefit == 0 {
            buckets.process.push(line);
            stats.moved_benefit_to_process += 1;
        } else if s.apply >= 3 && s.benefit == 0 && s.eligibility <= 1 {
            buckets.process.push(line);
            stats.moved_benefit_to_process += 1;
        } else {
            buckets.benefit.push(line);
        }
    }

    for line in split_lines(policy.process_text.as_deref().unwrap_or_default()) {
        let s = line_scores(&line);
        if s.eligibility >= 3 && s.apply <= 1 {
            buckets.eligibility.push(line);
            stats.moved_process_to_eligibility += 1;
        } else if s.benefit >= 3 && s.apply == 0 {
            buckets.benefit.push(line);
            stats.moved_process_to_benefit += 1;
        } else {
            buckets.process.push(line);
        }
    }

    if let Some(raw) = policy.raw_text.as_deref() {
        let mut existing_keys: HashSet<String> = buckets
            .all()
            .map(|l| line_key(l))
            .filter(|k| !k.is_empty())
            .collect();
        let mut existing_blob: String = buckets.all().map(|l| line_key(l)).collect();

        for (title, line) in raw_units(raw) {
            let key = line_key(&line);
            if key.chars().count() <= 2
                || existing_keys.contains(&key)
                || existing_blob.contains(&key)
            {
                continue;
            }
            let section = final_bucket(&title, &line, Section::Benefit);
            buckets.push(section, line);
            existing_blob.push_str(&key);
            existing_keys.insert(key);
            stats.added_from_raw += 1;
        }
    }

    let mut out = policy.clone();
    out.eligibility_text = joined(&buckets.eligibility);
    out.benefit_text = joined(&buckets.benefit);
    out.process_text = joined(&buckets.process);
    out.eligibility_struct = Some(eligibility::build_eligibility_struct(&out));

    (out, stats)
}
