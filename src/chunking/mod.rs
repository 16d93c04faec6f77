//! Policy chunking: one META block per policy, then each free-text section
//! split to the character budget and re-merged when pieces are too small.

pub mod split;

use std::collections::BTreeMap;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Policy, PolicyMeta, Section};

/// Trim every line, keep at most one blank line in a row, trim the result.
pub fn norm_text(s: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank = 0usize;
    for line in s.split('\n') {
        let line = line.trim();
        if !line.is_empty() {
            out.push(line);
            blank = 0;
        } else {
            blank += 1;
            if blank <= 1 {
                out.push("");
            }
        }
    }
    out.join("\n").trim().to_string()
}

/// Header block describing the policy itself: title, category, provider,
/// region, age range and source.
pub fn meta_block(policy: &Policy) -> String {
    let mut lines = vec![
        format!("제목: {}", policy.title),
        format!("카테고리: {}", policy.category.as_str()),
    ];

    if let Some(provider) = policy.provider.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(format!("기관: {provider}"));
    }
    if let Some(region) = policy.region.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(format!("지역: {region}"));
    }
    if let Some(es) = &policy.eligibility_struct {
        if es.age_min.is_some() || es.age_max.is_some() {
            let fmt = |v: Option<u32>| v.map(|a| a.to_string()).unwrap_or_default();
            lines.push(format!("나이: {}~{}", fmt(es.age_min), fmt(es.age_max)));
        }
        if !es.regions.sido.is_empty() {
            lines.push(format!("시도: {}", es.regions.sido.join(", ")));
        }
        if !es.regions.sigungu.is_empty() {
            lines.push(format!("시군구: {}", es.regions.sigungu.join(", ")));
        }
    }
    if let Some(url) = policy.source_url.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(format!("출처: {url}"));
    }

    norm_text(&lines.join("\n"))
}

fn build_blocks(policy: &Policy) -> Vec<(Section, String)> {
    let mut blocks = Vec::new();

    let meta = meta_block(policy);
    if !meta.is_empty() {
        blocks.push((Section::Meta, meta));
    }

    let sections = [
        (Section::Eligibility, &policy.eligibility_text),
        (Section::Benefit, &policy.benefit_text),
        (Section::Process, &policy.process_text),
    ];
    for (section, text) in sections {
        let text = norm_text(text.as_deref().unwrap_or_default());
        if !text.is_empty() {
            blocks.push((section, text));
        }
    }

    blocks
}

/// Chunk a single policy. Chunk ids are `{policy_id}#{n:03}`, numbered in
/// emission order across all sections.
pub fn chunk_policy(policy: &Policy, config: &ChunkingConfig) -> Vec<Chunk> {
    let mut out = Vec::new();

    for (section, text) in build_blocks(policy) {
        let pieces = if section == Section::Meta {
            vec![text]
        } else {
            let pieces = split::split_long_text(&text, config.max_chars, config.overlap);
            split::merge_short_chunks(&pieces, config.min_chars)
        };

        for piece in pieces {
            let piece = norm_text(&piece);
            if piece.is_empty() || piece.chars().count() < config.drop_under {
                continue;
            }
            out.push(Chunk {
                chunk_id: format!("{}#{:03}", policy.policy_id, out.len()),
                policy_id: policy.policy_id.clone(),
                category: policy.category,
                title: policy.title.clone(),
                section,
                text: piece,
            });
        }
    }

    out
}

/// Chunk a batch of policies, in input order.
pub fn chunk_policies(policies: &[Policy], config: &ChunkingConfig) -> Vec<Chunk> {
    policies
        .iter()
        .flat_map(|p| chunk_policy(p, config))
        .collect()
}

/// Policy id → metadata consulted by the eligibility filter.
pub fn build_policy_metadata_map(policies: &[Policy]) -> BTreeMap<String, PolicyMeta> {
    policies
        .iter()
        .filter(|p| !p.policy_id.is_empty())
        .map(|p| {
            (
                p.policy_id.clone(),
                PolicyMeta {
                    eligibility_struct: p.eligibility_struct.clone(),
                    source_url: p.source_url.clone(),
                },
            )
        })
        .collect()
}
