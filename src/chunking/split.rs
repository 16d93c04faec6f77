//! Character-budget splitter for policy section text.
//!
//! Three-tier splitting strategy:
//! 1. Pack whole paragraphs (blank-line separated) up to the budget
//! 2. If a paragraph is still too large, pack its lines
//! 3. Last resort: fixed windows over characters, overlapping by `overlap`
//!
//! All lengths are in chars, not bytes.

use super::norm_text;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` into pieces of at most `max_chars` characters.
pub fn split_long_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let text = norm_text(text);
    if text.is_empty() {
        return Vec::new();
    }
    if char_len(&text) <= max_chars {
        return vec![text];
    }

    let paras: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut chunks: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in paras {
        let cand = if buf.is_empty() {
            para.to_string()
        } else {
            format!("{buf}\n\n{para}")
        };
        if char_len(&cand) <= max_chars {
            buf = cand;
            continue;
        }

        // Flush accumulator
        if !buf.trim().is_empty() {
            chunks.push(buf.trim().to_string());
        }
        buf.clear();

        if char_len(para) <= max_chars {
            buf = para.to_string();
            continue;
        }

        // Paragraph too large, pack by lines
        let mut line_buf = String::new();
        for line in para.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let line_cand = if line_buf.is_empty() {
                line.to_string()
            } else {
                format!("{line_buf}\n{line}")
            };
            if char_len(&line_cand) <= max_chars {
                line_buf = line_cand;
            } else {
                if !line_buf.is_empty() {
                    chunks.push(std::mem::take(&mut line_buf));
                }
                line_buf = line.to_string();
            }
        }
        if !line_buf.is_empty() {
            chunks.push(line_buf);
        }
    }

    if !buf.trim().is_empty() {
        chunks.push(buf.trim().to_string());
    }

    let mut final_chunks = Vec::with_capacity(chunks.len());
    for c in chunks {
        if char_len(&c) <= max_chars {
            final_chunks.push(c);
        } else {
            split_by_chars(&c, max_chars, overlap, &mut final_chunks);
        }
    }
    final_chunks
}

fn split_by_chars(text: &str, max_chars: usize, overlap: usize, out: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        if end == chars.len() {
            break;
        }
        // Always advance, even with a degenerate overlap
        start = end.saturating_sub(overlap).max(start + 1);
    }
}

/// Merge undersized pieces forward: a buffer shorter than `min_chars`
/// absorbs the next piece.
pub fn merge_short_chunks(pieces: &[String], min_chars: usize) -> Vec<String> {
    let pieces: Vec<String> = pieces
        .iter()
        .map(|p| norm_text(p))
        .filter(|p| !p.is_empty())
        .collect();

    let mut out = Vec::new();
    let mut buf = String::new();
    for p in pieces {
        if buf.is_empty() {
            buf = p;
            continue;
        }
        if char_len(&buf) < min_chars {
            buf = norm_text(&format!("{buf}\n\n{p}"));
        } else {
            out.push(std::mem::replace(&mut buf, p));
        }
    }
    if !buf.is_empty() {
        out.push(buf);
    }
    out
}
