//! C3 Log Compressor (spec §4.3).

use crate::signals::{is_failure_line, is_warning_line};
use crate::tokens::count as count_tokens;

use loglens_domain::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Priority {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
struct Region {
    lines: Vec<String>,
    priority: Priority,
    start_index: usize,
}

#[derive(Debug, Clone)]
pub struct CompressedLog {
    pub text: String,
    pub truncated: bool,
}

const CONTEXT_WINDOW: usize = 2;

fn classify_regions(lines: &[&str]) -> Vec<Region> {
    let mut flags = vec![false; lines.len()];
    for (i, line) in lines.iter().enumerate() {
        if is_failure_line(line) {
            let lo = i.saturating_sub(CONTEXT_WINDOW);
            let hi = (i + CONTEXT_WINDOW + 1).min(lines.len());
            for f in flags.iter_mut().take(hi).skip(lo) {
                *f = true;
            }
        }
    }

    let mut regions = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let start = i;
        let is_error = flags[i];
        while i < lines.len() && flags[i] == is_error {
            i += 1;
        }
        let chunk = &lines[start..i];
        let priority = if is_error {
            Priority::Error
        } else if chunk.iter().any(|l| is_warning_line(l)) {
            Priority::Warning
        } else {
            Priority::Info
        };
        regions.push(Region {
            lines: chunk.iter().map(|s| s.to_string()).collect(),
            priority,
            start_index: start,
        });
    }
    regions
}

/// Collapse runs of identical consecutive lines into one line plus a
/// `[repeated k×]` marker (spec §4.3 step 2).
fn dedup_consecutive(lines: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let mut j = i + 1;
        while j < lines.len() && lines[j] == lines[i] {
            j += 1;
        }
        let run = j - i;
        out.push(lines[i].clone());
        if run > 1 {
            out.push(format!("[repeated {run}x]"));
        }
        i = j;
    }
    out
}

fn truncate_middle(lines: &[String], keep_head: usize, keep_tail: usize) -> Vec<String> {
    if lines.len() <= keep_head + keep_tail {
        return lines.to_vec();
    }
    let mut out = Vec::new();
    out.extend_from_slice(&lines[..keep_head]);
    let omitted = lines.len() - keep_head - keep_tail;
    out.push(format!("[... {omitted} lines omitted ...]"));
    out.extend_from_slice(&lines[lines.len() - keep_tail..]);
    out
}

/// Reduce sanitized log text to at most `budget` tokens, preserving
/// failure-signal lines (spec §4.3).
pub fn compress(text: &str, budget: u32, model_family: &str) -> Result<CompressedLog> {
    if count_tokens(text, model_family)? <= budget {
        return Ok(CompressedLog {
            text: text.to_string(),
            truncated: false,
        });
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut regions = classify_regions(&lines);
    for region in regions.iter_mut() {
        region.lines = dedup_consecutive(std::mem::take(&mut region.lines));
    }

    // Order by (priority desc, start_index asc) so within a priority
    // temporal order is preserved while errors are considered first.
    let mut ordered: Vec<usize> = (0..regions.len()).collect();
    ordered.sort_by(|&a, &b| {
        regions[b]
            .priority
            .cmp(&regions[a].priority)
            .then(regions[a].start_index.cmp(&regions[b].start_index))
    });

    let mut kept: Vec<Option<Vec<String>>> = vec![None; regions.len()];
    let mut used_tokens: u32 = 0;
    let mut any_elided = false;

    for &idx in &ordered {
        let region_text = regions[idx].lines.join("\n");
        let region_tokens = count_tokens(&region_text, model_family)?;

        if used_tokens + region_tokens <= budget {
            kept[idx] = Some(regions[idx].lines.clone());
            used_tokens += region_tokens;
            continue;
        }

        if regions[idx].priority == Priority::Error {
            // Never elide failure-signal lines: truncate from the
            // middle instead, keeping head and tail, until it fits
            // (or we are out of budget entirely).
            let remaining = budget.saturating_sub(used_tokens);
            if remaining == 0 {
                kept[idx] = Some(vec![format!(
                    "[... {} lines omitted (out of budget) ...]",
                    regions[idx].lines.len()
                )]);
                any_elided = true;
                continue;
            }
            let mut lines_budget = regions[idx].lines.len();
            let mut truncated_lines = regions[idx].lines.clone();
            while lines_budget > 2 {
                let keep_head = (lines_budget / 2).max(1);
                let keep_tail = lines_budget - keep_head;
                truncated_lines = truncate_middle(&regions[idx].lines, keep_head, keep_tail);
                let t = count_tokens(&truncated_lines.join("\n"), model_family)?;
                if used_tokens + t <= budget {
                    break;
                }
                lines_budget -= 1;
            }
            used_tokens += count_tokens(&truncated_lines.join("\n"), model_family)?;
            kept[idx] = Some(truncated_lines);
            any_elided = true;
        } else {
            // Low-priority region: elide entirely with a marker.
            kept[idx] = Some(vec![format!(
                "[... {} lines omitted ...]",
                regions[idx].lines.len()
            )]);
            any_elided = true;
        }
    }

    let mut output_lines = Vec::new();
    for region in &kept {
        if let Some(lines) = region {
            output_lines.extend(lines.iter().cloned());
        }
    }
    let output = output_lines.join("\n");

    let final_tokens = count_tokens(&output, model_family)?;
    if final_tokens > budget {
        // Error regions alone exceed budget: truncate to budget and
        // flag (spec §4.3 failure mode).
        let approx_chars = (budget as usize) * 4;
        let truncated_text: String = output.chars().take(approx_chars).collect();
        return Ok(CompressedLog {
            text: truncated_text,
            truncated: true,
        });
    }

    Ok(CompressedLog {
        text: output,
        truncated: any_elided,
    })
}
