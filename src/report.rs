//! Human-readable report rendering for terminal output.
//!
//! Produces a colored end-of-run summary: extraction counters, storage
//! outcome and the busiest shards.
use colored::*;

use crate::stats::{IngestStats, pct};

fn visible_len(s: &str) -> usize {
    // Strip ANSI escape sequences (\x1b[ ... m) to compute printable width
    let mut len = 0;
    let mut iter = s.chars().peekable();
    while let Some(ch) = iter.next() {
        if ch == '\u{1b}' {
            if let Some('[') = iter.peek().cloned() {
                let _ = iter.next();
            }
            for c in iter.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            len += 1;
        }
    }
    len
}

fn section_header(title: &str) -> String {
    let len = visible_len(title);
    let mut s = String::new();
    s.push('\n');
    s.push_str(title);
    s.push('\n');
    s.push_str(&"─".repeat(len));
    s.push_str("\n\n");
    s
}

fn push_section(out: &mut String, title: &str, lines: Vec<String>) {
    out.push_str(&section_header(title));
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
}

pub fn render_summary(stats: &IngestStats) -> String {
    render_summary_with_top(stats, 10)
}

/// Render the summary listing at most `top_n` shards by stored records.
pub fn render_summary_with_top(stats: &IngestStats, top_n: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n",
        "BreachDB: Credential Ingestion Results".bold().cyan()
    ));

    let extraction = vec![
        format!("Files processed: {}", stats.files),
        format!("Files decoded as Latin-1: {}", stats.files_latin1),
        format!("Unreadable files: {}", stats.files_unreadable),
        format!("Lines read: {}", stats.lines),
        format!("Malformed lines: {}", stats.malformed),
        format!("Non-email lines: {}", stats.not_email),
        format!(
            "Rejected Percentage: {}",
            pct(stats.rejected_lines(), stats.lines)
        ),
    ];
    push_section(
        &mut out,
        &"Extraction".bold().yellow().to_string(),
        extraction,
    );

    let failed = if stats.insert_failed > 0 {
        stats.insert_failed.to_string().red().to_string()
    } else {
        stats.insert_failed.to_string()
    };
    let storage = vec![
        format!("Inserted: {}", stats.inserted),
        format!("Insert failures: {}", failed),
        format!(
            "Insert Success Percentage: {}",
            pct(stats.inserted, stats.inserted + stats.insert_failed)
        ),
    ];
    push_section(&mut out, &"Storage".bold().yellow().to_string(), storage);

    let mut shards: Vec<_> = stats.per_shard.iter().collect();
    // count desc, then shard order
    shards.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    shards.truncate(top_n);
    let shard_lines = if shards.is_empty() {
        vec!["(No records stored)".to_string()]
    } else {
        shards
            .into_iter()
            .map(|(shard, n)| format!("  {}: {}", shard, n))
            .collect()
    };
    push_section(
        &mut out,
        &"Shard Breakdown".bold().cyan().to_string(),
        shard_lines,
    );

    out
}
