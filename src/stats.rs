//! Counters collected over one ingestion run.
use std::collections::BTreeMap;

use crate::extract::FileReport;
use crate::io::TextEncoding;
use crate::shard::ShardKey;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub files: usize,
    pub files_latin1: usize,
    pub files_unreadable: usize,
    pub lines: usize,
    pub malformed: usize,
    pub not_email: usize,
    pub inserted: usize,
    pub insert_failed: usize,
    pub per_shard: BTreeMap<ShardKey, usize>,
}

impl IngestStats {
    /// Fold in the extraction counters of one file.
    pub fn absorb(&mut self, report: &FileReport) {
        self.files += 1;
        if report.encoding == TextEncoding::Latin1 {
            self.files_latin1 += 1;
        }
        self.lines += report.lines;
        self.malformed += report.malformed;
        self.not_email += report.not_email;
    }

    pub fn record_insert(&mut self, shard: ShardKey) {
        self.inserted += 1;
        *self.per_shard.entry(shard).or_insert(0) += 1;
    }

    pub fn record_insert_failure(&mut self) {
        self.insert_failed += 1;
    }

    /// Merge counters gathered elsewhere, e.g. by parallel workers.
    pub fn merge(&mut self, other: &IngestStats) {
        self.files += other.files;
        self.files_latin1 += other.files_latin1;
        self.files_unreadable += other.files_unreadable;
        self.lines += other.lines;
        self.malformed += other.malformed;
        self.not_email += other.not_email;
        self.inserted += other.inserted;
        self.insert_failed += other.insert_failed;
        for (shard, n) in &other.per_shard {
            *self.per_shard.entry(*shard).or_insert(0) += n;
        }
    }

    /// Lines that never produced a record or an insert attempt.
    pub fn rejected_lines(&self) -> usize {
        self.malformed + self.not_email
    }
}

/// Percentage with two decimals, `0.00%` for an empty denominator.
pub fn pct(n: usize, d: usize) -> String {
    if d == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", (n as f64) / (d as f64) * 100.0)
}
