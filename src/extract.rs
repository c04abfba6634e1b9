//! File extraction: decode a whole input file, split every line into a
//! credential, classify the email and hash the password.
//!
//! Lines that cannot be turned into a record are logged to the
//! `insert_fail` channel where they are detected; nothing is dropped
//! silently. Successful records are handed to the caller through a callback
//! so the same code feeds both the sequential writer and the parallel
//! channel.
use std::path::Path;

use anyhow::Result;
use log::{error, info};

use crate::credential::PendingRecord;
use crate::io::{TextEncoding, decode, lines, read_auto};
use crate::logging::{FILE, INSERT_FAIL};
use crate::shard::{EmailError, ShardKey, classify_email};
use crate::splitter::{SplitError, split_line};

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Email(#[from] EmailError),
}

/// Counters for one extracted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileReport {
    pub encoding: TextEncoding,
    pub lines: usize,
    pub records: usize,
    pub malformed: usize,
    pub not_email: usize,
}

impl FileReport {
    fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            lines: 0,
            records: 0,
            malformed: 0,
            not_email: 0,
        }
    }
}

/// Turn one decoded line into a routed, hashed record.
pub fn extract_line(line: &str) -> Result<(ShardKey, PendingRecord), LineError> {
    let credential = split_line(line)?;
    let parts = classify_email(&credential.email)?;
    let shard = ShardKey::for_email(&credential.email);
    Ok((shard, PendingRecord::new(credential, parts)))
}

/// Extract every line of an in-memory file.
pub fn extract_bytes<F>(bytes: &[u8], mut emit: F) -> FileReport
where
    F: FnMut(ShardKey, PendingRecord),
{
    let (text, encoding) = decode(bytes);
    let mut report = FileReport::new(encoding);
    for line in lines(&text) {
        report.lines += 1;
        match extract_line(line) {
            Ok((shard, record)) => {
                report.records += 1;
                emit(shard, record);
            }
            Err(LineError::Split(e)) => {
                report.malformed += 1;
                error!(target: INSERT_FAIL, "{}", e);
            }
            Err(LineError::Email(e)) => {
                report.not_email += 1;
                error!(target: INSERT_FAIL, "{}", e);
            }
        }
    }
    report
}

/// Read and extract one file from disk.
pub fn extract_file<P, F>(path: P, mmap_threshold_bytes: u64, emit: F) -> Result<FileReport>
where
    P: AsRef<Path>,
    F: FnMut(ShardKey, PendingRecord),
{
    let path = path.as_ref();
    info!(target: FILE, "extract data from file {}", path.display());
    let bytes = read_auto(path, mmap_threshold_bytes)?;
    let report = extract_bytes(&bytes, emit);
    if report.encoding == TextEncoding::Latin1 {
        info!(target: FILE, "{} is not valid UTF-8, decoded as Latin-1", path.display());
    }
    info!(
        target: FILE,
        "finished {}: lines={} records={} malformed={} not_email={}",
        path.display(),
        report.lines,
        report.records,
        report.malformed,
        report.not_email
    );
    Ok(report)
}
