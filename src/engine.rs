//! Engine: drives discovery, extraction and storage for one run.
//!
//! The engine owns the record sink and the [`SequenceCounter`]; it is the
//! only writer. Extraction either happens inline (sequential mode, the
//! reference ordering) or on a rayon pool that sends fully hashed records
//! through a bounded channel back to the engine.
//!
//! Typical usage:
//!
//! ```no_run
//! use breachdb::engine::{Engine, IngestOptions};
//! use breachdb::sink::SqliteSink;
//! # fn main() -> anyhow::Result<()> {
//! let sink = SqliteSink::open(std::path::Path::new("breach.db"))?;
//! let mut engine = Engine::new(sink, IngestOptions::default());
//! engine.prepare()?;
//! engine.ingest_root(std::path::Path::new("/srv/BreachCompilation"))?;
//! println!("{}", breachdb::report::render_summary(engine.stats()));
//! # Ok(())
//! # }
//! ```
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender};

use log::{error, info};
use rayon::prelude::*;

use crate::credential::PendingRecord;
use crate::extract::{FileReport, extract_bytes, extract_file};
use crate::io::DEFAULT_MMAP_THRESHOLD_BYTES;
use crate::logging::{FILE, INSERT_FAIL, TRACE};
use crate::shard::ShardKey;
use crate::sink::{RecordSink, SequenceCounter, ShardSchema, SinkError};
use crate::stats::IngestStats;
use crate::walker::{DataWalker, WalkError};

/// Log every Nth sequence id to the trace channel.
pub const DEFAULT_PROGRESS_EVERY: u64 = 1000;
/// Print every Nth successful insert to stdout.
pub const DEFAULT_PRINT_EVERY: u64 = 50_000;
/// Records buffered between parallel extractors and the writer.
pub const DEFAULT_QUEUE_DEPTH: usize = 4096;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub parallel: bool,
    pub mmap_threshold_bytes: u64,
    /// 0 disables trace sampling.
    pub progress_every: u64,
    /// 0 disables stdout sampling.
    pub print_every: u64,
    pub queue_depth: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            mmap_threshold_bytes: DEFAULT_MMAP_THRESHOLD_BYTES,
            progress_every: DEFAULT_PROGRESS_EVERY,
            print_every: DEFAULT_PRINT_EVERY,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

pub struct Engine<S> {
    sink: S,
    counter: SequenceCounter,
    options: IngestOptions,
    stats: IngestStats,
}

impl<S: ShardSchema + RecordSink> Engine<S> {
    pub fn new(sink: S, options: IngestOptions) -> Self {
        Self {
            sink,
            counter: SequenceCounter::default(),
            options,
            stats: IngestStats::default(),
        }
    }

    /// Create the shard tables and continue numbering after the highest
    /// sequence id already stored.
    pub fn prepare(&mut self) -> Result<(), SinkError> {
        self.sink.create_tables()?;
        let max = self.sink.max_sequence_id()?;
        self.counter = SequenceCounter::after(max);
        info!(target: TRACE, "next sequence id is {}", self.counter.peek());
        Ok(())
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn next_sequence_id(&self) -> u64 {
        self.counter.peek()
    }

    /// Number and store one record. A failed write is logged to the
    /// `insert_fail` channel and does not consume a sequence id.
    pub fn deliver(&mut self, shard: ShardKey, pending: PendingRecord) -> Option<u64> {
        let id = self.counter.peek();
        let record = pending.with_sequence_id(id);
        match self.sink.insert(shard, &record) {
            Ok(()) => {
                self.counter.advance();
                self.stats.record_insert(shard);
                if self.options.progress_every > 0 && id % self.options.progress_every == 0 {
                    info!(target: TRACE, "inserted: {}", record);
                }
                let inserted = self.stats.inserted as u64;
                if self.options.print_every > 0 && inserted % self.options.print_every == 0 {
                    println!("{}", record);
                }
                Some(id)
            }
            Err(e) => {
                self.stats.record_insert_failure();
                error!(target: INSERT_FAIL, "{} ({})", record, e);
                None
            }
        }
    }

    /// Ingest the contents of one in-memory file.
    pub fn ingest_bytes(&mut self, bytes: &[u8]) -> FileReport {
        let report = extract_bytes(bytes, |shard, pending| {
            self.deliver(shard, pending);
        });
        self.stats.absorb(&report);
        report
    }

    /// Ingest one file from disk. An unreadable file is logged and counted,
    /// never fatal.
    pub fn ingest_file(&mut self, path: &Path) -> Option<FileReport> {
        let threshold = self.options.mmap_threshold_bytes;
        match extract_file(path, threshold, |shard, pending| {
            self.deliver(shard, pending);
        }) {
            Ok(report) => {
                self.stats.absorb(&report);
                Some(report)
            }
            Err(e) => {
                error!(target: FILE, "failed to read {}: {:#}", path.display(), e);
                self.stats.files_unreadable += 1;
                None
            }
        }
    }

    /// Walk `<root>/data` and ingest every file found.
    pub fn ingest_root(&mut self, root: &Path) -> Result<(), WalkError> {
        let walker = DataWalker::new(root)?;
        if self.options.parallel {
            let files: Vec<PathBuf> = walker.files().collect();
            info!(target: TRACE, "extracting {} files in parallel", files.len());
            self.ingest_parallel(files);
        } else {
            for path in walker.files() {
                self.ingest_file(&path);
            }
        }
        info!(
            target: TRACE,
            "finished: files={} inserted={} failed={}",
            self.stats.files,
            self.stats.inserted,
            self.stats.insert_failed
        );
        Ok(())
    }

    /// Extract `files` on the rayon pool while this thread stores records.
    pub fn ingest_parallel(&mut self, files: Vec<PathBuf>) {
        let threshold = self.options.mmap_threshold_bytes;
        let depth = self.options.queue_depth.max(1);
        let (tx, rx) = mpsc::sync_channel::<(ShardKey, PendingRecord)>(depth);
        let extracted = std::thread::scope(|scope| {
            let producer = scope.spawn(move || {
                files
                    .par_iter()
                    .map_with(tx, |tx, path| extract_to_channel(path, threshold, tx))
                    .reduce(IngestStats::default, |mut a, b| {
                        a.merge(&b);
                        a
                    })
            });
            for (shard, pending) in rx {
                self.deliver(shard, pending);
            }
            producer.join()
        });
        match extracted {
            Ok(stats) => self.stats.merge(&stats),
            Err(_) => error!(target: TRACE, "extraction worker panicked"),
        }
    }

    /// Flush buffered writes.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.sink.flush()
    }

    pub fn into_parts(self) -> (S, IngestStats) {
        (self.sink, self.stats)
    }
}

fn extract_to_channel(
    path: &Path,
    threshold: u64,
    tx: &mut SyncSender<(ShardKey, PendingRecord)>,
) -> IngestStats {
    let mut stats = IngestStats::default();
    match extract_file(path, threshold, |shard, pending| {
        // the writer drains until every worker has returned
        let _ = tx.send((shard, pending));
    }) {
        Ok(report) => stats.absorb(&report),
        Err(e) => {
            error!(target: FILE, "failed to read {}: {:#}", path.display(), e);
            stats.files_unreadable += 1;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::HashedRecord;
    use crate::sink::SqliteSink;
    use std::fs;
    use tempfile::tempdir;

    fn quiet() -> IngestOptions {
        IngestOptions {
            print_every: 0,
            ..IngestOptions::default()
        }
    }

    /// Accepts everything except emails in `reject`.
    #[derive(Default)]
    struct RecordingSink {
        rows: Vec<(ShardKey, HashedRecord)>,
        reject: Vec<String>,
        tables_created: usize,
        stored_max: u64,
    }

    impl ShardSchema for RecordingSink {
        fn create_tables(&mut self) -> Result<(), SinkError> {
            self.tables_created += 1;
            Ok(())
        }
        fn max_sequence_id(&mut self) -> Result<u64, SinkError> {
            Ok(self.stored_max)
        }
    }

    impl RecordSink for RecordingSink {
        fn insert(&mut self, shard: ShardKey, record: &HashedRecord) -> Result<(), SinkError> {
            if self.reject.contains(&record.email) {
                return Err(SinkError::Rejected {
                    shard,
                    reason: "duplicate key".into(),
                });
            }
            self.rows.push((shard, record.clone()));
            Ok(())
        }
    }

    #[test]
    fn mixed_lines_end_to_end() {
        let mut e = Engine::new(RecordingSink::default(), quiet());
        e.prepare().unwrap();
        let report = e.ingest_bytes(b"a@b.com:pw1\nc@d.com;pw2\nmalformed-line\n");
        assert_eq!(report.records, 2);
        let stats = e.stats().clone();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.malformed, 1);
        let rows = &e.sink().rows;
        assert_eq!(rows[0].0, ShardKey::Char('a'));
        assert_eq!(rows[0].1.sequence_id, 1);
        assert_eq!(rows[1].0, ShardKey::Char('c'));
        assert_eq!(rows[1].1.sequence_id, 2);
        assert_eq!(rows[1].1.password, "pw2");
    }

    #[test]
    fn failed_insert_does_not_consume_sequence_id() {
        let sink = RecordingSink {
            reject: vec!["dup@x.com".into()],
            ..RecordingSink::default()
        };
        let mut e = Engine::new(sink, quiet());
        e.prepare().unwrap();
        e.ingest_bytes(b"one@x.com:1\ndup@x.com:2\nthree@x.com:3\n");
        let ids: Vec<u64> = e.sink().rows.iter().map(|(_, r)| r.sequence_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(e.stats().insert_failed, 1);
        assert_eq!(e.next_sequence_id(), 3);
    }

    #[test]
    fn prepare_continues_after_stored_ids() {
        let sink = RecordingSink {
            stored_max: 99,
            ..RecordingSink::default()
        };
        let mut e = Engine::new(sink, quiet());
        e.prepare().unwrap();
        assert_eq!(e.sink().tables_created, 1);
        let (shard, pending) = crate::extract::extract_line("q@x.com:p").unwrap();
        assert_eq!(e.deliver(shard, pending), Some(100));
        assert_eq!(e.next_sequence_id(), 101);
    }

    #[test]
    fn non_email_lines_are_not_delivered() {
        let mut e = Engine::new(RecordingSink::default(), quiet());
        e.ingest_bytes(b"no-at-sign:pw\na@b@c:pw\n");
        assert!(e.sink().rows.is_empty());
        assert_eq!(e.stats().not_email, 2);
    }

    fn write_tree(root: &Path) {
        let data = root.join("data");
        fs::create_dir_all(data.join("a/deeper/deepest")).unwrap();
        fs::write(data.join("top.txt"), b"Alice@x.com:pw\n7x@y.com:pw\n").unwrap();
        fs::write(data.join("a/mid.txt"), b"_weird@y.com;pw\nbroken\n").unwrap();
        fs::write(data.join("a/deeper/low.txt"), b"bob@y.com,p\xe4ss\n").unwrap();
        fs::write(data.join("a/deeper/deepest/ignored.txt"), b"zed@y.com:pw\n").unwrap();
    }

    #[test]
    fn sequential_walk_into_sqlite() {
        let dir = tempdir().unwrap();
        write_tree(dir.path());
        let mut e = Engine::new(SqliteSink::open_in_memory().unwrap(), quiet());
        e.prepare().unwrap();
        e.ingest_root(dir.path()).unwrap();
        let (sink, stats) = e.into_parts();
        assert_eq!(stats.files, 3);
        assert_eq!(stats.files_latin1, 1);
        assert_eq!(stats.inserted, 4);
        assert_eq!(stats.malformed, 1);
        assert_eq!(sink.count(ShardKey::Char('a')).unwrap(), 1);
        assert_eq!(sink.count(ShardKey::Char('7')).unwrap(), 1);
        assert_eq!(sink.count(ShardKey::Symbols).unwrap(), 1);
        assert_eq!(sink.count(ShardKey::Char('b')).unwrap(), 1);
        assert_eq!(sink.count(ShardKey::Char('z')).unwrap(), 0);
        let pw: String = sink
            .connection()
            .query_row("SELECT password FROM \"b\"", [], |r| r.get(0))
            .unwrap();
        assert_eq!(pw, "päss");
    }

    #[test]
    fn parallel_walk_matches_sequential_counts() {
        let dir = tempdir().unwrap();
        write_tree(dir.path());
        let opts = IngestOptions {
            parallel: true,
            queue_depth: 1,
            ..quiet()
        };
        let mut e = Engine::new(SqliteSink::open_in_memory().unwrap(), opts);
        e.prepare().unwrap();
        e.ingest_root(dir.path()).unwrap();
        assert_eq!(e.stats().files, 3);
        assert_eq!(e.stats().inserted, 4);
        assert_eq!(e.next_sequence_id(), 5);
    }

    #[test]
    fn missing_data_dir_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut e = Engine::new(RecordingSink::default(), quiet());
        assert!(matches!(
            e.ingest_root(dir.path()),
            Err(WalkError::MissingDataDir(_))
        ));
        assert_eq!(e.stats(), &IngestStats::default());
    }

    #[test]
    fn unreadable_file_is_counted() {
        let dir = tempdir().unwrap();
        let mut e = Engine::new(RecordingSink::default(), quiet());
        assert!(e.ingest_file(&dir.path().join("gone.txt")).is_none());
        assert_eq!(e.stats().files_unreadable, 1);
    }
}
