//! Record sinks: durable, sharded storage for [`HashedRecord`]s.
//!
//! A backend provides two capabilities. [`ShardSchema`] creates one table per
//! shard (idempotently) and reports the highest stored sequence id so a new
//! run continues numbering where the last one stopped. [`RecordSink`] stores
//! one record and reports failure as a value; the caller decides what to log.
pub mod csv;
pub mod postgres;
pub mod sqlite;

use thiserror::Error;

use crate::credential::HashedRecord;
use crate::shard::ShardKey;

pub use self::csv::CsvSink;
pub use self::postgres::{PgConfig, PostgresSink};
pub use self::sqlite::SqliteSink;

/// Column order shared by every backend.
pub const COLUMNS: [&str; 9] = [
    "sequence_id",
    "email",
    "password",
    "username",
    "provider",
    "sha1",
    "sha256",
    "sha512",
    "md5",
];

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("failed to create schema: {0}")]
    Schema(String),
    #[error("record rejected by shard {shard}: {reason}")]
    Rejected { shard: ShardKey, reason: String },
    #[error("write to shard {shard} failed: {reason}")]
    Backend { shard: ShardKey, reason: String },
}

pub trait ShardSchema {
    /// Create every shard table if absent. Safe to call repeatedly.
    fn create_tables(&mut self) -> Result<(), SinkError>;

    /// Highest sequence id stored across all shards, 0 when empty.
    fn max_sequence_id(&mut self) -> Result<u64, SinkError>;
}

pub trait RecordSink {
    /// Store one record in the table of `shard`. Each call is committed on
    /// its own.
    fn insert(&mut self, shard: ShardKey, record: &HashedRecord) -> Result<(), SinkError>;

    /// Push buffered writes to durable storage.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Next sequence id to hand out. Only advanced after a successful insert, so
/// gaps never appear for failed writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceCounter {
    next: u64,
}

impl SequenceCounter {
    /// Counter continuing after the highest id already stored.
    pub fn after(max_stored: u64) -> Self {
        Self {
            next: max_stored + 1,
        }
    }

    pub fn peek(&self) -> u64 {
        self.next
    }

    pub fn advance(&mut self) {
        self.next += 1;
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::after(0)
    }
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// DDL for one shard table. `table` must already be quoted/qualified.
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (sequence_id bigint PRIMARY KEY, email text, password text, \
         username text, provider text, sha1 char(40), sha256 char(64), sha512 char(128), md5 char(32))",
        table
    )
}

/// Parameterised insert for one shard table, using `$n` placeholders.
pub fn insert_sql(table: &str) -> String {
    let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_after_stored_max() {
        let mut c = SequenceCounter::after(41);
        assert_eq!(c.peek(), 42);
        assert_eq!(c.peek(), 42);
        c.advance();
        assert_eq!(c.peek(), 43);
        assert_eq!(SequenceCounter::default().peek(), 1);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("a"), "\"a\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn statements_list_all_columns() {
        let ddl = create_table_sql("\"s\".\"a\"");
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"s\".\"a\" (sequence_id bigint PRIMARY KEY"));
        assert!(ddl.contains("md5 char(32))"));
        assert_eq!(
            insert_sql("\"7\""),
            "INSERT INTO \"7\" (sequence_id, email, password, username, provider, sha1, sha256, sha512, md5) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        );
    }
}
