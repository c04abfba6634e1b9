//! SQLite backend: the same 37 shard tables in a single database file.
use std::path::Path;

use log::info;
use rusqlite::{Connection, ErrorCode, params};

use super::{RecordSink, ShardSchema, SinkError, create_table_sql, insert_sql, quote_ident};
use crate::credential::HashedRecord;
use crate::logging::TRACE;
use crate::shard::ShardKey;

pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SinkError::Connect(e.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| SinkError::Connect(e.to_string()))?;
        info!(target: TRACE, "opened sqlite database {}", path.display());
        Ok(Self { conn })
    }

    /// In-memory store, mostly useful for tests.
    pub fn open_in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory().map_err(|e| SinkError::Connect(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of rows stored in one shard.
    pub fn count(&self, shard: ShardKey) -> Result<u64, SinkError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table(shard));
        self.conn
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| SinkError::Backend {
                shard,
                reason: e.to_string(),
            })
    }
}

fn table(shard: ShardKey) -> String {
    quote_ident(&shard.table_name())
}

fn write_error(shard: ShardKey, e: rusqlite::Error) -> SinkError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
            SinkError::Rejected {
                shard,
                reason: e.to_string(),
            }
        }
        _ => SinkError::Backend {
            shard,
            reason: e.to_string(),
        },
    }
}

impl ShardSchema for SqliteSink {
    fn create_tables(&mut self) -> Result<(), SinkError> {
        info!(target: TRACE, "create tables for credentials");
        for shard in ShardKey::all() {
            self.conn
                .execute(&create_table_sql(&table(shard)), [])
                .map_err(|e| SinkError::Schema(format!("{}: {}", shard, e)))?;
        }
        Ok(())
    }

    fn max_sequence_id(&mut self) -> Result<u64, SinkError> {
        let mut max = 0u64;
        for shard in ShardKey::all() {
            let sql = format!("SELECT COALESCE(MAX(sequence_id), 0) FROM {}", table(shard));
            let id: i64 = self
                .conn
                .query_row(&sql, [], |row| row.get(0))
                .map_err(|e| SinkError::Schema(format!("{}: {}", shard, e)))?;
            max = max.max(id.max(0) as u64);
        }
        Ok(max)
    }
}

impl RecordSink for SqliteSink {
    fn insert(&mut self, shard: ShardKey, record: &HashedRecord) -> Result<(), SinkError> {
        let id = i64::try_from(record.sequence_id).map_err(|e| SinkError::Rejected {
            shard,
            reason: e.to_string(),
        })?;
        let mut stmt = self
            .conn
            .prepare_cached(&insert_sql(&table(shard)))
            .map_err(|e| write_error(shard, e))?;
        stmt.execute(params![
            id,
            record.email,
            record.password,
            record.username,
            record.provider,
            record.sha1,
            record.sha256,
            record.sha512,
            record.md5,
        ])
        .map(|_| ())
        .map_err(|e| write_error(shard, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, EmailParts, PendingRecord};

    fn record(id: u64, email: &str) -> HashedRecord {
        let (user, provider) = email.split_once('@').unwrap();
        PendingRecord::new(
            Credential::new(email, "pw"),
            EmailParts {
                username: user.into(),
                provider: provider.into(),
            },
        )
        .with_sequence_id(id)
    }

    #[test]
    fn create_tables_is_idempotent() {
        let mut s = SqliteSink::open_in_memory().unwrap();
        s.create_tables().unwrap();
        s.create_tables().unwrap();
        let n: i64 = s
            .connection()
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(n, 37);
    }

    #[test]
    fn insert_and_max_sequence_id() {
        let mut s = SqliteSink::open_in_memory().unwrap();
        s.create_tables().unwrap();
        assert_eq!(s.max_sequence_id().unwrap(), 0);
        s.insert(ShardKey::Char('a'), &record(1, "a@b.com")).unwrap();
        s.insert(ShardKey::Symbols, &record(5, "_x@b.com")).unwrap();
        assert_eq!(s.count(ShardKey::Char('a')).unwrap(), 1);
        assert_eq!(s.count(ShardKey::Symbols).unwrap(), 1);
        assert_eq!(s.max_sequence_id().unwrap(), 5);
        let (email, sha1): (String, String) = s
            .connection()
            .query_row("SELECT email, sha1 FROM \"a\" WHERE sequence_id = 1", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(email, "a@b.com");
        assert_eq!(sha1.len(), 40);
    }

    #[test]
    fn duplicate_sequence_id_is_rejected() {
        let mut s = SqliteSink::open_in_memory().unwrap();
        s.create_tables().unwrap();
        s.insert(ShardKey::Char('a'), &record(1, "a@b.com")).unwrap();
        let err = s
            .insert(ShardKey::Char('a'), &record(1, "a2@b.com"))
            .unwrap_err();
        assert!(matches!(err, SinkError::Rejected { .. }));
    }

    #[test]
    fn insert_without_schema_is_a_backend_error() {
        let mut s = SqliteSink::open_in_memory().unwrap();
        let err = s.insert(ShardKey::Char('a'), &record(1, "a@b.com")).unwrap_err();
        assert!(matches!(err, SinkError::Backend { .. }));
    }
}
