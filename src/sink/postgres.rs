//! PostgreSQL backend.
//!
//! Tables live in one schema (default `breachcompilation`) and are named after
//! their shard. A single connection is driven from a private current-thread
//! tokio runtime so the rest of the pipeline stays synchronous.
use log::info;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tokio::runtime::Runtime;

use super::{RecordSink, ShardSchema, SinkError, create_table_sql, insert_sql, quote_ident};
use crate::credential::HashedRecord;
use crate::logging::TRACE;
use crate::shard::ShardKey;

pub const DEFAULT_SCHEMA: &str = "breachcompilation";

#[derive(Debug, Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub schema: String,
}

pub struct PostgresSink {
    runtime: Runtime,
    conn: PgConnection,
    schema: String,
    insert_sql: Vec<String>,
}

impl PostgresSink {
    pub fn connect(config: &PgConfig) -> Result<Self, SinkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SinkError::Connect(e.to_string()))?;
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.dbname);
        let conn = runtime
            .block_on(PgConnection::connect_with(&options))
            .map_err(|e| SinkError::Connect(e.to_string()))?;
        info!(
            target: TRACE,
            "connected to postgresql database {} at {}:{}",
            config.dbname,
            config.host,
            config.port
        );
        let inserts = ShardKey::all()
            .map(|s| insert_sql(&table(&config.schema, s)))
            .collect();
        Ok(Self {
            runtime,
            conn,
            schema: config.schema.clone(),
            insert_sql: inserts,
        })
    }
}

fn table(schema: &str, shard: ShardKey) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(&shard.table_name()))
}

fn write_error(shard: ShardKey, e: sqlx::Error) -> SinkError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => SinkError::Rejected {
            shard,
            reason: db.message().to_string(),
        },
        _ => SinkError::Backend {
            shard,
            reason: e.to_string(),
        },
    }
}

impl ShardSchema for PostgresSink {
    fn create_tables(&mut self) -> Result<(), SinkError> {
        info!(target: TRACE, "create schema/tables for credentials in {}", self.schema);
        let schema_sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&self.schema));
        self.runtime
            .block_on(sqlx::query(&schema_sql).execute(&mut self.conn))
            .map_err(|e| SinkError::Schema(e.to_string()))?;
        for shard in ShardKey::all() {
            let ddl = create_table_sql(&table(&self.schema, shard));
            self.runtime
                .block_on(sqlx::query(&ddl).execute(&mut self.conn))
                .map_err(|e| SinkError::Schema(format!("{}: {}", shard, e)))?;
        }
        Ok(())
    }

    fn max_sequence_id(&mut self) -> Result<u64, SinkError> {
        let mut max = 0u64;
        for shard in ShardKey::all() {
            let sql = format!(
                "SELECT COALESCE(MAX(sequence_id), 0) FROM {}",
                table(&self.schema, shard)
            );
            let id: i64 = self
                .runtime
                .block_on(sqlx::query_scalar::<_, i64>(&sql).fetch_one(&mut self.conn))
                .map_err(|e| SinkError::Schema(format!("{}: {}", shard, e)))?;
            max = max.max(id.max(0) as u64);
        }
        Ok(max)
    }
}

impl RecordSink for PostgresSink {
    fn insert(&mut self, shard: ShardKey, record: &HashedRecord) -> Result<(), SinkError> {
        let id = i64::try_from(record.sequence_id).map_err(|e| SinkError::Rejected {
            shard,
            reason: e.to_string(),
        })?;
        let query = sqlx::query(&self.insert_sql[shard.index()])
            .bind(id)
            .bind(record.email.as_str())
            .bind(record.password.as_str())
            .bind(record.username.as_str())
            .bind(record.provider.as_str())
            .bind(record.sha1.as_str())
            .bind(record.sha256.as_str())
            .bind(record.sha512.as_str())
            .bind(record.md5.as_str());
        self.runtime
            .block_on(query.execute(&mut self.conn))
            .map(|_| ())
            .map_err(|e| write_error(shard, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_schema_qualified_and_quoted() {
        assert_eq!(
            table(DEFAULT_SCHEMA, ShardKey::Char('a')),
            "\"breachcompilation\".\"a\""
        );
        assert_eq!(
            table(DEFAULT_SCHEMA, ShardKey::Symbols),
            "\"breachcompilation\".\"symbols\""
        );
    }

    #[test]
    fn unreachable_server_is_a_connect_error() {
        let cfg = PgConfig {
            host: "127.0.0.1".into(),
            port: 1,
            user: "nobody".into(),
            password: "nothing".into(),
            dbname: "none".into(),
            schema: DEFAULT_SCHEMA.into(),
        };
        assert!(matches!(
            PostgresSink::connect(&cfg),
            Err(SinkError::Connect(_))
        ));
    }
}
