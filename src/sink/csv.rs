//! CSV backend: one `<shard>.csv` per shard in an output directory, ready
//! for bulk loading with `COPY ... FROM ... CSV HEADER`.
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use log::info;

use super::{COLUMNS, RecordSink, ShardSchema, SinkError};
use crate::credential::HashedRecord;
use crate::logging::TRACE;
use crate::shard::{SHARD_COUNT, ShardKey};

/// Encode one row. Rows go to the shard file with a single write, so a
/// record is either on disk or reported as failed.
fn encode_row<F>(fill: F) -> Result<Vec<u8>, String>
where
    F: FnOnce(&mut Writer<Vec<u8>>) -> csv::Result<()>,
{
    let mut w = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    fill(&mut w).map_err(|e| e.to_string())?;
    w.into_inner().map_err(|e| e.to_string())
}

pub struct CsvSink {
    dir: PathBuf,
    files: Vec<Option<File>>,
}

impl CsvSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: (0..SHARD_COUNT).map(|_| None).collect(),
        }
    }

    pub fn shard_path(&self, shard: ShardKey) -> PathBuf {
        self.dir.join(format!("{}.csv", shard.table_name()))
    }

    fn file(&mut self, shard: ShardKey) -> Result<&mut File, SinkError> {
        let path = self.shard_path(shard);
        let slot = &mut self.files[shard.index()];
        if slot.is_none() {
            let fresh = !path.exists();
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| SinkError::Backend {
                    shard,
                    reason: format!("open {}: {}", path.display(), e),
                })?;
            if fresh {
                let header = encode_row(|w| w.write_record(COLUMNS))
                    .map_err(|reason| SinkError::Backend { shard, reason })?;
                file.write_all(&header).map_err(|e| SinkError::Backend {
                    shard,
                    reason: e.to_string(),
                })?;
            }
            *slot = Some(file);
        }
        slot.as_mut().ok_or_else(|| SinkError::Backend {
            shard,
            reason: "file unavailable".to_string(),
        })
    }
}

impl ShardSchema for CsvSink {
    fn create_tables(&mut self) -> Result<(), SinkError> {
        info!(target: TRACE, "create shard files in {}", self.dir.display());
        fs::create_dir_all(&self.dir).map_err(|e| SinkError::Schema(e.to_string()))?;
        for shard in ShardKey::all() {
            let path = self.shard_path(shard);
            if path.exists() {
                continue;
            }
            let mut w = Writer::from_path(&path)
                .map_err(|e| SinkError::Schema(format!("{}: {}", path.display(), e)))?;
            w.write_record(COLUMNS)
                .and_then(|_| w.flush().map_err(csv::Error::from))
                .map_err(|e| SinkError::Schema(format!("{}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    fn max_sequence_id(&mut self) -> Result<u64, SinkError> {
        let mut max = 0u64;
        for shard in ShardKey::all() {
            let path = self.shard_path(shard);
            if !path.exists() {
                continue;
            }
            let mut rdr = csv::Reader::from_path(&path)
                .map_err(|e| SinkError::Schema(format!("{}: {}", path.display(), e)))?;
            for row in rdr.records() {
                let row = row.map_err(|e| SinkError::Schema(format!("{}: {}", path.display(), e)))?;
                if let Some(id) = row.get(0).and_then(|s| s.parse::<u64>().ok()) {
                    max = max.max(id);
                }
            }
        }
        Ok(max)
    }
}

impl RecordSink for CsvSink {
    fn insert(&mut self, shard: ShardKey, record: &HashedRecord) -> Result<(), SinkError> {
        let row = encode_row(|w| w.serialize(record))
            .map_err(|reason| SinkError::Backend { shard, reason })?;
        let file = self.file(shard)?;
        file.write_all(&row).map_err(|e| SinkError::Backend {
            shard,
            reason: e.to_string(),
        })
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        for (shard, file) in ShardKey::all().zip(self.files.iter_mut()) {
            if let Some(file) = file {
                file.flush().map_err(|e| SinkError::Backend {
                    shard,
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }
}
