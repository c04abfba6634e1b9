//! Log channels.
//!
//! Everything goes through the `log` facade. The channel is the log target:
//! [`TRACE`] for general progress, [`INSERT_FAIL`] for lines and records that
//! could not be stored, [`FILE`] for per-file extraction progress. The
//! console is driven by `env_logger`; with a log directory each channel is
//! also appended to its own size-rotated file.
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use file_rotate::{ContentLimit, FileRotate, compression::Compression, suffix::AppendCount};
use log::{LevelFilter, Log, Metadata, Record};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};

pub const TRACE: &str = "trace";
pub const INSERT_FAIL: &str = "insert_fail";
pub const FILE: &str = "file";

/// Size at which a channel file is rotated to `<name>.1`.
pub const DEFAULT_MAX_LOG_BYTES: usize = 30_000_000;

/// Console level for a `-v` count.
pub fn console_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// Channel file name for a log target, if the target belongs to a channel.
pub fn channel_file(target: &str) -> Option<&'static str> {
    match target {
        INSERT_FAIL => Some("insert_fail.log"),
        FILE => Some("file.log"),
        TRACE => Some("trace.log"),
        t if t.starts_with("breachdb") => Some("trace.log"),
        _ => None,
    }
}

/// Size-rotated channel file keeping one previous generation.
fn rotating(path: &Path, max_bytes: usize) -> FileRotate<AppendCount> {
    FileRotate::new(
        path,
        AppendCount::new(1),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    )
}

/// Writer for one channel file. The first failed write is reported on
/// stderr, since the background worker drops write errors.
struct ChannelWriter<W> {
    name: &'static str,
    inner: W,
    reported: bool,
}

impl<W: Write> ChannelWriter<W> {
    fn new(name: &'static str, inner: W) -> Self {
        Self {
            name,
            inner,
            reported: false,
        }
    }

    fn report(&mut self, e: &io::Error) {
        if !self.reported {
            self.reported = true;
            eprintln!("breachdb: writing {} failed, entries are lost: {}", self.name, e);
        }
    }
}

impl<W: Write> Write for ChannelWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.write(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.flush() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }
}

/// Format a record the same way for every channel file.
pub fn format_line(record: &Record) -> String {
    let file = record
        .file()
        .and_then(|f| Path::new(f).file_name())
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "?".to_string());
    format!(
        "{} - {}@{} - {}: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
        record.line().unwrap_or(0),
        file,
        record.level(),
        record.args()
    )
}

/// Keeps the channel file workers alive. Dropping it writes out every
/// queued entry.
#[must_use]
pub struct LogGuard {
    _workers: Vec<WorkerGuard>,
}

/// `log` backend fanning records out to the console and channel files.
pub struct ChannelLogger {
    console: env_logger::Logger,
    file_level: LevelFilter,
    files: Vec<(&'static str, NonBlocking)>,
    lost: AtomicBool,
}

impl ChannelLogger {
    pub fn new(
        verbosity: u8,
        log_dir: Option<&Path>,
        max_bytes: usize,
    ) -> Result<(Self, LogGuard)> {
        let console = env_logger::Builder::from_default_env()
            .filter_level(console_level(verbosity))
            .filter_module("sqlx", LevelFilter::Warn)
            .build();
        let mut files = Vec::new();
        let mut workers = Vec::new();
        if let Some(dir) = log_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
            for name in ["trace.log", "insert_fail.log", "file.log"] {
                let path = dir.join(name);
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("open log file {}", path.display()))?;
                let writer = ChannelWriter::new(name, rotating(&path, max_bytes));
                let (non_blocking, guard) = NonBlockingBuilder::default()
                    .lossy(false)
                    .thread_name("breachdb-log")
                    .finish(writer);
                files.push((name, non_blocking));
                workers.push(guard);
            }
        }
        let logger = Self {
            console,
            file_level: LevelFilter::Info,
            files,
            lost: AtomicBool::new(false),
        };
        Ok((logger, LogGuard { _workers: workers }))
    }

    /// Most verbose level any destination accepts.
    pub fn max_level(&self) -> LevelFilter {
        if self.files.is_empty() {
            self.console.filter()
        } else {
            self.console.filter().max(self.file_level)
        }
    }

    fn channel(&self, target: &str) -> Option<&NonBlocking> {
        let name = channel_file(target)?;
        self.files.iter().find(|(n, _)| *n == name).map(|(_, f)| f)
    }
}

impl Log for ChannelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata)
            || (metadata.level() <= self.file_level && self.channel(metadata.target()).is_some())
    }

    fn log(&self, record: &Record) {
        if self.console.matches(record) {
            self.console.log(record);
        }
        if record.level() > self.file_level {
            return;
        }
        if let Some(file) = self.channel(record.target()) {
            let mut line = format_line(record);
            line.push('\n');
            if let Err(e) = file.clone().write_all(line.as_bytes()) {
                if !self.lost.swap(true, Ordering::Relaxed) {
                    eprintln!("breachdb: log worker stopped, entries are lost: {}", e);
                }
            }
        }
    }

    /// Channel files are written out when the [`LogGuard`] is dropped.
    fn flush(&self) {
        self.console.flush();
    }
}

/// Install the channel logger as the global `log` backend. Hold the returned
/// guard until the run is over.
pub fn init(verbosity: u8, log_dir: Option<&Path>) -> Result<LogGuard> {
    let (logger, guard) = ChannelLogger::new(verbosity, log_dir, DEFAULT_MAX_LOG_BYTES)?;
    let max = logger.max_level();
    log::set_boxed_logger(Box::new(logger)).context("logger already installed")?;
    log::set_max_level(max);
    Ok(guard)
}
