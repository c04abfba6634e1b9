//! CLI entrypoint for `breachdb`.
//!
//! Parses command-line arguments (each also readable from a `BREACHDB_*`
//! environment variable), installs the log channels, opens the selected
//! record sink, creates the shard tables and walks the compilation's `data`
//! directory. A summary is printed at the end unless `--quiet` is given.
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, ValueEnum};
use log::{error, info};

use breachdb::{
    engine::{
        DEFAULT_PRINT_EVERY, DEFAULT_PROGRESS_EVERY, DEFAULT_QUEUE_DEPTH, Engine, IngestOptions,
    },
    io::DEFAULT_MMAP_THRESHOLD_BYTES,
    logging::{self, TRACE},
    report::render_summary,
    walker::WalkError,
    sink::{
        CsvSink, PgConfig, PostgresSink, RecordSink, ShardSchema, SqliteSink,
        postgres::DEFAULT_SCHEMA,
    },
};

#[derive(Parser, Debug)]
#[command(
    name = "breachdb",
    version,
    about = "Insert BreachCompilation credentials into a sharded database"
)]
struct Args {
    /// Root of the compilation; must contain a `data` directory
    #[arg(long = "path", env = "BREACHDB_PATH")]
    path: PathBuf,

    /// Where records are stored
    #[arg(long = "backend", value_enum, env = "BREACHDB_BACKEND", default_value_t = Backend::Postgres)]
    backend: Backend,

    /// PostgreSQL host
    #[arg(long = "host", env = "BREACHDB_HOST")]
    host: Option<String>,

    /// PostgreSQL port
    #[arg(long = "port", env = "BREACHDB_PORT")]
    port: Option<u16>,

    /// PostgreSQL user
    #[arg(long = "user", env = "BREACHDB_USER")]
    user: Option<String>,

    /// PostgreSQL password
    #[arg(long = "password", env = "BREACHDB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// PostgreSQL database name
    #[arg(long = "dbname", env = "BREACHDB_DBNAME")]
    dbname: Option<String>,

    /// PostgreSQL schema holding the shard tables
    #[arg(long = "schema", env = "BREACHDB_SCHEMA", default_value = DEFAULT_SCHEMA)]
    schema: String,

    /// SQLite database file (sqlite backend)
    #[arg(long = "database", env = "BREACHDB_DATABASE")]
    database: Option<PathBuf>,

    /// Output directory for per-shard CSV files (csv backend)
    #[arg(long = "out-dir", env = "BREACHDB_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Directory for trace.log, insert_fail.log and file.log
    #[arg(long = "log-dir", env = "BREACHDB_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Extract files on a worker pool feeding a single writer
    #[arg(long = "parallel")]
    parallel: bool,

    /// Records buffered between workers and the writer in parallel mode
    #[arg(long = "queue-depth", default_value_t = DEFAULT_QUEUE_DEPTH)]
    queue_depth: usize,

    /// Override mmap threshold in bytes. If zero, disable mmap.
    #[arg(long = "mmap-threshold", default_value_t = DEFAULT_MMAP_THRESHOLD_BYTES)]
    mmap_threshold: u64,

    /// Log every Nth sequence id to the trace channel (0 disables)
    #[arg(long = "progress-every", default_value_t = DEFAULT_PROGRESS_EVERY)]
    progress_every: u64,

    /// Print every Nth stored record to stdout (0 disables)
    #[arg(long = "print-every", default_value_t = DEFAULT_PRINT_EVERY)]
    print_every: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Control color output (auto, always, never)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Suppress summary output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Postgres,
    Sqlite,
    Csv,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

/// Exit with a clap usage error naming the missing flags.
fn missing(flags: &[&str]) -> ! {
    Args::command()
        .error(
            ErrorKind::MissingRequiredArgument,
            format!("missing required arguments: {}", flags.join(", ")),
        )
        .exit()
}

fn postgres_config(args: &Args) -> PgConfig {
    let mut absent = Vec::new();
    if args.host.is_none() {
        absent.push("--host");
    }
    if args.port.is_none() {
        absent.push("--port");
    }
    if args.user.is_none() {
        absent.push("--user");
    }
    if args.password.is_none() {
        absent.push("--password");
    }
    if args.dbname.is_none() {
        absent.push("--dbname");
    }
    match (&args.host, args.port, &args.user, &args.password, &args.dbname) {
        (Some(host), Some(port), Some(user), Some(password), Some(dbname)) => PgConfig {
            host: host.clone(),
            port,
            user: user.clone(),
            password: password.clone(),
            dbname: dbname.clone(),
            schema: args.schema.clone(),
        },
        _ => missing(&absent),
    }
}

fn run<S: ShardSchema + RecordSink>(sink: S, args: &Args) -> i32 {
    let options = IngestOptions {
        parallel: args.parallel,
        mmap_threshold_bytes: if args.mmap_threshold == 0 {
            u64::MAX
        } else {
            args.mmap_threshold
        },
        progress_every: args.progress_every,
        print_every: args.print_every,
        queue_depth: args.queue_depth,
    };
    let mut engine = Engine::new(sink, options);
    if let Err(e) = engine.prepare() {
        error!(target: TRACE, "{}", e);
        return 3;
    }
    match engine.ingest_root(&args.path) {
        Ok(()) => {}
        Err(e @ WalkError::MissingDataDir(_)) => {
            println!("{}", e);
            info!(target: TRACE, "{}", e);
        }
        Err(e) => {
            error!(target: TRACE, "{}", e);
            return 4;
        }
    }
    if let Err(e) = engine.flush() {
        error!(target: TRACE, "{}", e);
        return 4;
    }
    if !args.quiet {
        println!("{}", render_summary(engine.stats()));
    }
    0
}

fn main() {
    let args = Args::parse();
    let log_guard = match logging::init(args.verbose, args.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to set up logging: {:#}", e);
            std::process::exit(2);
        }
    };
    match args.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {}
    }

    let code = match args.backend {
        Backend::Postgres => {
            let config = postgres_config(&args);
            match PostgresSink::connect(&config) {
                Ok(sink) => run(sink, &args),
                Err(e) => {
                    error!(target: TRACE, "{}", e);
                    3
                }
            }
        }
        Backend::Sqlite => {
            let Some(path) = args.database.clone() else {
                missing(&["--database"]);
            };
            match SqliteSink::open(&path) {
                Ok(sink) => run(sink, &args),
                Err(e) => {
                    error!(target: TRACE, "{}", e);
                    3
                }
            }
        }
        Backend::Csv => {
            let Some(dir) = args.out_dir.clone() else {
                missing(&["--out-dir"]);
            };
            run(CsvSink::new(dir), &args)
        }
    };
    log::logger().flush();
    drop(log_guard);
    if code != 0 {
        std::process::exit(code);
    }
}
