//! # Ride Recorder
//!
//! Offline tooling for session logs written by the recording engine.
//!
//! ```text
//! ride-recorder [-c config.toml] export <log> [out.gpx]
//! ride-recorder [-c config.toml] inspect <log>
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ride_recorder::config::{Config, LoggingConfig};
use ride_recorder::export::gpx::track_path;
use ride_recorder::export::GpxExporter;
use ride_recorder::record::decoder::{decode_records, is_whole_records};
use ride_recorder::record::RECORD_SIZE;
use ride_recorder::session::paths::SessionPaths;
use ride_recorder::session::SessionStats;
use ride_recorder::storage::{Filesystem, StdFilesystem};

/// File name prefix for daily rolling log files
const LOG_FILE_PREFIX: &str = "ride-recorder.log";

const USAGE: &str = "usage: ride-recorder [-c config.toml] export <log> [out.gpx]\n       ride-recorder [-c config.toml] inspect <log>";

#[derive(Debug, PartialEq)]
enum Command {
    Export { log: PathBuf, out: Option<PathBuf> },
    Inspect { log: PathBuf },
}

#[derive(Debug, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();
    let mut config = None;

    if args.peek().map(String::as_str) == Some("-c") {
        args.next();
        match args.next() {
            Some(path) => config = Some(PathBuf::from(path)),
            None => bail!("-c needs a path\n{}", USAGE),
        }
    }

    let command = match (args.next().as_deref(), args.next(), args.next()) {
        (Some("export"), Some(log), out) => Command::Export {
            log: PathBuf::from(log),
            out: out.map(PathBuf::from),
        },
        (Some("inspect"), Some(log), None) => Command::Inspect {
            log: PathBuf::from(log),
        },
        _ => bail!(USAGE),
    };

    if args.next().is_some() {
        bail!(USAGE);
    }

    Ok(Args { config, command })
}

/// Set up stdout logging, plus a daily rolling file when configured.
///
/// The returned guard must be held until exit so buffered lines are written.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match &config.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// What `inspect` reports about a log
#[derive(Debug, Serialize)]
struct LogSummary {
    path: String,
    bytes: u64,
    records: usize,
    invalid_records: usize,
    resumable: bool,
    first_time: Option<String>,
    last_time: Option<String>,
    stats: Option<SessionStats>,
}

fn inspect(fs: &dyn Filesystem, paths: &SessionPaths, log: &Path) -> Result<LogSummary> {
    let bytes = fs
        .read(log)
        .with_context(|| format!("cannot read {}", log.display()))?;
    let size = bytes.len() as u64;

    let records = decode_records(&bytes);
    let whole = bytes.len() / RECORD_SIZE;

    let stats_path = paths.stats_path(log);
    let stats = if fs.exists(&stats_path) {
        let raw = fs.read(&stats_path)?;
        Some(SessionStats::from_bytes(&raw)?)
    } else {
        None
    };

    Ok(LogSummary {
        path: log.display().to_string(),
        bytes: size,
        records: records.len(),
        invalid_records: whole - records.len(),
        resumable: is_whole_records(size),
        first_time: records.first().and_then(|r| r.time()).map(|t| t.to_rfc3339()),
        last_time: records.last().and_then(|r| r.time()).map(|t| t.to_rfc3339()),
        stats,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => Config::default(),
    };

    let _guard = init_logging(&config.logging);
    info!("Ride Recorder v{} starting...", env!("CARGO_PKG_VERSION"));

    let fs = StdFilesystem;
    match args.command {
        Command::Export { log, out } => {
            let out = out.unwrap_or_else(|| track_path(&log));
            let written = GpxExporter::from_config(&config.export).export(&fs, &log, &out)?;
            println!("{}", written.display());
        }
        Command::Inspect { log } => {
            let paths = SessionPaths::from_config(&config.storage);
            let summary = inspect(&fs, &paths, &log)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
