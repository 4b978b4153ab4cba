//! Execution log files and tracing setup.
//!
//! Every invocation writes a full debug log to its own file under the data
//! directory; the console only carries operator-facing output unless
//! `--debug` is given. Old log files are pruned so the directory stays
//! bounded.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log files kept per invocation history.
const MAX_LOG_FILES: usize = 10;

/// Create a fresh log file for this invocation and prune old ones.
pub fn prepare_logfile(logs_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(logs_dir)?;

    let name = format!("cairn-{}.log", Local::now().format("%Y%m%d-%H%M%S%.6f"));
    let path = logs_dir.join(name);
    File::create(&path)?;

    prune_old_logs(logs_dir)?;
    Ok(path)
}

fn prune_old_logs(logs_dir: &Path) -> io::Result<()> {
    let mut logs: Vec<PathBuf> = fs::read_dir(logs_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().map(|e| e == "log").unwrap_or(false)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("cairn-"))
                    .unwrap_or(false)
        })
        .collect();

    // Timestamped names sort chronologically.
    logs.sort();
    while logs.len() > MAX_LOG_FILES {
        let oldest = logs.remove(0);
        fs::remove_file(oldest)?;
    }
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// The log file captures the full debug stream unconditionally, without
/// ANSI codes. Console tracing stays off unless `--debug` is given (debug
/// level) or `RUST_LOG` selects a filter.
pub fn init_tracing(debug: bool, logfile: Option<PathBuf>) {
    let file_layer = logfile.and_then(|path| File::create(path).ok()).map(|file| {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(EnvFilter::new("cairn=debug"))
    });

    let console_filter = if debug {
        Some(EnvFilter::new("cairn=debug"))
    } else {
        EnvFilter::try_from_default_env().ok()
    };
    let console_layer = console_filter.map(|filter| {
        fmt::layer()
            .with_target(false)
            .with_writer(io::stderr)
            .with_filter(filter)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();
}
