//! `tracing` setup: a console layer on stderr plus an optional log file.
//!
//! `RUST_LOG` replaces the console filter when set; the file always records
//! at debug or the console level, whichever is more verbose.

use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "linksmith.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
}

impl Verbosity {
    /// Maps `-q` and the number of `-v` flags to a level.
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, 0) => Verbosity::Normal,
            (false, 1) => Verbosity::Verbose,
            (false, _) => Verbosity::Debug,
        }
    }

    pub fn filter_directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Debug => "trace",
        }
    }

    fn file_directive(self) -> &'static str {
        self.max(Verbosity::Verbose).filter_directive()
    }
}

/// Flushes the file writer when dropped. Keep it alive for the whole run.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init(verbosity: Verbosity, log_dir: Option<&Path>) -> Result<LogGuard> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(console_filter);

    let (file_layer, file_guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("create log dir {}", dir.display()))?;
            let path = dir.join(LOG_FILE_NAME);
            let file = fs::File::create(&path)
                .with_context(|| format!("create log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(EnvFilter::new(verbosity.file_directive()));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}
