use std::path::PathBuf;
use thiserror::Error;

/// Configuration that must be present before the load orders can be built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config key `{0}` is not set (run `linksmith setup`)")]
    MissingKey(&'static str),

    #[error("invalid game root: expected {executable} in {}", .root.display())]
    InvalidGameRoot { root: PathBuf, executable: &'static str },
}

/// Pre-flight refusals. Nothing has been linked or removed when one of these is returned.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(
        "hard links cannot cross volumes: {} and {} are on different devices",
        .base.display(),
        .target.display()
    )]
    CrossVolume { base: PathBuf, target: PathBuf },

    #[error("refusing to use {} as deployment target: it overlaps {}", .target.display(), .overlaps.display())]
    UnsafeTarget { target: PathBuf, overlaps: PathBuf },

    #[error("deployment source does not exist: {}", .0.display())]
    MissingSource(PathBuf),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{tool} is not available on this system")]
    Unavailable { tool: String },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}
