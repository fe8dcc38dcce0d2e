// ABOUTME: Error types for keyscan-core using thiserror.
// ABOUTME: Request/config validation errors and command runner failures.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to callers of the scan engine.
///
/// Everything that goes wrong *during* a scan is recorded as data in the
/// [`ScanResult`](crate::types::ScanResult); these variants cover what is
/// rejected before any process is started.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The request named no hosts after normalization.
    #[error("no hosts given")]
    NoHosts,

    /// The request named no algorithms after normalization.
    #[error("no key algorithms given")]
    NoAlgorithms,

    /// A host contains characters that are unsafe to pass through a shell.
    #[error("invalid host: {0:?}")]
    InvalidHost(String),

    /// An algorithm identifier contains characters outside [a-z0-9-@.].
    #[error("invalid key algorithm: {0:?}")]
    InvalidAlgorithm(String),

    /// A host equals an algorithm name or `error`, which would collide
    /// with another top-level key of the flat JSON result.
    #[error("host {0:?} collides with a result key")]
    ReservedHost(String),

    /// Failed to read a config file.
    #[error("failed to read config from {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a config file.
    #[error("failed to parse config from {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Config parsed but holds an unusable value.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors from running an external command.
///
/// A non-zero exit status is not an error; it comes back inside
/// [`CommandOutput`](crate::runner::CommandOutput).
#[derive(Error, Debug)]
pub enum RunError {
    /// The process could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading output, writing input or waiting on the process failed.
    #[error("I/O error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process outlived the configured timeout and was killed.
    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },
}

/// Result type alias using ScanError.
pub type Result<T> = std::result::Result<T, ScanError>;
