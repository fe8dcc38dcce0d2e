// ABOUTME: Core library for keyscan - SSH host-key scanning and fingerprinting
// ABOUTME: Shared by the keyscan CLI and anything embedding the scan engine

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod runner;
pub mod scan_output;
pub mod scanner;
pub mod types;

pub use config::ScanConfig;
pub use error::{Result, RunError, ScanError};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use scanner::{KeyScanner, NO_FINGERPRINT};
pub use types::{HostRecord, KeyInfo, Protocol, RawLogEntry, ScanRequest, ScanResult};
