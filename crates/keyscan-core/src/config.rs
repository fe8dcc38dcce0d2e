// ABOUTME: Configuration loading for the keyscan engine
// ABOUTME: TOML config file with defaults matching a stock OpenSSH install

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Scan engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// SSH port probed on every host
    pub port: u16,
    /// ssh-keyscan binary (name or path)
    pub keyscan_binary: String,
    /// ssh-keygen binary (name or path)
    pub keygen_binary: String,
    /// Shell used to run commands (`<shell> -c <command>`)
    pub shell: String,
    /// Per-command timeout in seconds; unset means wait forever
    pub timeout_secs: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port: 22,
            keyscan_binary: "ssh-keyscan".to_string(),
            keygen_binary: "ssh-keygen".to_string(),
            shell: "/bin/sh".to_string(),
            timeout_secs: None,
        }
    }
}

impl ScanConfig {
    /// Get the config directory for keyscan (~/.config/keyscan)
    pub fn config_dir() -> PathBuf {
        // Respect XDG_CONFIG_HOME if set, otherwise use ~/.config
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|p| p.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join("keyscan")
    }

    /// Default config file path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default path is used
    /// when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    tracing::debug!(path = %path.display(), "No config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load and validate configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ScanError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ScanError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ScanError::Config("port must be non-zero".into()));
        }
        if self.keyscan_binary.trim().is_empty() {
            return Err(ScanError::Config("keyscan_binary is required".into()));
        }
        if self.keygen_binary.trim().is_empty() {
            return Err(ScanError::Config("keygen_binary is required".into()));
        }
        if self.shell.trim().is_empty() {
            return Err(ScanError::Config("shell is required".into()));
        }
        if self.timeout_secs == Some(0) {
            return Err(ScanError::Config(
                "timeout_secs must be positive (omit it to disable)".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Command line for one per-algorithm scan. `exec` makes the tool
    /// replace the shell instead of running under it.
    pub fn keyscan_command(&self, algorithm: &str, hosts: &[String]) -> String {
        format!(
            "exec {} -p {} -t {} {}",
            self.keyscan_binary,
            self.port,
            algorithm,
            hosts.join(" ")
        )
    }

    /// Command line for the batch fingerprint step (keys on stdin)
    pub fn fingerprint_command(&self) -> String {
        format!("{} -lf -", self.keygen_binary)
    }
}
