// ABOUTME: Entry point for the keyscan binary.
// ABOUTME: Parses arguments, loads config, runs one scan and prints JSON to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use keyscan_core::{KeyScanner, ScanConfig, ScanRequest};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "keyscan")]
#[command(about = "Collect and fingerprint SSH host keys")]
#[command(version)]
struct Cli {
    /// Hosts (IP addresses or names) to scan
    #[arg(required = true)]
    hosts: Vec<String>,

    /// Key types to scan for: dsa, ecdsa, ed25519, rsa, rsa1
    #[arg(
        short = 't',
        long = "types",
        value_delimiter = ',',
        default_value = "rsa,ecdsa,ed25519"
    )]
    types: Vec<String>,

    /// Config file path
    #[arg(short, long, env = "KEYSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// SSH port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Per-command timeout in seconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,
}

impl Cli {
    fn scan_config(&self) -> Result<ScanConfig> {
        let mut config =
            ScanConfig::load(self.config.as_deref()).context("Failed to load config")?;
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = Some(timeout);
        }
        config.validate().context("Invalid settings")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    keyscan_log::init();

    let config = cli.scan_config()?;
    let request = ScanRequest::new(&cli.hosts, &cli.types).context("Invalid scan request")?;
    tracing::debug!(?config, "Loaded configuration");

    let result = KeyScanner::with_process_runner(config).scan(&request).await;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    }
    .context("Failed to serialize scan result")?;
    println!("{json}");

    Ok(())
}
