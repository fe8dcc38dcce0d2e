// ABOUTME: Scan orchestrator - one ssh-keyscan per algorithm, then one ssh-keygen
// ABOUTME: Runs scans concurrently, waits for all of them, merges fingerprints

use crate::config::ScanConfig;
use crate::error::{Result, RunError};
use crate::fingerprint::merge_fingerprints;
use crate::runner::{CommandOutput, CommandRunner, ProcessRunner};
use crate::scan_output::parse_scan_output;
use crate::types::{RawLogEntry, ScanRequest, ScanResult};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::Instrument;

/// Top-level error when no scan produced a single key line
pub const NO_FINGERPRINT: &str = "Got no fingerprint";

/// Where a scan is in its lifecycle. There is no failure phase: every
/// failure ends up as data in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Scanning { pending: usize },
    Fingerprinting,
    Done,
}

/// Finished run of ssh-keyscan for one algorithm
struct AlgorithmScan {
    algorithm: String,
    command: String,
    outcome: std::result::Result<CommandOutput, RunError>,
}

/// Mutable state of one scan, owned by the driving task.
struct ScanState {
    result: ScanResult,
    /// Key lines from every algorithm, fed to `ssh-keygen -lf -`
    fingerprint_input: String,
    phase: Phase,
    port: u16,
}

impl ScanState {
    fn new(request: &ScanRequest, port: u16) -> Self {
        Self {
            result: ScanResult::new(request),
            fingerprint_input: String::new(),
            phase: Phase::Scanning {
                pending: request.algorithms().len(),
            },
            port,
        }
    }

    /// Record one finished algorithm scan. Returns true when it was the
    /// last one pending.
    fn complete(&mut self, scan: AlgorithmScan) -> bool {
        let AlgorithmScan {
            algorithm,
            command,
            outcome,
        } = scan;

        match outcome {
            Ok(output) if output.success() => {
                self.result.log(
                    &algorithm,
                    RawLogEntry::Output {
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    },
                );
                let parsed =
                    parse_scan_output(&algorithm, self.port, &output.stdout, &output.stderr);
                tracing::debug!(
                    algorithm = %algorithm,
                    keys = parsed.keys.len(),
                    skipped = parsed.skipped,
                    "Parsed scan output"
                );
                parsed.apply_to(&algorithm, &mut self.result);
                self.fingerprint_input.push_str(&parsed.fingerprint_input);
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                tracing::warn!(
                    algorithm = %algorithm,
                    exit_code = output.exit_code,
                    "Key scan exited with failure"
                );
                self.result.log(
                    &algorithm,
                    RawLogEntry::Failed {
                        command: format!(
                            "Running {} failed with {}: {}",
                            command, output.exit_code, stderr
                        ),
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                        stderr,
                        exit_code: output.exit_code,
                    },
                );
            }
            Err(e) => {
                tracing::error!(algorithm = %algorithm, error = %e, "Failed to run key scan");
                self.result.log(
                    &algorithm,
                    RawLogEntry::Error {
                        error: e.to_string(),
                        command,
                    },
                );
            }
        }

        let last = match &mut self.phase {
            Phase::Scanning { pending } => {
                *pending = pending.saturating_sub(1);
                *pending == 0
            }
            other => {
                tracing::warn!(phase = ?other, algorithm = %algorithm, "Scan finished after barrier");
                false
            }
        };
        if last {
            self.transition(Phase::Fingerprinting);
        }
        last
    }

    fn transition(&mut self, next: Phase) {
        tracing::debug!(from = ?self.phase, to = ?next, "Scan phase change");
        self.phase = next;
    }
}

/// Scans hosts for SSH host keys and fingerprints them.
///
/// Each [`scan`](KeyScanner::scan) call builds fresh state, so one scanner
/// can serve any number of concurrent scans.
#[derive(Clone)]
pub struct KeyScanner {
    config: ScanConfig,
    runner: Arc<dyn CommandRunner>,
}

impl KeyScanner {
    pub fn new(config: ScanConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Scanner running real processes as set up in `config`
    pub fn with_process_runner(config: ScanConfig) -> Self {
        let runner = Arc::new(ProcessRunner::from_config(&config));
        Self::new(config, runner)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Validate raw hosts/types (a lone comma-joined type is split) and scan.
    pub async fn key_scan<H, A>(&self, hosts: H, types: A) -> Result<ScanResult>
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        let request = ScanRequest::new(hosts, types)?;
        Ok(self.scan(&request).await)
    }

    /// Run the scan. Always completes with a result; failures of single
    /// algorithms or of the fingerprint step are recorded inside it.
    pub async fn scan(&self, request: &ScanRequest) -> ScanResult {
        let scan_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("keyscan", %scan_id);
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &ScanRequest) -> ScanResult {
        tracing::info!(
            hosts = request.hosts().len(),
            algorithms = ?request.algorithms(),
            "Starting key scan"
        );
        let mut state = ScanState::new(request, self.config.port);

        let mut scans: FuturesUnordered<_> = request
            .algorithms()
            .iter()
            .map(|algorithm| self.scan_algorithm(algorithm, request.hosts()))
            .collect();

        // Completions are applied one at a time, in whatever order the
        // processes finish; fingerprinting waits for all of them.
        while let Some(scan) = scans.next().await {
            if state.complete(scan) {
                break;
            }
        }

        self.fingerprint(&mut state).await;
        state.transition(Phase::Done);

        tracing::info!(
            keys = state.result.hosts.values().map(|h| h.keys.len()).sum::<usize>(),
            error = ?state.result.error,
            "Key scan finished"
        );
        state.result
    }

    async fn scan_algorithm(&self, algorithm: &str, hosts: &[String]) -> AlgorithmScan {
        let command = self.config.keyscan_command(algorithm, hosts);
        tracing::info!(algorithm = %algorithm, command = %command, "Running key scan");
        let outcome = self.runner.run(&command, None).await;
        AlgorithmScan {
            algorithm: algorithm.to_string(),
            command,
            outcome,
        }
    }

    async fn fingerprint(&self, state: &mut ScanState) {
        if state.fingerprint_input.is_empty() {
            tracing::warn!("No key lines to fingerprint");
            state.result.error = Some(NO_FINGERPRINT.to_string());
            return;
        }

        let command = self.config.fingerprint_command();
        tracing::debug!(command = %command, "Computing fingerprints");
        match self
            .runner
            .run(&command, Some(state.fingerprint_input.as_bytes()))
            .await
        {
            Ok(output) if output.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let merged = merge_fingerprints(&stdout, state.port, &mut state.result);
                tracing::debug!(merged, "Merged fingerprints");
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                tracing::error!(exit_code = output.exit_code, stderr = %stderr, "Fingerprinting failed");
                state.result.error = Some(format!(
                    "Running {} failed with {}: {}",
                    command,
                    output.exit_code,
                    stderr.trim_end()
                ));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to run fingerprinting");
                state.result.error = Some(e.to_string());
            }
        }
    }
}
