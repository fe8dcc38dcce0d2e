// ABOUTME: Request and result types for a host-key scan
// ABOUTME: ScanRequest normalization, per-host key records, raw process logs

use crate::error::{Result, ScanError};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Top-level JSON key carrying [`ScanResult::error`]
const ERROR_KEY: &str = "error";

/// Hosts and key algorithms to scan.
///
/// Built through [`ScanRequest::new`], which normalizes and validates both
/// lists. Every command built from a request goes through a shell, so hosts
/// and algorithms are restricted to characters that cannot break out of a
/// single word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    hosts: Vec<String>,
    algorithms: Vec<String>,
}

impl ScanRequest {
    /// Normalize and validate a request.
    ///
    /// A single algorithm entry holding commas (`"rsa,ed25519"`) is split
    /// into its parts. Entries are trimmed, blanks dropped, duplicates
    /// removed keeping the first occurrence; algorithms are lower-cased.
    pub fn new<H, A>(hosts: H, algorithms: A) -> Result<Self>
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        let hosts = dedup(hosts.into_iter().map(|h| h.as_ref().trim().to_string()));
        let mut algorithms: Vec<String> = algorithms
            .into_iter()
            .map(|a| a.as_ref().trim().to_ascii_lowercase())
            .collect();
        if algorithms.len() == 1 && algorithms[0].contains(',') {
            let joined = algorithms.remove(0);
            algorithms = joined.split(',').map(|a| a.trim().to_string()).collect();
        }
        let algorithms = dedup(algorithms.into_iter());

        if hosts.is_empty() {
            return Err(ScanError::NoHosts);
        }
        if algorithms.is_empty() {
            return Err(ScanError::NoAlgorithms);
        }
        if let Some(bad) = hosts.iter().find(|h| !is_valid_host(h)) {
            return Err(ScanError::InvalidHost(bad.clone()));
        }
        if let Some(bad) = algorithms.iter().find(|a| !is_valid_algorithm(a)) {
            return Err(ScanError::InvalidAlgorithm(bad.clone()));
        }
        // Hosts share the top level of the JSON result with the raw logs
        // and the error field
        if let Some(bad) = hosts
            .iter()
            .find(|h| h.as_str() == ERROR_KEY || algorithms.contains(*h))
        {
            return Err(ScanError::ReservedHost(bad.clone()));
        }

        Ok(Self { hosts, algorithms })
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn algorithms(&self) -> &[String] {
        &self.algorithms
    }
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// Hostnames, IPv4, IPv6 (optionally bracketed, with zone id).
fn is_valid_host(host: &str) -> bool {
    !host.starts_with('-')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']' | '%'))
}

fn is_valid_algorithm(algorithm: &str) -> bool {
    !algorithm.starts_with('-')
        && algorithm
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '@' | '.'))
}

/// SSH protocol version a key was reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Protocol {
    V1,
    V2,
}

impl From<Protocol> for u8 {
    fn from(protocol: Protocol) -> u8 {
        match protocol {
            Protocol::V1 => 1,
            Protocol::V2 => 2,
        }
    }
}

impl TryFrom<u8> for Protocol {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Protocol::V1),
            2 => Ok(Protocol::V2),
            other => Err(format!("unknown SSH protocol version {other}")),
        }
    }
}

/// Key material found for one host under one requested algorithm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub protocol: Option<Protocol>,
    /// Key type as printed by ssh-keyscan (`ssh-ed25519`, `ecdsa-sha2-nistp256`, `rsa1`)
    pub algorithm_name: String,
    /// Algorithm identifier from the request (`ed25519`, `ecdsa`, `rsa1`)
    pub keytype: String,
    pub bits: Option<String>,
    pub fingerprint: Option<String>,
    /// Base64 key blob; for protocol 1 `"bits exponent modulus"`
    pub public_key: String,
}

/// Everything learned about one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub host: String,
    /// Server banner from the scan's stderr comment line
    pub signature: Option<String>,
    /// Keys by requested algorithm identifier
    pub keys: BTreeMap<String, KeyInfo>,
}

impl HostRecord {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            signature: None,
            keys: BTreeMap::new(),
        }
    }
}

/// Raw diagnostic record of one process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawLogEntry {
    /// Tool exited non-zero; output kept since it may still carry a banner
    Failed {
        stdout: String,
        stderr: String,
        command: String,
        exit_code: i32,
    },
    /// Tool exited zero
    Output { stdout: String, stderr: String },
    /// Tool could not be run at all
    Error { error: String, command: String },
}

/// Aggregated outcome of one scan.
///
/// Serializes as one flat object keyed by host (→ [`HostRecord`]) and by
/// algorithm (→ list of [`RawLogEntry`]), plus `"error"` when the
/// fingerprint phase could not produce anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub hosts: BTreeMap<String, HostRecord>,
    pub raw: BTreeMap<String, Vec<RawLogEntry>>,
    pub error: Option<String>,
}

impl ScanResult {
    /// Empty result with a record for every requested host and a log for
    /// every requested algorithm.
    pub fn new(request: &ScanRequest) -> Self {
        Self {
            hosts: request
                .hosts()
                .iter()
                .map(|h| (h.clone(), HostRecord::new(h.clone())))
                .collect(),
            raw: request
                .algorithms()
                .iter()
                .map(|a| (a.clone(), Vec::new()))
                .collect(),
            error: None,
        }
    }

    /// Get or insert the record for `host`.
    pub fn host_mut(&mut self, host: &str) -> &mut HostRecord {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| HostRecord::new(host))
    }

    /// Get or insert the key record for `(host, algorithm)`.
    pub fn key_mut(&mut self, host: &str, algorithm: &str) -> &mut KeyInfo {
        self.host_mut(host)
            .keys
            .entry(algorithm.to_string())
            .or_insert_with(|| KeyInfo {
                keytype: algorithm.to_string(),
                ..Default::default()
            })
    }

    pub fn key(&self, host: &str, algorithm: &str) -> Option<&KeyInfo> {
        self.hosts.get(host)?.keys.get(algorithm)
    }

    /// Existing key record for `(host, algorithm)`, without inserting.
    pub fn existing_key_mut(&mut self, host: &str, algorithm: &str) -> Option<&mut KeyInfo> {
        self.hosts.get_mut(host)?.keys.get_mut(algorithm)
    }

    pub fn log(&mut self, algorithm: &str, entry: RawLogEntry) {
        self.raw.entry(algorithm.to_string()).or_default().push(entry);
    }
}

impl Serialize for ScanResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.hosts.len() + self.raw.len() + usize::from(self.error.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (host, record) in &self.hosts {
            map.serialize_entry(host, record)?;
        }
        for (algorithm, entries) in &self.raw {
            map.serialize_entry(algorithm, entries)?;
        }
        if let Some(error) = &self.error {
            map.serialize_entry(ERROR_KEY, error)?;
        }
        map.end()
    }
}
