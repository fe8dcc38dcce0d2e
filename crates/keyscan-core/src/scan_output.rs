// ABOUTME: Parser for ssh-keyscan output (one invocation per key algorithm)
// ABOUTME: Reads protocol 1/2 key lines from stdout and banner comments from stderr

use crate::types::{Protocol, ScanResult};

/// ssh-keyscan prints this when a host has no key of the requested type
const NO_HOSTKEY_ALG: &str = "no hostkey alg";

/// Algorithm identifier of SSH protocol 1 RSA keys
pub const RSA1: &str = "rsa1";

/// A key line recognized in scan stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub host: String,
    pub protocol: Protocol,
    pub algorithm_name: String,
    pub public_key: String,
}

/// A `# host:port banner` comment from scan stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub host: String,
    pub signature: String,
}

/// Everything extracted from one per-algorithm scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    pub keys: Vec<ParsedKey>,
    pub signatures: Vec<Signature>,
    /// Parsed key lines verbatim, newline terminated, for `ssh-keygen -lf -`
    pub fingerprint_input: String,
    /// Stdout lines that matched no known shape or were not UTF-8
    pub skipped: usize,
}

impl ScanOutput {
    /// Merge into the aggregated result under `algorithm`.
    pub fn apply_to(&self, algorithm: &str, result: &mut ScanResult) {
        for sig in &self.signatures {
            result.host_mut(&sig.host).signature = Some(sig.signature.clone());
        }
        for key in &self.keys {
            let info = result.key_mut(&key.host, algorithm);
            info.protocol = Some(key.protocol);
            info.algorithm_name = key.algorithm_name.clone();
            info.public_key = key.public_key.clone();
            info.keytype = algorithm.to_string();
        }
    }
}

/// Split on `\n` or `\r\n`, dropping empty lines.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
}

/// Byte-level [`split_lines`], so one bad line cannot spoil the rest.
fn split_byte_lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
}

/// Off port 22 OpenSSH names hosts `[host]:port`; map that back to `host`.
pub fn bare_host(host: &str, port: u16) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(format!("]:{port}").as_str()))
        .unwrap_or(host)
}

/// Parse the output of `ssh-keyscan -p <port> -t <algorithm> ...`.
///
/// Works line by line: lines that are not UTF-8 or match no known shape
/// are dropped (stdout ones counted in [`ScanOutput::skipped`]) without
/// affecting their neighbours.
pub fn parse_scan_output(algorithm: &str, port: u16, stdout: &[u8], stderr: &[u8]) -> ScanOutput {
    let mut output = ScanOutput::default();

    let port_suffix = format!(":{port}");
    for raw in split_byte_lines(stderr) {
        match std::str::from_utf8(raw) {
            Ok(line) => {
                if let Some(sig) = parse_signature_line(line, &port_suffix) {
                    output.signatures.push(sig);
                }
            }
            Err(e) => {
                tracing::debug!(algorithm = %algorithm, error = %e, "Skipping non-UTF-8 stderr line");
            }
        }
    }

    for raw in split_byte_lines(stdout) {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(algorithm = %algorithm, error = %e, "Skipping non-UTF-8 scan line");
                output.skipped += 1;
                continue;
            }
        };

        if line.trim() == NO_HOSTKEY_ALG {
            tracing::debug!(algorithm = %algorithm, "Host has no key for algorithm");
            continue;
        }

        let parsed = if algorithm == RSA1 {
            parse_protocol1_line(line, port).or_else(|| parse_protocol2_line(line, port))
        } else {
            parse_protocol2_line(line, port)
        };

        match parsed {
            Some(key) => {
                tracing::debug!(algorithm = %algorithm, host = %key.host, protocol = ?key.protocol, "Parsed key line");
                output.fingerprint_input.push_str(line);
                output.fingerprint_input.push('\n');
                output.keys.push(key);
            }
            None => {
                tracing::debug!(algorithm = %algorithm, line = %line, "Skipping unrecognized scan line");
                output.skipped += 1;
            }
        }
    }

    output
}

/// `# 10.0.0.1:22 SSH-2.0-OpenSSH_8.9`
fn parse_signature_line(line: &str, port_suffix: &str) -> Option<Signature> {
    if !line.starts_with('#') {
        return None;
    }
    let (host_port, signature) = line.get(2..)?.split_once(' ')?;
    let host = host_port.strip_suffix(port_suffix).unwrap_or(host_port);
    Some(Signature {
        host: host.to_string(),
        signature: signature.to_string(),
    })
}

/// Protocol 1: `host bits exponent modulus`
fn parse_protocol1_line(line: &str, port: u16) -> Option<ParsedKey> {
    let parts: Vec<&str> = line.split(' ').collect();
    let [host, bits, exponent, modulus] = parts.as_slice() else {
        return None;
    };
    Some(ParsedKey {
        host: bare_host(host, port).to_string(),
        protocol: Protocol::V1,
        algorithm_name: RSA1.to_string(),
        public_key: [*bits, *exponent, *modulus].join(" "),
    })
}

/// Protocol 2: `host keytype base64-key`
fn parse_protocol2_line(line: &str, port: u16) -> Option<ParsedKey> {
    let parts: Vec<&str> = line.split(' ').collect();
    let [host, algorithm_name, public_key] = parts.as_slice() else {
        return None;
    };
    Some(ParsedKey {
        host: bare_host(host, port).to_string(),
        protocol: Protocol::V2,
        algorithm_name: algorithm_name.to_string(),
        public_key: public_key.to_string(),
    })
}
