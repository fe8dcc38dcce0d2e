// ABOUTME: Parser for `ssh-keygen -lf -` fingerprint reports
// ABOUTME: Merges bits and fingerprint back into keys found by the scan phase

use crate::scan_output::{bare_host, split_lines};
use crate::types::ScanResult;

/// One line of `ssh-keygen -l` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintLine {
    pub bits: String,
    pub fingerprint: String,
    pub host: String,
    /// Lower-cased key type, e.g. `ed25519` from `(ED25519)`
    pub algorithm: String,
}

/// Parse `<bits> <fingerprint> <host> (<TYPE>)` lines. Lines with any
/// other number of space-separated fields are dropped.
pub fn parse_fingerprints(output: &str) -> Vec<FingerprintLine> {
    split_lines(output)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(' ').collect();
            let [bits, fingerprint, host, kind] = parts.as_slice() else {
                return None;
            };
            let kind: &str = kind;
            let kind = kind.strip_prefix('(').unwrap_or(kind);
            let kind = kind.strip_suffix(')').unwrap_or(kind);
            Some(FingerprintLine {
                bits: bits.to_string(),
                fingerprint: fingerprint.to_string(),
                host: host.to_string(),
                algorithm: kind.to_lowercase(),
            })
        })
        .collect()
}

/// Fill `bits`/`fingerprint` on the matching scanned keys.
///
/// Returns the number of keys updated. Lines naming a host/algorithm pair
/// the scan never produced are logged and ignored. `[host]:port` names
/// for the scanned `port` are matched against the bare host.
pub fn merge_fingerprints(output: &str, port: u16, result: &mut ScanResult) -> usize {
    let mut merged = 0;
    for line in parse_fingerprints(output) {
        let host = bare_host(&line.host, port);
        match result.existing_key_mut(host, &line.algorithm) {
            Some(info) => {
                info.bits = Some(line.bits);
                info.fingerprint = Some(line.fingerprint);
                merged += 1;
            }
            None => {
                tracing::warn!(
                    host = %host,
                    algorithm = %line.algorithm,
                    "Fingerprint for a key the scan did not report"
                );
            }
        }
    }
    merged
}
