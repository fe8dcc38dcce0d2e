// ABOUTME: End-to-end tests for keyscan-core through real child processes.
// ABOUTME: Stand-in ssh-keyscan/ssh-keygen shell scripts replace the OpenSSH tools.

#![cfg(unix)]

use keyscan_core::{KeyScanner, Protocol, RawLogEntry, ScanConfig, ScanRequest, NO_FINGERPRINT};
use std::path::Path;
use tempfile::TempDir;

// Called as: fake-keyscan -p PORT -t ALG HOST...
const FAKE_KEYSCAN: &str = r##"
port=$2
alg=$4
shift 4
for h in "$@"; do
  echo "# $h:$port SSH-2.0-OpenSSH_8.9" >&2
  # Off port 22 the real tool names hosts as [host]:port
  if [ "$port" = 22 ]; then name=$h; else name="[$h]:$port"; fi
  case "$alg" in
    ed25519) echo "$name ssh-ed25519 AAAAC3NzaC1lZDI1NTE5-$h" ;;
    rsa) echo "$name ssh-rsa AAAAB3NzaC1yc2E-$h" ;;
    rsa1) echo "$name 1024 35 1234567890" ;;
    dsa) echo "no hostkey alg" ;;
    broken) echo "unknown key type" >&2; exit 1 ;;
  esac
done
"##;

// Called as: fake-keygen -lf -   (key lines on stdin)
const FAKE_KEYGEN: &str = r##"
while read -r host f2 f3 f4; do
  case "$f2" in
    ssh-ed25519) echo "256 SHA256:ed-$host $host (ED25519)" ;;
    ssh-rsa) echo "3072 SHA256:rsa-$host $host (RSA)" ;;
    *) echo "$f2 MD5:rsa1-$host $host (RSA1)" ;;
  esac
done
"##;

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    // Run through sh so the file never needs the exec bit
    format!("sh {}", path.display())
}

fn scanner(dir: &TempDir) -> KeyScanner {
    scanner_on_port(dir, 22)
}

fn scanner_on_port(dir: &TempDir, port: u16) -> KeyScanner {
    let config = ScanConfig {
        port,
        keyscan_binary: write_script(dir.path(), "fake-keyscan", FAKE_KEYSCAN),
        keygen_binary: write_script(dir.path(), "fake-keygen", FAKE_KEYGEN),
        timeout_secs: Some(30),
        ..Default::default()
    };
    KeyScanner::with_process_runner(config)
}

#[tokio::test]
async fn test_scan_two_hosts_two_algorithms() {
    let dir = TempDir::new().unwrap();
    let scanner = scanner(&dir);
    let request = ScanRequest::new(["10.0.0.1", "10.0.0.2"], ["rsa,ed25519"]).unwrap();

    let result = scanner.scan(&request).await;

    assert!(result.error.is_none(), "unexpected error: {:?}", result.error);
    for host in ["10.0.0.1", "10.0.0.2"] {
        let record = &result.hosts[host];
        assert_eq!(record.signature.as_deref(), Some("SSH-2.0-OpenSSH_8.9"));

        let ed = &record.keys["ed25519"];
        assert_eq!(ed.protocol, Some(Protocol::V2));
        assert_eq!(ed.algorithm_name, "ssh-ed25519");
        assert_eq!(ed.public_key, format!("AAAAC3NzaC1lZDI1NTE5-{host}"));
        assert_eq!(ed.bits.as_deref(), Some("256"));
        assert_eq!(ed.fingerprint, Some(format!("SHA256:ed-{host}")));

        let rsa = &record.keys["rsa"];
        assert_eq!(rsa.bits.as_deref(), Some("3072"));
        assert_eq!(rsa.fingerprint, Some(format!("SHA256:rsa-{host}")));
    }
    assert!(matches!(result.raw["rsa"][0], RawLogEntry::Output { .. }));
}

#[tokio::test]
async fn test_scan_rsa1() {
    let dir = TempDir::new().unwrap();
    let result = scanner(&dir)
        .key_scan(["old.example"], ["rsa1"])
        .await
        .unwrap();

    let key = result.key("old.example", "rsa1").unwrap();
    assert_eq!(key.protocol, Some(Protocol::V1));
    assert_eq!(key.algorithm_name, "rsa1");
    assert_eq!(key.public_key, "1024 35 1234567890");
    assert_eq!(key.bits.as_deref(), Some("1024"));
    assert_eq!(key.fingerprint.as_deref(), Some("MD5:rsa1-old.example"));
}

#[tokio::test]
async fn test_scan_without_keys_reports_no_fingerprint() {
    let dir = TempDir::new().unwrap();
    let result = scanner(&dir)
        .key_scan(["10.0.0.1"], ["dsa", "broken"])
        .await
        .unwrap();

    assert_eq!(result.error.as_deref(), Some(NO_FINGERPRINT));
    assert!(result.hosts["10.0.0.1"].keys.is_empty());
    // dsa exited cleanly, so its banner was still read
    assert_eq!(
        result.hosts["10.0.0.1"].signature.as_deref(),
        Some("SSH-2.0-OpenSSH_8.9")
    );
    match &result.raw["broken"][0] {
        RawLogEntry::Failed {
            exit_code, stderr, ..
        } => {
            assert_eq!(*exit_code, 1);
            assert!(stderr.contains("unknown key type"));
        }
        other => panic!("expected Failed entry, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_tool_is_recorded_per_algorithm() {
    let config = ScanConfig {
        keyscan_binary: "/nonexistent/ssh-keyscan".to_string(),
        ..Default::default()
    };
    let result = KeyScanner::with_process_runner(config)
        .key_scan(["10.0.0.1"], ["ed25519"])
        .await
        .unwrap();

    // The shell starts but cannot exec the tool: exit 127
    match &result.raw["ed25519"][0] {
        RawLogEntry::Failed { exit_code, .. } => assert_eq!(*exit_code, 127),
        other => panic!("expected Failed entry, got {:?}", other),
    }
    assert_eq!(result.error.as_deref(), Some(NO_FINGERPRINT));
}

#[tokio::test]
async fn test_result_json_shape() {
    let dir = TempDir::new().unwrap();
    let result = scanner(&dir)
        .key_scan(["10.0.0.1"], ["ed25519"])
        .await
        .unwrap();

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["10.0.0.1"]["keys"]["ed25519"]["protocol"], 2);
    assert_eq!(value["10.0.0.1"]["keys"]["ed25519"]["bits"], "256");
    assert!(value["ed25519"].is_array());
    assert!(value.get("error").is_none());
}

#[tokio::test]
async fn test_scan_on_custom_port_keeps_bare_host() {
    let dir = TempDir::new().unwrap();
    let result = scanner_on_port(&dir, 2222)
        .key_scan(["10.0.0.1"], ["ed25519"])
        .await
        .unwrap();

    assert!(result.error.is_none(), "unexpected error: {:?}", result.error);
    assert_eq!(result.hosts.len(), 1, "hosts: {:?}", result.hosts.keys());
    let record = &result.hosts["10.0.0.1"];
    assert_eq!(record.signature.as_deref(), Some("SSH-2.0-OpenSSH_8.9"));
    let key = &record.keys["ed25519"];
    assert_eq!(key.public_key, "AAAAC3NzaC1lZDI1NTE5-10.0.0.1");
    assert_eq!(key.fingerprint.as_deref(), Some("SHA256:ed-[10.0.0.1]:2222"));
}
