use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use cvedb::models::Manifest;

fn cvedb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cvedb");
    path
}

fn cve_doc(cve_id: &str, description: &str, date_field: &str, date: &str) -> String {
    format!(
        r#"{{
  "cveMetadata": {{
    "cveId": "{cve_id}",
    "{date_field}": "{date}"
  }},
  "containers": {{
    "cna": {{
      "descriptions": [{{"lang": "en", "value": "{description}"}}],
      "references": [{{"url": "https://example.com/{cve_id}"}}],
      "metrics": [{{"cvssV3_1": {{"baseScore": 7.5, "baseSeverity": "HIGH", "vectorString": "CVSS:3.1/AV:N"}}}}]
    }}
  }}
}}"#
    )
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // Two-year corpus: three well-formed documents (one relying on the
    // dateReserved fallback, one a SQL injection) plus one broken file.
    let y1999 = root.join("cves").join("1999").join("0xxx");
    let y2024 = root.join("cves").join("2024").join("21xxx");
    fs::create_dir_all(&y1999).unwrap();
    fs::create_dir_all(&y2024).unwrap();

    fs::write(
        y1999.join("CVE-1999-0001.json"),
        cve_doc(
            "CVE-1999-0001",
            "A buffer overflow in the example daemon.",
            "datePublished",
            "1999-02-04T05:00:00Z",
        ),
    )
    .unwrap();
    fs::write(
        y2024.join("CVE-2024-21000.json"),
        cve_doc(
            "CVE-2024-21000",
            "A SQL Injection vulnerability in the search endpoint.",
            "datePublished",
            "2024-01-16T08:30:00.000Z",
        ),
    )
    .unwrap();
    fs::write(
        y2024.join("CVE-2024-21001.json"),
        cve_doc(
            "CVE-2024-21001",
            "Improper input validation in the uploader.",
            "dateReserved",
            "2024-01-02T00:00:00Z",
        ),
    )
    .unwrap();
    fs::write(y2024.join("CVE-2024-21002.json"), "{ this is not json").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/cvedb.sqlite"

[corpus]
root = "{root}/cves"

[import]
batch_size = 100
manifest_path = "{root}/data/import_failures.json"

[server]
bind = "127.0.0.1:5058"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("cvedb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cvedb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cvedb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cvedb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cvedb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("cvedb.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_cvedb(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_cvedb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_counts_and_errors() {
    let (_tmp, config_path) = setup_test_env();

    run_cvedb(&config_path, &["init"]);
    let (stdout, stderr, success) = run_cvedb(&config_path, &["import"]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Found 4 CVE files to process"));
    assert!(stdout.contains("files processed: 3"));
    assert!(stdout.contains("records imported: 3"));
    assert!(stdout.contains("sql injection matches: 1"));
    assert!(stdout.contains("errors: 1"));
    assert!(stdout.contains("CVE-2024-21002.json"));
}

#[test]
fn test_import_idempotent_no_duplicates() {
    let (_tmp, config_path) = setup_test_env();

    run_cvedb(&config_path, &["init"]);
    let (stdout1, _, _) = run_cvedb(&config_path, &["import"]);
    assert!(stdout1.contains("records imported: 3"));

    // Second import updates in place: same counts, no duplicates
    let (stdout2, _, _) = run_cvedb(&config_path, &["import"]);
    assert!(stdout2.contains("records imported: 3"));

    let (stats_out, _, _) = run_cvedb(&config_path, &["stats"]);
    assert!(
        stats_out.contains("CVE records:   3"),
        "expected 3 records after re-import, got: {}",
        stats_out
    );
}

#[test]
fn test_import_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();

    run_cvedb(&config_path, &["init"]);
    let (stdout, _, success) = run_cvedb(&config_path, &["import", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("files parsed: 3"));

    let (stats_out, _, _) = run_cvedb(&config_path, &["stats"]);
    assert!(stats_out.contains("CVE records:   0"));
}

#[test]
fn test_import_with_limit() {
    let (_tmp, config_path) = setup_test_env();

    run_cvedb(&config_path, &["init"]);
    let (stdout, _, success) = run_cvedb(&config_path, &["import", "--limit", "1"]);
    assert!(success);
    assert!(stdout.contains("records imported: 1"));
}

#[test]
fn test_status_writes_manifest() {
    let (tmp, config_path) = setup_test_env();

    run_cvedb(&config_path, &["init"]);
    // Audit before any import: every document is missing
    let (stdout, _, success) = run_cvedb(&config_path, &["status"]);
    assert!(success, "status failed: {}", stdout);
    assert!(stdout.contains("total files: 4"));
    assert!(stdout.contains("imported: 0"));
    assert!(stdout.contains("failed: 4"));

    let manifest_path = tmp.path().join("data").join("import_failures.json");
    assert!(manifest_path.exists());

    let manifest: Manifest =
        serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
    assert_eq!(manifest.stats.total_files, 4);
    assert_eq!(manifest.stats.failed, 4);
    assert_eq!(manifest.failed_files.len(), 4);

    // Well-formed missing documents carry their identifier and the fixed
    // reason; the broken file carries the parse error and no identifier.
    let missing = &manifest.failed_files[0];
    assert_eq!(missing.file, "1999/0xxx/CVE-1999-0001.json");
    assert_eq!(missing.cve_id.as_deref(), Some("CVE-1999-0001"));
    assert_eq!(missing.error, "Not in database");

    let broken = manifest
        .failed_files
        .iter()
        .find(|f| f.file.contains("CVE-2024-21002"))
        .expect("broken file should be in manifest");
    assert_eq!(broken.cve_id, None);
    assert_ne!(broken.error, "Not in database");
}

#[test]
fn test_status_deterministic() {
    let (tmp, config_path) = setup_test_env();

    run_cvedb(&config_path, &["init"]);
    run_cvedb(&config_path, &["import"]);

    let manifest_path = tmp.path().join("data").join("import_failures.json");

    run_cvedb(&config_path, &["status"]);
    let first = fs::read(&manifest_path).unwrap();
    run_cvedb(&config_path, &["status"]);
    let second = fs::read(&manifest_path).unwrap();
    assert_eq!(first, second, "manifests should be byte-identical");
}

#[test]
fn test_retry_resolves_manifest_and_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    run_cvedb(&config_path, &["init"]);
    // Manifest names all four documents
    run_cvedb(&config_path, &["status"]);

    let (stdout, _, success) = run_cvedb(&config_path, &["retry"]);
    assert!(success, "retry failed: {}", stdout);
    assert!(stdout.contains("Found 4 failed records"));
    assert!(stdout.contains("attempted: 3"));
    assert!(stdout.contains("succeeded: 3"));
    assert!(stdout.contains("failed: 1"));

    // Second run against the same manifest performs zero inserts
    let (stdout, _, _) = run_cvedb(&config_path, &["retry"]);
    assert!(stdout.contains("attempted: 0"));
    assert!(stdout.contains("succeeded: 0"));

    let (status_out, _, _) = run_cvedb(&config_path, &["status"]);
    assert!(status_out.contains("imported: 3"));
    assert!(status_out.contains("failed: 1"));
}

#[test]
fn test_retry_without_manifest() {
    let (_tmp, config_path) = setup_test_env();

    run_cvedb(&config_path, &["init"]);
    let (stdout, _, success) = run_cvedb(&config_path, &["retry"]);
    assert!(success, "retry without manifest should not fail");
    assert!(stdout.contains("run `cvedb status` first"));
}

#[test]
fn test_stats_summary() {
    let (_tmp, config_path) = setup_test_env();

    run_cvedb(&config_path, &["init"]);
    run_cvedb(&config_path, &["import"]);

    let (stdout, _, success) = run_cvedb(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("CVE records:   3"));
    assert!(stdout.contains("SQL injection: 1"));
    assert!(stdout.contains("By severity:"));
    assert!(stdout.contains("High"));
}

#[test]
fn test_missing_config_fails() {
    let (tmp, _) = setup_test_env();
    let bogus = tmp.path().join("nope.toml");

    let binary = cvedb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(bogus.to_str().unwrap())
        .arg("stats")
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_invalid_progress_mode_rejected() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_cvedb(&config_path, &["--progress", "loud", "stats"]);
    assert!(!success);
    assert!(stderr.contains("invalid progress mode"));
}
