//! Manifest-driven retry of failed imports.
//!
//! Resolves exactly the discrepancies named in the audit manifest. Each
//! record commits in its own transaction so one failure cannot roll back
//! unrelated successes, and documents that landed in the store since the
//! audit ran are skipped silently, making repeated retry runs idempotent.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;

use crate::audit::{load_existing_ids, read_manifest};
use crate::config::Config;
use crate::db;
use crate::error::ImportError;
use crate::import::{load_record, print_error_preview, upsert_record};
use crate::models::{CveRecord, Manifest};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Outcome of one retry run.
#[derive(Debug, Default)]
pub struct RetryReport {
    /// Manifest entries that were actually re-imported (not already present).
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

pub async fn run_retry(config: &Config, progress: &dyn ProgressReporter) -> Result<()> {
    let manifest_path = &config.import.manifest_path;
    if !manifest_path.exists() {
        println!(
            "No failure manifest found at {}; run `cvedb status` first.",
            manifest_path.display()
        );
        return Ok(());
    }
    let manifest = read_manifest(manifest_path)?;
    println!("Found {} failed records", manifest.failed_files.len());

    let pool = db::connect(config).await?;
    let report = retry_manifest(&pool, &config.corpus.root, &manifest, progress).await?;

    println!("\nRetry complete!");
    println!("  attempted: {}", report.attempted);
    println!("  succeeded: {}", report.succeeded);
    println!("  failed: {}", report.failed);
    print_error_preview(&report.errors);

    pool.close().await;
    Ok(())
}

/// Re-apply the normalizer and a single-record upsert to every manifest
/// entry still missing from the store.
pub async fn retry_manifest(
    pool: &SqlitePool,
    corpus_root: &Path,
    manifest: &Manifest,
    progress: &dyn ProgressReporter,
) -> Result<RetryReport> {
    // Fresh snapshot: must reflect anything imported since the audit ran.
    let mut existing: HashSet<String> = load_existing_ids(pool).await?;
    println!("Existing CVE records in database: {}", existing.len());

    let total = manifest.failed_files.len() as u64;
    let mut report = RetryReport::default();

    for (n, failed) in manifest.failed_files.iter().enumerate() {
        progress.report(ProgressEvent::Processing {
            phase: "retry".to_string(),
            n: n as u64 + 1,
            total,
        });

        let path = corpus_root.join(&failed.file);
        if !path.exists() {
            report.failed += 1;
            report
                .errors
                .push(format!("file does not exist: {}", path.display()));
            continue;
        }

        let record = match load_record(&path, &failed.file) {
            Ok(record) => record,
            Err(err) => {
                report.failed += 1;
                report.errors.push(err.to_string());
                continue;
            }
        };

        // Already resolved by a previous retry or concurrent import
        if existing.contains(&record.cve_id) {
            continue;
        }

        report.attempted += 1;
        match commit_single(pool, &record).await {
            Ok(()) => {
                existing.insert(record.cve_id.clone());
                report.succeeded += 1;
            }
            Err(err) => {
                report.failed += 1;
                report
                    .errors
                    .push(format!("failed to import {}: {}", failed.file, err));
            }
        }
    }

    Ok(report)
}

/// One record, one transaction. Dropping the transaction on error rolls it
/// back.
async fn commit_single(pool: &SqlitePool, record: &CveRecord) -> Result<(), ImportError> {
    let mut tx = pool.begin().await.map_err(ImportError::commit)?;
    upsert_record(&mut tx, record)
        .await
        .map_err(ImportError::commit)?;
    tx.commit().await.map_err(ImportError::commit)?;
    Ok(())
}
