//! Import status audit.
//!
//! Cross-references the corpus against the store's current identifier set
//! without mutating anything, and persists the discrepancies as a JSON
//! manifest for `cvedb retry` to consume. A new run fully overwrites the
//! previous manifest.
//!
//! The walk order is fixed, so two audits over an unchanged corpus and store
//! produce byte-identical manifests.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::models::{Manifest, ManifestFailure, ManifestStats};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::walker::CorpusWalker;

pub async fn run_status(config: &Config, progress: &dyn ProgressReporter) -> Result<()> {
    let pool = db::connect(config).await?;
    let walker = CorpusWalker::new(&config.corpus)?;

    let manifest = audit_corpus(&pool, &walker, progress).await?;

    println!("\nImport status:");
    println!("  total files: {}", manifest.stats.total_files);
    println!("  imported: {}", manifest.stats.imported);
    println!("  failed: {}", manifest.stats.failed);

    let manifest_path = &config.import.manifest_path;
    write_manifest(&manifest, manifest_path)?;
    println!("\nFailure details saved to: {}", manifest_path.display());

    pool.close().await;
    Ok(())
}

/// Compute the discrepancy manifest: every corpus document whose identifier
/// is not in the store.
pub async fn audit_corpus(
    pool: &SqlitePool,
    walker: &CorpusWalker,
    progress: &dyn ProgressReporter,
) -> Result<Manifest> {
    let existing = load_existing_ids(pool).await?;
    println!("Existing CVE records in database: {}", existing.len());

    progress.report(ProgressEvent::Discovering {
        phase: "status".to_string(),
    });
    let total = walker.count()?;

    let mut stats = ManifestStats {
        total_files: 0,
        imported: 0,
        failed: 0,
    };
    let mut failed_files = Vec::new();

    for file in walker.walk() {
        let file = file?;
        stats.total_files += 1;

        // Minimal parse: only the identifier is needed here.
        match read_cve_id(&file.path) {
            Ok(cve_id) if existing.contains(&cve_id) => stats.imported += 1,
            Ok(cve_id) => {
                stats.failed += 1;
                failed_files.push(ManifestFailure {
                    file: file.relative_path(),
                    cve_id: Some(cve_id),
                    error: "Not in database".to_string(),
                });
            }
            Err(message) => {
                stats.failed += 1;
                failed_files.push(ManifestFailure {
                    file: file.relative_path(),
                    cve_id: None,
                    error: message,
                });
            }
        }

        progress.report(ProgressEvent::Processing {
            phase: "status".to_string(),
            n: stats.total_files,
            total,
        });
    }

    Ok(Manifest {
        stats,
        failed_files,
    })
}

/// Full identifier set, loaded once up front.
pub async fn load_existing_ids(pool: &SqlitePool) -> Result<HashSet<String>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT cve_id FROM cves")
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().collect())
}

fn read_cve_id(path: &Path) -> Result<String, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let data: serde_json::Value = serde_json::from_str(&content).map_err(|e| e.to_string())?;
    crate::extract::extract_cve_id(&data)
        .map(str::to_string)
        .ok_or_else(|| "missing cveMetadata.cveId".to_string())
}

/// Persist the manifest, overwriting any previous one.
pub fn write_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
    Ok(())
}

/// Load a manifest written by a previous audit run.
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let manifest = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
    Ok(manifest)
}
