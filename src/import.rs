//! Bulk import pipeline.
//!
//! Walks the corpus, normalizes each document, and applies records to the
//! store in fixed-size batches. Each batch commits as one transaction; a
//! failed batch rolls back atomically, is recorded in the run's error log,
//! and the import continues with the next batch. Per-file parse and
//! extraction failures are recorded individually and never block sibling
//! files.

use anyhow::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::config::Config;
use crate::db;
use crate::error::ImportError;
use crate::extract::extract_record;
use crate::models::CveRecord;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::walker::CorpusWalker;

/// How many error strings a run summary displays. The report keeps the full
/// list; only printing is capped.
const ERROR_DISPLAY_CAP: usize = 10;

/// Outcome of one bulk import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Files that parsed and normalized successfully.
    pub processed: u64,
    /// Records durably committed, counted per successful batch.
    pub imported: u64,
    /// Records whose description matched the SQL-injection patterns.
    pub sql_injection: u64,
    /// Every per-file and per-batch error observed, in order.
    pub errors: Vec<String>,
}

pub async fn run_import(
    config: &Config,
    limit: Option<usize>,
    dry_run: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let walker = CorpusWalker::new(&config.corpus)?;

    progress.report(ProgressEvent::Discovering {
        phase: "import".to_string(),
    });
    let total = walker.count()?;
    println!("Found {} CVE files to process", total);

    let pool = if dry_run {
        None
    } else {
        Some(db::connect(config).await?)
    };

    let report = import_corpus(
        pool.as_ref(),
        &walker,
        config.import.batch_size,
        limit,
        progress,
    )
    .await?;

    if dry_run {
        println!("import (dry-run)");
        println!("  files parsed: {}", report.processed);
        println!("  sql injection matches: {}", report.sql_injection);
        println!("  errors: {}", report.errors.len());
    } else {
        println!("\nImport complete!");
        println!("  files processed: {}", report.processed);
        println!("  records imported: {}", report.imported);
        println!("  sql injection matches: {}", report.sql_injection);
        println!("  errors: {}", report.errors.len());
    }
    print_error_preview(&report.errors);

    if let Some(pool) = pool {
        pool.close().await;
    }
    Ok(())
}

/// Core import loop, separated from connection handling for testability.
///
/// With `pool = None` (dry run) documents are walked and normalized but the
/// store is never touched.
pub async fn import_corpus(
    pool: Option<&SqlitePool>,
    walker: &CorpusWalker,
    batch_size: usize,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<ImportReport> {
    let total = walker.count()?;
    let total = match limit {
        Some(lim) => total.min(lim as u64),
        None => total,
    };

    let mut report = ImportReport::default();
    let mut batch: Vec<CveRecord> = Vec::with_capacity(batch_size);
    let mut visited: u64 = 0;

    for file in walker.walk() {
        let file = file?;
        if let Some(lim) = limit {
            if visited as usize >= lim {
                break;
            }
        }
        visited += 1;

        match load_record(&file.path, &file.filename) {
            Ok(record) => {
                if record.is_sql_injection {
                    report.sql_injection += 1;
                }
                batch.push(record);
                report.processed += 1;

                if batch.len() >= batch_size {
                    flush_batch(pool, &mut batch, &mut report).await;
                }
            }
            Err(err) => report.errors.push(err.to_string()),
        }

        progress.report(ProgressEvent::Processing {
            phase: "import".to_string(),
            n: visited,
            total,
        });
    }

    // Final partial batch
    if !batch.is_empty() {
        flush_batch(pool, &mut batch, &mut report).await;
    }

    Ok(report)
}

/// Read, parse, and normalize one corpus document. `display_name` is used
/// only in error messages.
pub fn load_record(path: &std::path::Path, display_name: &str) -> Result<CveRecord, ImportError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ImportError::parse(display_name, e))?;
    let data: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| ImportError::parse(display_name, e))?;
    extract_record(&data, display_name)
}

/// Commit the accumulated batch as one transaction, recording (not
/// propagating) a failure. The batch is drained either way.
async fn flush_batch(
    pool: Option<&SqlitePool>,
    batch: &mut Vec<CveRecord>,
    report: &mut ImportReport,
) {
    if let Some(pool) = pool {
        match commit_batch(pool, batch).await {
            Ok(()) => report.imported += batch.len() as u64,
            Err(err) => report.errors.push(format!("batch commit error: {}", err)),
        }
    }
    batch.clear();
}

async fn commit_batch(pool: &SqlitePool, batch: &[CveRecord]) -> Result<(), ImportError> {
    let mut tx = pool.begin().await.map_err(ImportError::commit)?;
    for record in batch {
        upsert_record(&mut tx, record)
            .await
            .map_err(ImportError::commit)?;
    }
    tx.commit().await.map_err(ImportError::commit)?;
    Ok(())
}

/// Insert-or-update by `cve_id`, the sole dispatch key.
///
/// An explicit two-branch command: an existing row has every extracted field
/// overwritten in place; `vulnerability_category` belongs to the external
/// classifier and is never touched on update (and left NULL on insert).
pub(crate) async fn upsert_record(
    tx: &mut Transaction<'_, Sqlite>,
    record: &CveRecord,
) -> Result<(), sqlx::Error> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM cves WHERE cve_id = ?")
        .bind(&record.cve_id)
        .fetch_optional(&mut **tx)
        .await?;

    match existing {
        Some(row_id) => {
            sqlx::query(
                r#"
                UPDATE cves SET
                    description = ?,
                    problem_type = ?,
                    affected_products = ?,
                    date_published = ?,
                    cvss_version = ?,
                    cvss_base_score = ?,
                    cvss_severity = ?,
                    cvss_vector = ?,
                    "references" = ?,
                    vulnerability_type = ?,
                    is_sql_injection = ?
                WHERE id = ?
                "#,
            )
            .bind(&record.description)
            .bind(&record.problem_type)
            .bind(&record.affected_products)
            .bind(record.date_published.and_utc().timestamp())
            .bind(&record.cvss_version)
            .bind(record.cvss_base_score)
            .bind(&record.cvss_severity)
            .bind(&record.cvss_vector)
            .bind(&record.references)
            .bind(&record.vulnerability_type)
            .bind(record.is_sql_injection)
            .bind(row_id)
            .execute(&mut **tx)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO cves (
                    cve_id, description, problem_type, affected_products,
                    date_published, cvss_version, cvss_base_score, cvss_severity,
                    cvss_vector, "references", vulnerability_type, is_sql_injection
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.cve_id)
            .bind(&record.description)
            .bind(&record.problem_type)
            .bind(&record.affected_products)
            .bind(record.date_published.and_utc().timestamp())
            .bind(&record.cvss_version)
            .bind(record.cvss_base_score)
            .bind(&record.cvss_severity)
            .bind(&record.cvss_vector)
            .bind(&record.references)
            .bind(&record.vulnerability_type)
            .bind(record.is_sql_injection)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

/// Print at most [`ERROR_DISPLAY_CAP`] errors; the report retains all.
pub(crate) fn print_error_preview(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!("\nErrors:");
    for error in errors.iter().take(ERROR_DISPLAY_CAP) {
        println!("- {}", error);
    }
    if errors.len() > ERROR_DISPLAY_CAP {
        println!(
            "... {} more errors not shown",
            errors.len() - ERROR_DISPLAY_CAP
        );
    }
}
