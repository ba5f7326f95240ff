//! Database statistics and health overview.
//!
//! Provides a quick summary of what's imported: record counts, SQL-injection
//! matches, classification coverage, severity distribution, and the busiest
//! publication years. Used by `cvedb stats` to give confidence that imports
//! and retries are working as expected.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

#[derive(Debug)]
pub struct StoreStats {
    pub total_records: i64,
    pub sql_injection: i64,
    pub categorized: i64,
    /// (severity label, count), ordered critical → unknown.
    pub severity: Vec<(String, i64)>,
    /// (year, count), most records first.
    pub top_years: Vec<(String, i64)>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("cvedb — Database Stats");
    println!("======================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  CVE records:   {}", stats.total_records);
    println!("  SQL injection: {}", stats.sql_injection);
    println!(
        "  Categorized:   {} / {}",
        stats.categorized, stats.total_records
    );

    if !stats.severity.is_empty() {
        println!();
        println!("  By severity:");
        for (level, count) in &stats.severity {
            println!("  {:<12} {:>8}", level, count);
        }
    }

    if !stats.top_years.is_empty() {
        println!();
        println!("  Top years:");
        for (year, count) in &stats.top_years {
            println!("  {:<12} {:>8}", year, count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<StoreStats> {
    let total_records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cves")
        .fetch_one(pool)
        .await?;

    let sql_injection: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cves WHERE is_sql_injection = 1")
            .fetch_one(pool)
            .await?;

    let categorized: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cves WHERE vulnerability_category IS NOT NULL")
            .fetch_one(pool)
            .await?;

    let severity_rows = sqlx::query(SEVERITY_DISTRIBUTION_SQL).fetch_all(pool).await?;
    let severity = severity_rows
        .iter()
        .map(|row| (row.get("severity_level"), row.get("count")))
        .collect();

    let year_rows = sqlx::query(
        r#"
        SELECT strftime('%Y', date_published, 'unixepoch') AS year, COUNT(*) AS count
        FROM cves
        GROUP BY year
        ORDER BY count DESC, year DESC
        LIMIT 10
        "#,
    )
    .fetch_all(pool)
    .await?;
    let top_years = year_rows
        .iter()
        .map(|row| (row.get("year"), row.get("count")))
        .collect();

    Ok(StoreStats {
        total_records,
        sql_injection,
        categorized,
        severity,
        top_years,
    })
}

/// Severity buckets over `cvss_base_score`, shared with the read API:
/// critical ≥ 9.0, high ≥ 7.0, medium ≥ 4.0, low ≥ 0.1, otherwise unknown.
pub const SEVERITY_DISTRIBUTION_SQL: &str = r#"
    SELECT
        CASE
            WHEN cvss_base_score IS NULL OR cvss_base_score = 0 THEN 'Unknown'
            WHEN cvss_base_score >= 9.0 THEN 'Critical'
            WHEN cvss_base_score >= 7.0 THEN 'High'
            WHEN cvss_base_score >= 4.0 THEN 'Medium'
            ELSE 'Low'
        END AS severity_level,
        COUNT(*) AS count
    FROM cves
    GROUP BY severity_level
    ORDER BY
        CASE severity_level
            WHEN 'Critical' THEN 1
            WHEN 'High' THEN 2
            WHEN 'Medium' THEN 3
            WHEN 'Low' THEN 4
            ELSE 5
        END
"#;

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;

    #[test]
    fn format_bytes_ranges() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[tokio::test]
    async fn severity_buckets() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("test.sqlite"))
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();

        for (cve_id, score) in [
            ("CVE-2024-0001", Some(9.8)),
            ("CVE-2024-0002", Some(7.5)),
            ("CVE-2024-0003", Some(5.0)),
            ("CVE-2024-0004", Some(2.0)),
            ("CVE-2024-0005", None),
        ] {
            sqlx::query(
                "INSERT INTO cves (cve_id, date_published, cvss_base_score, is_sql_injection) VALUES (?, 0, ?, 0)",
            )
            .bind(cve_id)
            .bind(score)
            .execute(&pool)
            .await
            .unwrap();
        }

        let stats = collect_stats(&pool).await.unwrap();
        assert_eq!(stats.total_records, 5);
        assert_eq!(
            stats.severity,
            vec![
                ("Critical".to_string(), 1),
                ("High".to_string(), 1),
                ("Medium".to_string(), 1),
                ("Low".to_string(), 1),
                ("Unknown".to_string(), 1),
            ]
        );
    }
}
