use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // "references" is a SQL keyword and must stay quoted in every statement
    // touching that column.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cves (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cve_id TEXT NOT NULL UNIQUE,
            description TEXT,
            problem_type TEXT,
            affected_products TEXT,
            date_published INTEGER NOT NULL,
            cvss_version TEXT,
            cvss_base_score REAL,
            cvss_severity TEXT,
            cvss_vector TEXT,
            vulnerability_type TEXT,
            is_sql_injection INTEGER NOT NULL DEFAULT 0,
            "references" TEXT,
            vulnerability_category INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vulnerability_types (
            category_id INTEGER PRIMARY KEY,
            type_name TEXT NOT NULL,
            type_code TEXT,
            description TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cves_date_published ON cves(date_published DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cves_cvss_base_score ON cves(cvss_base_score)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cves_vulnerability_category ON cves(vulnerability_category)",
    )
    .execute(pool)
    .await?;

    seed_vulnerability_types(pool).await?;

    Ok(())
}

/// The fixed category set consumed by the read API. The pipeline itself
/// never assigns `vulnerability_category`; that is the classifier's job.
const VULNERABILITY_TYPES: &[(i64, &str, &str)] = &[
    (1, "SQL Injection", "sql_injection"),
    (2, "Cross-Site Scripting", "xss"),
    (3, "Remote Code Execution", "rce"),
    (4, "Buffer Overflow", "buffer_overflow"),
    (5, "Path Traversal", "path_traversal"),
    (6, "Denial of Service", "dos"),
    (7, "Cross-Site Request Forgery", "csrf"),
    (8, "Server-Side Request Forgery", "ssrf"),
    (9, "XML External Entity", "xxe"),
    (10, "Unrestricted File Upload", "file_upload"),
];

async fn seed_vulnerability_types(pool: &SqlitePool) -> Result<()> {
    for (category_id, type_name, type_code) in VULNERABILITY_TYPES {
        sqlx::query(
            "INSERT OR IGNORE INTO vulnerability_types (category_id, type_name, type_code) VALUES (?, ?, ?)",
        )
        .bind(category_id)
        .bind(type_name)
        .bind(type_code)
        .execute(pool)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("test.sqlite"))
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        apply_schema(&pool).await.unwrap();

        let seeded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vulnerability_types")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(seeded, VULNERABILITY_TYPES.len() as i64);
    }
}
