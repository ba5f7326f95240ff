//! Read-only HTTP query API.
//!
//! Serves paginated listings and aggregate summaries over the imported
//! records. The API never writes: the `cves` table is populated exclusively
//! by the import and retry pipeline, and `vulnerability_category` by an
//! external classifier.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/cves` | Paginated listing with search/type/severity filters |
//! | `GET`  | `/api/cves/{cve_id}` | Single record with reference URLs |
//! | `GET`  | `/api/vulnerability-types` | The seeded category table |
//! | `GET`  | `/api/dashboard/stats` | Aggregate dashboard counts |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no record for CVE-2024-0001" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! dashboards.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::stats::SEVERITY_DISTRIBUTION_SQL;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pool: SqlitePool,
}

/// Starts the query API server. Binds to `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let state = AppState { pool };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/cves", get(handle_list_cves))
        .route("/api/cves/{cve_id}", get(handle_get_cve))
        .route("/api/vulnerability-types", get(handle_vulnerability_types))
        .route("/api/dashboard/stats", get(handle_dashboard_stats))
        .layer(cors)
        .with_state(state);

    println!("API server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: impl std::fmt::Display) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/cves ============

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    /// `vulnerability_category` id.
    #[serde(rename = "type")]
    pub category: Option<i64>,
    /// One of `critical`, `high`, `medium`, `low`, `unknown`.
    pub severity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CveItem {
    pub id: i64,
    pub cve_id: String,
    pub description: Option<String>,
    pub problem_type: Option<String>,
    pub affected_products: Option<String>,
    pub date_published: String,
    pub cvss_version: Option<String>,
    pub cvss_base_score: Option<f64>,
    pub cvss_severity: Option<String>,
    pub cvss_vector: Option<String>,
    pub vulnerability_type: Option<String>,
    pub is_sql_injection: bool,
    pub vulnerability_category: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
    items: Vec<CveItem>,
    total: i64,
    page: i64,
    per_page: i64,
}

async fn handle_list_cves(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 200);

    if let Some(ref severity) = params.severity {
        if severity_bounds(severity).is_none() && severity != "unknown" {
            return Err(bad_request(format!(
                "unknown severity: '{}'. Use critical, high, medium, low, or unknown.",
                severity
            )));
        }
    }

    let (items, total) = fetch_cves(&state.pool, &params, page, per_page)
        .await
        .map_err(internal)?;

    Ok(Json(ListResponse {
        items,
        total,
        page,
        per_page,
    }))
}

/// Score range for a severity label; `None` for the NULL/zero bucket.
fn severity_bounds(severity: &str) -> Option<(f64, f64)> {
    match severity {
        "critical" => Some((9.0, 10.0)),
        "high" => Some((7.0, 8.9)),
        "medium" => Some((4.0, 6.9)),
        "low" => Some((0.1, 3.9)),
        _ => None,
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, params: &ListParams) {
    if let Some(ref search) = params.search {
        if !search.is_empty() {
            let pattern = format!("%{}%", search);
            qb.push(" AND (cve_id LIKE ")
                .push_bind(pattern.clone())
                .push(" OR description LIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
    if let Some(category) = params.category {
        qb.push(" AND vulnerability_category = ").push_bind(category);
    }
    if let Some(ref severity) = params.severity {
        match severity_bounds(severity) {
            Some((min, max)) => {
                qb.push(" AND cvss_base_score BETWEEN ")
                    .push_bind(min)
                    .push(" AND ")
                    .push_bind(max);
            }
            None if severity == "unknown" => {
                qb.push(" AND (cvss_base_score IS NULL OR cvss_base_score = 0)");
            }
            None => {}
        }
    }
}

/// Paginated listing, newest publication first. Returns the page of items
/// and the unpaginated total.
pub async fn fetch_cves(
    pool: &SqlitePool,
    params: &ListParams,
    page: i64,
    per_page: i64,
) -> Result<(Vec<CveItem>, i64), sqlx::Error> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM cves WHERE 1=1");
    push_filters(&mut count_qb, params);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new(
        r#"SELECT id, cve_id, description, problem_type, affected_products,
           date_published, cvss_version, cvss_base_score, cvss_severity,
           cvss_vector, vulnerability_type, is_sql_injection,
           vulnerability_category
           FROM cves WHERE 1=1"#,
    );
    push_filters(&mut qb, params);
    qb.push(" ORDER BY date_published DESC, cve_id ASC LIMIT ")
        .push_bind(per_page)
        .push(" OFFSET ")
        .push_bind((page - 1) * per_page);

    let rows = qb.build().fetch_all(pool).await?;
    let items = rows.iter().map(row_to_item).collect();
    Ok((items, total))
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> CveItem {
    let published: i64 = row.get("date_published");
    CveItem {
        id: row.get("id"),
        cve_id: row.get("cve_id"),
        description: row.get("description"),
        problem_type: row.get("problem_type"),
        affected_products: row.get("affected_products"),
        date_published: format_timestamp(published),
        cvss_version: row.get("cvss_version"),
        cvss_base_score: row.get("cvss_base_score"),
        cvss_severity: row.get("cvss_severity"),
        cvss_vector: row.get("cvss_vector"),
        vulnerability_type: row.get("vulnerability_type"),
        is_sql_injection: row.get("is_sql_injection"),
        vulnerability_category: row.get("vulnerability_category"),
    }
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

// ============ GET /api/cves/{cve_id} ============

#[derive(Serialize)]
struct CveDetailResponse {
    #[serde(flatten)]
    item: CveItem,
    references: Vec<String>,
}

async fn handle_get_cve(
    State(state): State<AppState>,
    Path(cve_id): Path<String>,
) -> Result<Json<CveDetailResponse>, AppError> {
    let row = sqlx::query(
        r#"SELECT id, cve_id, description, problem_type, affected_products,
           date_published, cvss_version, cvss_base_score, cvss_severity,
           cvss_vector, vulnerability_type, is_sql_injection,
           vulnerability_category, "references"
           FROM cves WHERE cve_id = ?"#,
    )
    .bind(&cve_id)
    .fetch_optional(&state.pool)
    .await
    .map_err(internal)?;

    let row = row.ok_or_else(|| not_found(format!("no record for {}", cve_id)))?;

    let references_json: Option<String> = row.get("references");
    let references = references_json
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default();

    Ok(Json(CveDetailResponse {
        item: row_to_item(&row),
        references,
    }))
}

// ============ GET /api/vulnerability-types ============

#[derive(Serialize)]
struct VulnerabilityTypeItem {
    category_id: i64,
    type_name: String,
    type_code: Option<String>,
    description: Option<String>,
}

async fn handle_vulnerability_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<VulnerabilityTypeItem>>, AppError> {
    let rows = sqlx::query(
        "SELECT category_id, type_name, type_code, description FROM vulnerability_types ORDER BY category_id",
    )
    .fetch_all(&state.pool)
    .await
    .map_err(internal)?;

    let types = rows
        .iter()
        .map(|row| VulnerabilityTypeItem {
            category_id: row.get("category_id"),
            type_name: row.get("type_name"),
            type_code: row.get("type_code"),
            description: row.get("description"),
        })
        .collect();

    Ok(Json(types))
}

// ============ GET /api/dashboard/stats ============

#[derive(Serialize)]
struct DashboardResponse {
    total_vulnerabilities: i64,
    categorized_count: i64,
    vulnerability_types: Vec<CategoryCount>,
    trend_data: Vec<YearTrend>,
    severity_distribution: Vec<SeverityCount>,
}

#[derive(Serialize)]
struct CategoryCount {
    category_id: i64,
    type_name: String,
    count: i64,
}

#[derive(Serialize)]
struct YearTrend {
    year: String,
    total_count: i64,
    sql_injection_count: i64,
}

#[derive(Serialize)]
struct SeverityCount {
    level: String,
    count: i64,
}

async fn handle_dashboard_stats(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, AppError> {
    let pool = &state.pool;

    let total_vulnerabilities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cves")
        .fetch_one(pool)
        .await
        .map_err(internal)?;

    let categorized_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cves WHERE vulnerability_category IS NOT NULL")
            .fetch_one(pool)
            .await
            .map_err(internal)?;

    let type_rows = sqlx::query(
        r#"
        SELECT vt.category_id, vt.type_name, COUNT(c.id) AS count
        FROM vulnerability_types vt
        LEFT JOIN cves c ON c.vulnerability_category = vt.category_id
        GROUP BY vt.category_id, vt.type_name
        ORDER BY count DESC, vt.category_id ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(internal)?;
    let vulnerability_types = type_rows
        .iter()
        .map(|row| CategoryCount {
            category_id: row.get("category_id"),
            type_name: row.get("type_name"),
            count: row.get("count"),
        })
        .collect();

    let trend_rows = sqlx::query(
        r#"
        SELECT strftime('%Y', date_published, 'unixepoch') AS year,
               COUNT(*) AS total_count,
               SUM(is_sql_injection) AS sql_injection_count
        FROM cves
        GROUP BY year
        ORDER BY year ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(internal)?;
    let trend_data = trend_rows
        .iter()
        .map(|row| YearTrend {
            year: row.get("year"),
            total_count: row.get("total_count"),
            sql_injection_count: row.get("sql_injection_count"),
        })
        .collect();

    let severity_rows = sqlx::query(SEVERITY_DISTRIBUTION_SQL)
        .fetch_all(pool)
        .await
        .map_err(internal)?;
    let severity_distribution = severity_rows
        .iter()
        .map(|row| SeverityCount {
            level: row.get("severity_level"),
            count: row.get("count"),
        })
        .collect();

    Ok(Json(DashboardResponse {
        total_vulnerabilities,
        categorized_count,
        vulnerability_types,
        trend_data,
        severity_distribution,
    }))
}
