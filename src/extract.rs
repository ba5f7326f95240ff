//! Record normalization.
//!
//! Maps one parsed CVE JSON document into a flat [`CveRecord`]. Pure
//! functions, no I/O: the caller reads and parses the file, then decides
//! whether to skip or abort when extraction fails.
//!
//! Every field except the identifier degrades gracefully: a missing nested
//! path produces the documented default rather than failing the record. The
//! publish date falls back through `dateReserved`, `dateUpdated`, and a fixed
//! epoch sentinel.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::error::ImportError;
use crate::models::CveRecord;

/// Placeholder used when a document carries no description at all.
pub const NO_DESCRIPTION: &str = "No description available";

/// Publish date used when a document has none of the three date fields.
const EPOCH_SENTINEL: &str = "2000-01-01T00:00:00Z";

/// CVSS versions in extraction precedence order. The first version with any
/// entry in the metrics list wins; later versions are discarded even when
/// their entries are more complete.
const CVSS_VERSIONS: &[(&str, &str)] = &[
    ("cvssV4_0", "v4.0"),
    ("cvssV3_1", "v3.1"),
    ("cvssV3_0", "v3.0"),
];

/// Extract a canonical record from one CVE document.
///
/// `filename` is used only for error messages.
pub fn extract_record(data: &Value, filename: &str) -> Result<CveRecord, ImportError> {
    let cve_id = extract_cve_id(data)
        .ok_or_else(|| ImportError::extraction(filename, "missing cveMetadata.cveId", data))?
        .to_string();

    let raw_date = publish_date_string(data);
    let date_published = parse_timestamp(raw_date).map_err(|message| {
        ImportError::extraction(
            filename,
            format!("invalid publish date '{}': {}", raw_date, message),
            data,
        )
    })?;

    let cna = &data["containers"]["cna"];

    let description = cna["descriptions"][0]["value"]
        .as_str()
        .unwrap_or(NO_DESCRIPTION)
        .to_string();

    let cwe_ids = extract_cwe_ids(cna.get("problemTypes"));
    let problem_type = serde_json::to_string(&cwe_ids).unwrap_or_else(|_| "[]".to_string());

    let affected_products = cna
        .get("affected")
        .map(|v| v.to_string())
        .unwrap_or_else(|| "[]".to_string());

    let (cvss_version, cvss_base_score, cvss_severity, cvss_vector) =
        extract_cvss(cna.get("metrics"));

    let reference_urls: Vec<String> = cna
        .get("references")
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .map(|r| r["url"].as_str().unwrap_or("").to_string())
                .collect()
        })
        .unwrap_or_default();
    let references = serde_json::to_string(&reference_urls).unwrap_or_else(|_| "[]".to_string());

    let description_lower = description.to_lowercase();
    let is_sql_injection =
        description_lower.contains("sql injection") || description_lower.contains("sqli");
    let vulnerability_type = is_sql_injection.then(|| "sql_injection".to_string());

    Ok(CveRecord {
        cve_id,
        description,
        problem_type,
        affected_products,
        date_published,
        cvss_version,
        cvss_base_score,
        cvss_severity,
        cvss_vector,
        references,
        vulnerability_type,
        is_sql_injection,
    })
}

/// Minimal identifier lookup, used by the auditor to avoid full extraction.
pub fn extract_cve_id(data: &Value) -> Option<&str> {
    data["cveMetadata"]["cveId"].as_str()
}

/// First present field of `datePublished`, `dateReserved`, `dateUpdated`,
/// falling back to the epoch sentinel.
fn publish_date_string(data: &Value) -> &str {
    let metadata = &data["cveMetadata"];
    for field in ["datePublished", "dateReserved", "dateUpdated"] {
        if let Some(raw) = metadata[field].as_str() {
            return raw;
        }
    }
    EPOCH_SENTINEL
}

/// Parse an ISO-8601 timestamp after stripping a trailing UTC marker.
///
/// Corpus dates appear as `2023-01-02T03:04:05Z`, with fractional seconds,
/// with explicit offsets, and occasionally as bare dates.
fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    let trimmed = raw.trim_end_matches('Z');
    if let Ok(dt) = trimmed.parse::<NaiveDateTime>() {
        return Ok(dt);
    }
    if let Ok(date) = trimmed.parse::<NaiveDate>() {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap());
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .map_err(|e| e.to_string())
}

/// Collect CWE codes from every problem-type entry, in source order,
/// duplicates preserved.
fn extract_cwe_ids(problem_types: Option<&Value>) -> Vec<String> {
    let mut cwe_ids = Vec::new();
    let Some(entries) = problem_types.and_then(Value::as_array) else {
        return cwe_ids;
    };
    for pt in entries {
        let Some(descriptions) = pt.get("descriptions").and_then(Value::as_array) else {
            continue;
        };
        for desc in descriptions {
            if desc["type"].as_str() == Some("CWE") {
                if let Some(cwe_id) = desc["cweId"].as_str() {
                    cwe_ids.push(cwe_id.to_string());
                }
            }
        }
    }
    cwe_ids
}

type CvssFields = (Option<String>, Option<f64>, Option<String>, Option<String>);

/// Pick one scoring entry by fixed version precedence.
///
/// Scans the whole metrics list for v4.0, then v3.1, then v3.0, and takes
/// the first entry of the first version found. A matching entry with missing
/// sub-fields still sets the version: version-present-but-unscored is
/// distinct from version-absent.
fn extract_cvss(metrics: Option<&Value>) -> CvssFields {
    let Some(entries) = metrics.and_then(Value::as_array) else {
        return (None, None, None, None);
    };
    for (key, label) in CVSS_VERSIONS {
        for metric in entries {
            if let Some(info) = metric.get(*key) {
                return (
                    Some((*label).to_string()),
                    info["baseScore"].as_f64(),
                    info["baseSeverity"].as_str().map(str::to_string),
                    info["vectorString"].as_str().map(str::to_string),
                );
            }
        }
    }
    (None, None, None, None)
}
