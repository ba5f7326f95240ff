//! Core data models used throughout cvedb.
//!
//! These types represent the canonical vulnerability record that flows from
//! the normalizer into the store, and the discrepancy manifest exchanged
//! between the audit and retry phases.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Normalized, flat representation of one CVE document.
///
/// Produced by [`crate::extract::extract_record`] and written to the `cves`
/// table by the import and retry paths. List-valued fields
/// (`problem_type`, `affected_products`, `references`) are stored as
/// JSON-serialized text, opaque to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CveRecord {
    pub cve_id: String,
    pub description: String,
    pub problem_type: String,
    pub affected_products: String,
    pub date_published: NaiveDateTime,
    pub cvss_version: Option<String>,
    pub cvss_base_score: Option<f64>,
    pub cvss_severity: Option<String>,
    pub cvss_vector: Option<String>,
    pub references: String,
    pub vulnerability_type: Option<String>,
    pub is_sql_injection: bool,
}

/// Discrepancy manifest produced by `cvedb status` and consumed by
/// `cvedb retry`. A new audit run fully overwrites the previous manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub stats: ManifestStats,
    pub failed_files: Vec<ManifestFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestStats {
    pub total_files: u64,
    pub imported: u64,
    pub failed: u64,
}

/// One corpus document that is not represented in the store.
///
/// `cve_id` is absent when the document could not even be parsed far enough
/// to recover an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFailure {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve_id: Option<String>,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trip() {
        let manifest = Manifest {
            stats: ManifestStats {
                total_files: 3,
                imported: 1,
                failed: 2,
            },
            failed_files: vec![
                ManifestFailure {
                    file: "1999/0xxx/CVE-1999-0001.json".to_string(),
                    cve_id: Some("CVE-1999-0001".to_string()),
                    error: "Not in database".to_string(),
                },
                ManifestFailure {
                    file: "1999/0xxx/CVE-1999-0002.json".to_string(),
                    cve_id: None,
                    error: "expected value at line 1 column 1".to_string(),
                },
            ],
        };

        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, back);
    }

    #[test]
    fn manifest_omits_absent_cve_id() {
        let failure = ManifestFailure {
            file: "2001/1xxx/CVE-2001-1000.json".to_string(),
            cve_id: None,
            error: "unreadable".to_string(),
        };
        let json = serde_json::to_string(&failure).unwrap();
        assert!(!json.contains("cve_id"));
    }
}
