//! Pipeline error kinds.
//!
//! The import pipeline distinguishes three recoverable failures: a document
//! that cannot be read or parsed, a document that parses but lacks the
//! mandatory fields, and a store write the database rejects. All three are
//! logged and skipped; only a connection-level store failure aborts a run.

use thiserror::Error;

/// How much of the offending document an [`ImportError::Extraction`] carries.
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ImportError {
    /// The file could not be read, or its contents are not valid JSON.
    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    /// The document parses but a mandatory field is missing or unusable.
    /// Carries a truncated dump of the document for diagnosis.
    #[error("error processing {file}: {message}\ndocument: {snippet}...")]
    Extraction {
        file: String,
        message: String,
        snippet: String,
    },

    /// The store rejected a batch or single-record write.
    #[error("commit failed: {message}")]
    Commit { message: String },
}

impl ImportError {
    pub fn parse(file: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            file: file.into(),
            message: err.to_string(),
        }
    }

    pub fn extraction(
        file: impl Into<String>,
        message: impl Into<String>,
        document: &serde_json::Value,
    ) -> Self {
        Self::Extraction {
            file: file.into(),
            message: message.into(),
            snippet: document_snippet(document),
        }
    }

    pub fn commit(err: impl std::fmt::Display) -> Self {
        Self::Commit {
            message: err.to_string(),
        }
    }
}

/// First [`SNIPPET_CHARS`] characters of the pretty-printed document.
fn document_snippet(document: &serde_json::Value) -> String {
    let dump = serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string());
    dump.chars().take(SNIPPET_CHARS).collect()
}
