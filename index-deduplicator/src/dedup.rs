use std::collections::HashSet;
use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::error::FetchError;
use crate::index::DocumentSource;

/// A dotted path into a document's stored fields, e.g. `job.build_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidFieldPath {
    #[error("comparison field path is empty")]
    Empty,
    #[error("comparison field path '{path}' contains an empty segment")]
    EmptySegment { path: String },
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, InvalidFieldPath> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(InvalidFieldPath::Empty);
        }

        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(InvalidFieldPath::EmptySegment {
                path: raw.to_string(),
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Why a document's comparison key could not be extracted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MissingKeyError {
    #[error("segment '{segment}' not found")]
    Missing { segment: String },
    #[error("segment '{segment}' cannot be descended into, the value above it is not a mapping")]
    NotAMapping { segment: String },
}

/// One document the scan could not classify. Collected, never raised on its
/// own mid-scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("document '{document_id}' has no value at '{path}': {error}")]
pub struct ExtractionFailure {
    pub document_id: String,
    pub path: String,
    pub error: MissingKeyError,
}

/// Walk `fields` along `path`, one segment at a time. The value at the final
/// segment is returned as-is, nested mappings included.
pub fn extract_key<'a>(path: &FieldPath, fields: &'a Value) -> Result<&'a Value, MissingKeyError> {
    let mut current = fields;

    for segment in path.segments() {
        let mapping = current.as_object().ok_or_else(|| MissingKeyError::NotAMapping {
            segment: segment.to_string(),
        })?;
        current = mapping.get(segment).ok_or_else(|| MissingKeyError::Missing {
            segment: segment.to_string(),
        })?;
    }

    Ok(current)
}

/// What a full scan found: every duplicate identifier and every extraction
/// failure, both in scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    pub duplicates: Vec<String>,
    pub failures: Vec<ExtractionFailure>,
    pub scanned: u64,
}

// Key values join the seen-set by their serialized JSON form; nested
// mappings take part in membership checks the same way scalars do.
fn key_fingerprint(value: &Value) -> String {
    value.to_string()
}

/// Single pass over the scan: the first document seen for each distinct key
/// value is retained, every later one is recorded as a duplicate.
///
/// "First" means first in scan order as delivered by the cluster, which is
/// not guaranteed stable across runs unless the caller sorts upstream.
///
/// A document whose key cannot be extracted is recorded as a failure and
/// skipped, without entering the seen-set and without aborting the scan.
pub async fn detect<S: DocumentSource>(
    source: &mut S,
    path: &FieldPath,
) -> Result<DedupOutcome, FetchError> {
    let mut seen = HashSet::new();
    let mut outcome = DedupOutcome::default();

    while let Some(batch) = source.next_batch().await? {
        for document in batch {
            outcome.scanned += 1;

            match extract_key(path, &document.fields) {
                Ok(value) => {
                    if !seen.insert(key_fingerprint(value)) {
                        outcome.duplicates.push(document.id);
                    }
                }
                Err(error) => {
                    warn!(
                        "failed to get the document '{}' comparison field '{path}' value: {error}",
                        document.id
                    );
                    outcome.failures.push(ExtractionFailure {
                        document_id: document.id,
                        path: path.as_str().to_string(),
                        error,
                    });
                }
            }
        }
    }

    Ok(outcome)
}
