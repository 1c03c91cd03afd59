pub mod client;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::FetchError;

pub use client::{DocumentScan, IndexClient};

/// A single document as stored in the index: its identifier plus the stored
/// field mapping. Read-only for this job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub fields: Value,
}

/// Forward-only producer of the documents matched by one index scan.
///
/// A scan is consumed once, in the order the cluster delivers it; re-reading
/// the index means issuing a new scan.
#[async_trait]
pub trait DocumentSource: Send {
    /// The next page of documents, or `None` once the scan is exhausted.
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>, FetchError>;
}

/// One delete action the cluster rejected within an otherwise-submitted
/// bulk request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("delete of document '{id}' failed with status {status}: {reason}")]
pub struct BulkItemFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}
