use reqwest::StatusCode;
use thiserror::Error;

use crate::dedup::{ExtractionFailure, InvalidFieldPath};
use crate::index::BulkItemFailure;

/// Enumeration of error classes that terminate a deduplication run.
///
/// Per-document extraction failures are not here on their own: they are
/// collected over the whole scan and surface once, as
/// [`AggregatedExtractionError`].
#[derive(Error, Debug)]
pub enum DedupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] AggregatedExtractionError),
    #[error(transparent)]
    BulkSubmit(#[from] BulkSubmitError),
    #[error(transparent)]
    Bulk(#[from] AggregatedBulkError),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
}

/// A required setting is missing or unusable. Raised before any index access.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment configuration incomplete: {0}")]
    Incomplete(#[from] envconfig::Error),
    #[error("{name} must not be empty")]
    EmptySetting { name: &'static str },
    #[error("cannot interpret '{value}' as a boolean")]
    InvalidBool { value: String },
    #[error(transparent)]
    InvalidFieldPath(#[from] InvalidFieldPath),
    #[error("INDEX_USER and INDEX_PASSWORD must be provided together")]
    PartialCredentials,
    #[error("invalid index url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build the http client")]
    HttpClient(#[source] reqwest::Error),
}

/// Transport-level failure of a single request to the cluster.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("could not construct the request url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to encode the request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Send(#[from] reqwest::Error),
    #[error("cluster returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// The scan could not be issued or a page could not be read. Aborts the run
/// before any actions are built.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to scan index '{index}'")]
    Request {
        index: String,
        #[source]
        source: RequestError,
    },
    #[error("scan of index '{index}' returned no scroll id")]
    MissingScrollId { index: String },
}

/// One or more documents lacked the comparison field. Carries every failure
/// from the scan so operators see all malformed documents in one pass.
#[derive(Error, Debug)]
#[error("failed to extract the comparison key from {} document(s)", .failures.len())]
pub struct AggregatedExtractionError {
    pub failures: Vec<ExtractionFailure>,
}

/// The bulk delete request itself could not be submitted or decoded.
#[derive(Error, Debug)]
#[error("failed to submit the bulk delete request to index '{index}'")]
pub struct BulkSubmitError {
    pub index: String,
    #[source]
    pub source: RequestError,
}

/// The cluster rejected some of the delete actions in the batch. Raised only
/// after the refresh attempt, so the deletions that did succeed are visible.
#[derive(Error, Debug)]
#[error("{} of {attempted} delete action(s) failed", .failures.len())]
pub struct AggregatedBulkError {
    pub attempted: usize,
    pub failures: Vec<BulkItemFailure>,
}

/// The post-delete refresh failed. Raised even when every delete succeeded,
/// since reads may still observe the removed documents.
#[derive(Error, Debug)]
#[error("failed to refresh index '{index}'")]
pub struct RefreshError {
    pub index: String,
    #[source]
    pub source: RequestError,
}
