use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{BulkItemFailure, Document, DocumentSource};
use crate::bulk::DeleteAction;
use crate::config::{Credentials, IndexConfig};
use crate::error::{BulkSubmitError, ConfigError, FetchError, RefreshError, RequestError};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// HTTP client for an OpenSearch-compatible cluster. Covers exactly the three
/// operations this job needs: a scroll-paged scan, a bulk delete, a refresh.
/// Nothing is retried; retry policy belongs to the operator.
pub struct IndexClient {
    client: Client,
    base_url: Url,
    credentials: Option<Credentials>,
    batch_size: u32,
    keep_alive: String,
}

impl IndexClient {
    pub fn new(config: &IndexConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            credentials: config.credentials.clone(),
            batch_size: config.batch_size,
            keep_alive: config.keep_alive.clone(),
        })
    }

    /// Start a scan over every document in `index`. Pages are fetched lazily
    /// as the returned source is consumed.
    pub fn scan(&self, index: &str) -> DocumentScan<'_> {
        DocumentScan {
            client: self,
            index: index.to_string(),
            scroll_id: None,
            finished: false,
        }
    }

    /// Submit one batch of delete actions. Returns the per-action failures
    /// the cluster reported; a failure to submit or decode the request at
    /// all is an error instead.
    pub async fn bulk_delete(
        &self,
        index: &str,
        actions: &[DeleteAction],
    ) -> Result<Vec<BulkItemFailure>, BulkSubmitError> {
        self.bulk_delete_inner(actions)
            .await
            .map_err(|source| BulkSubmitError {
                index: index.to_string(),
                source,
            })
    }

    /// Force a refresh so reads observe the deletions immediately.
    pub async fn refresh(&self, index: &str) -> Result<(), RefreshError> {
        self.refresh_inner(index)
            .await
            .map_err(|source| RefreshError {
                index: index.to_string(),
                source,
            })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some(credentials) => {
                builder.basic_auth(&credentials.user, Some(&credentials.password))
            }
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RequestError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::Status { status, body });
        }

        Ok(response)
    }

    async fn initial_page(&self, index: &str) -> Result<ScanPage, RequestError> {
        let url = self.base_url.join(&format!("{index}/_search"))?;
        let body = SearchRequest {
            size: self.batch_size,
            query: Query {
                match_all: MatchAll {},
            },
        };

        let response = self
            .send(
                self.request(Method::POST, url)
                    .query(&[
                        ("scroll", self.keep_alive.as_str()),
                        ("ignore_unavailable", "true"),
                    ])
                    .json(&body),
            )
            .await?;
        let decoded: ScanResponse = response.json().await?;

        Ok(decoded.into())
    }

    async fn next_page(&self, scroll_id: &str) -> Result<ScanPage, RequestError> {
        let url = self.base_url.join("_search/scroll")?;
        let body = ScrollRequest {
            scroll: &self.keep_alive,
            scroll_id,
        };

        let response = self.send(self.request(Method::POST, url).json(&body)).await?;
        let decoded: ScanResponse = response.json().await?;

        Ok(decoded.into())
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), RequestError> {
        let url = self.base_url.join("_search/scroll")?;
        let body = ClearScrollRequest {
            scroll_id: vec![scroll_id.to_string()],
        };

        self.send(self.request(Method::DELETE, url).json(&body))
            .await?;

        Ok(())
    }

    async fn bulk_delete_inner(
        &self,
        actions: &[DeleteAction],
    ) -> Result<Vec<BulkItemFailure>, RequestError> {
        let url = self.base_url.join("_bulk")?;

        let mut body = String::new();
        for action in actions {
            let command = BulkCommand {
                delete: BulkDeleteRef {
                    index: &action.index,
                    id: &action.id,
                },
            };
            body.push_str(&serde_json::to_string(&command)?);
            body.push('\n');
        }

        let response = self
            .send(
                self.request(Method::POST, url)
                    .header(reqwest::header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
                    .body(body),
            )
            .await?;
        let decoded: BulkResponse = response.json().await?;

        let mut failures = Vec::new();
        for item in decoded.items {
            let Some(result) = item.delete else { continue };
            if let Some(error) = result.error {
                failures.push(BulkItemFailure {
                    id: result.id,
                    status: result.status,
                    reason: error.describe(),
                });
            }
        }

        Ok(failures)
    }

    async fn refresh_inner(&self, index: &str) -> Result<(), RequestError> {
        let url = self.base_url.join(&format!("{index}/_refresh"))?;
        self.send(self.request(Method::POST, url)).await?;

        Ok(())
    }
}

/// One in-flight scroll scan. The scroll context is cleared best-effort once
/// the last page has been read.
pub struct DocumentScan<'a> {
    client: &'a IndexClient,
    index: String,
    scroll_id: Option<String>,
    finished: bool,
}

#[async_trait]
impl DocumentSource for DocumentScan<'_> {
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>, FetchError> {
        if self.finished {
            return Ok(None);
        }

        let page = match &self.scroll_id {
            None => self.client.initial_page(&self.index).await,
            Some(scroll_id) => self.client.next_page(scroll_id).await,
        }
        .map_err(|source| FetchError::Request {
            index: self.index.clone(),
            source,
        })?;

        if page.documents.is_empty() {
            self.finished = true;
            let stored = self.scroll_id.take();
            if let Some(scroll_id) = page.scroll_id.or(stored) {
                if let Err(error) = self.client.clear_scroll(&scroll_id).await {
                    debug!("failed to clear the scroll context: {error}");
                }
            }
            return Ok(None);
        }

        match page.scroll_id {
            Some(scroll_id) => self.scroll_id = Some(scroll_id),
            None => {
                return Err(FetchError::MissingScrollId {
                    index: self.index.clone(),
                })
            }
        }

        Ok(Some(page.documents))
    }
}

#[derive(Serialize)]
struct SearchRequest {
    size: u32,
    query: Query,
}

#[derive(Serialize)]
struct Query {
    match_all: MatchAll,
}

#[derive(Serialize)]
struct MatchAll {}

#[derive(Serialize)]
struct ScrollRequest<'a> {
    scroll: &'a str,
    scroll_id: &'a str,
}

#[derive(Serialize)]
struct ClearScrollRequest {
    scroll_id: Vec<String>,
}

#[derive(Deserialize)]
struct ScanResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    #[serde(default)]
    hits: ScanHits,
}

#[derive(Deserialize, Default)]
struct ScanHits {
    #[serde(default)]
    hits: Vec<Document>,
}

struct ScanPage {
    scroll_id: Option<String>,
    documents: Vec<Document>,
}

impl From<ScanResponse> for ScanPage {
    fn from(response: ScanResponse) -> Self {
        Self {
            scroll_id: response.scroll_id,
            documents: response.hits.hits,
        }
    }
}

#[derive(Serialize)]
struct BulkCommand<'a> {
    delete: BulkDeleteRef<'a>,
}

#[derive(Serialize)]
struct BulkDeleteRef<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<BulkResponseItem>,
}

#[derive(Deserialize)]
struct BulkResponseItem {
    delete: Option<BulkItemResult>,
}

#[derive(Deserialize)]
struct BulkItemResult {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    status: u16,
    error: Option<BulkItemError>,
}

#[derive(Deserialize)]
struct BulkItemError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    reason: Option<String>,
}

impl BulkItemError {
    fn describe(self) -> String {
        match self.reason {
            Some(reason) if !reason.is_empty() => format!("{}: {reason}", self.kind),
            _ => self.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::MockServer;
    use serde_json::json;

    use super::*;

    fn config(server: &MockServer) -> IndexConfig {
        IndexConfig {
            base_url: Url::parse(&server.base_url()).unwrap(),
            credentials: None,
            timeout: Duration::from_secs(5),
            batch_size: 2,
            keep_alive: "1m".to_string(),
        }
    }

    fn hit(id: &str, build_id: &str) -> serde_json::Value {
        json!({"_id": id, "_source": {"job": {"build_id": build_id}}})
    }

    #[tokio::test]
    async fn scan_pages_until_the_cluster_returns_an_empty_page() {
        let server = MockServer::start();
        let initial = server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/jobs/_search");
            then.status(200).json_body(json!({
                "_scroll_id": "scroll-1",
                "hits": {"hits": [hit("1", "A"), hit("2", "B")]}
            }));
        });
        let second = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/_search/scroll")
                .body_contains("scroll-1");
            then.status(200).json_body(json!({
                "_scroll_id": "scroll-2",
                "hits": {"hits": [hit("3", "A")]}
            }));
        });
        let last = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/_search/scroll")
                .body_contains("scroll-2");
            then.status(200).json_body(json!({
                "_scroll_id": "scroll-2",
                "hits": {"hits": []}
            }));
        });
        let clear = server.mock(|when, then| {
            when.method(httpmock::Method::DELETE).path("/_search/scroll");
            then.status(200).json_body(json!({"succeeded": true}));
        });

        let client = IndexClient::new(&config(&server)).unwrap();
        let mut scan = client.scan("jobs");

        let first_batch = scan.next_batch().await.unwrap().unwrap();
        assert_eq!(first_batch.len(), 2);
        let second_batch = scan.next_batch().await.unwrap().unwrap();
        assert_eq!(second_batch[0].id, "3");
        assert!(scan.next_batch().await.unwrap().is_none());
        // the scan stays exhausted
        assert!(scan.next_batch().await.unwrap().is_none());

        assert_eq!(initial.hits(), 1);
        assert_eq!(second.hits(), 1);
        assert_eq!(last.hits(), 1);
        assert_eq!(clear.hits(), 1);
    }

    #[tokio::test]
    async fn scan_surfaces_a_failed_page_fetch() {
        let server = MockServer::start();
        let _initial = server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/jobs/_search");
            then.status(503).body("scan unavailable");
        });

        let client = IndexClient::new(&config(&server)).unwrap();
        let mut scan = client.scan("jobs");

        let error = scan.next_batch().await.unwrap_err();
        assert!(matches!(error, FetchError::Request { .. }));
    }

    #[tokio::test]
    async fn bulk_delete_collects_per_item_failures() {
        let server = MockServer::start();
        let bulk = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/_bulk")
                .header("content-type", NDJSON_CONTENT_TYPE)
                .body_contains(r#""_id":"3""#)
                .body_contains(r#""_id":"4""#);
            then.status(200).json_body(json!({
                "errors": true,
                "items": [
                    {"delete": {"_id": "3", "status": 200}},
                    {"delete": {"_id": "4", "status": 409, "error": {
                        "type": "version_conflict_engine_exception",
                        "reason": "document changed"
                    }}}
                ]
            }));
        });

        let client = IndexClient::new(&config(&server)).unwrap();
        let actions = vec![DeleteAction::new("jobs", "3"), DeleteAction::new("jobs", "4")];
        let failures = client.bulk_delete("jobs", &actions).await.unwrap();

        assert_eq!(bulk.hits(), 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, "4");
        assert_eq!(failures[0].status, 409);
        assert!(failures[0].reason.contains("version_conflict"));
    }

    #[tokio::test]
    async fn requests_carry_basic_auth_when_configured() {
        let server = MockServer::start();
        let refresh = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/jobs/_refresh")
                .header_exists("authorization");
            then.status(200).json_body(json!({"_shards": {"failed": 0}}));
        });

        let mut with_auth = config(&server);
        with_auth.credentials = Some(Credentials {
            user: "scanner".to_string(),
            password: "secret".to_string(),
        });
        let client = IndexClient::new(&with_auth).unwrap();

        client.refresh("jobs").await.unwrap();
        assert_eq!(refresh.hits(), 1);
    }
}
