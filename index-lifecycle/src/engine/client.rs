//! HTTP client for the search engine REST API.

use super::{BulkSummary, LiveIndexState, PageRequest, SearchEngine, SearchPage};
use crate::config::EngineConfig;
use crate::utils::errors::{LifecycleError, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

pub struct EsClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    bulk_timeout: Duration,
}

impl EsClient {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            bulk_timeout: config.bulk_timeout(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.http.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_ref()),
            None => builder,
        }
    }

    /// Request for a call that works through a whole index server-side
    /// (reindex, bulk replay), allowed to outlast the default timeout.
    fn long_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path).timeout(self.bulk_timeout)
    }

    /// Turns any non-success status into [`LifecycleError::Upstream`].
    async fn expect_success(operation: &str, response: Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LifecycleError::upstream(operation, status.as_u16(), body));
        }
        Ok(response.json::<Value>().await?)
    }
}

impl SearchEngine for EsClient {
    async fn get_index(&self, index: &str) -> Result<Option<LiveIndexState>> {
        let response = self.request(Method::GET, index).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = Self::expect_success("get index", response).await?;
        // keyed by the concrete index name, which differs when `index` is an alias
        let entry = body
            .get(index)
            .or_else(|| body.as_object().and_then(|m| m.values().next()))
            .ok_or_else(|| LifecycleError::upstream("get index", 200, format!("no entry for {}", index)))?;

        Ok(Some(LiveIndexState::from_index_body(entry)))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        let response = self.request(Method::PUT, index).json(body).send().await?;
        Self::expect_success("create index", response).await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<bool> {
        let response = self.request(Method::DELETE, index).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::expect_success("delete index", response).await?;
        Ok(true)
    }

    async fn reindex(&self, source: &str, dest: &str) -> Result<()> {
        let body = json!({ "source": { "index": source }, "dest": { "index": dest } });
        let response = self
            .long_request(Method::POST, "_reindex?refresh=true")
            .json(&body)
            .send()
            .await?;
        let result = Self::expect_success("reindex", response).await?;

        match result.get("failures").and_then(Value::as_array) {
            Some(failures) if !failures.is_empty() => Err(LifecycleError::upstream(
                "reindex",
                200,
                Value::Array(failures.clone()).to_string(),
            )),
            _ => Ok(()),
        }
    }

    async fn open_pit(&self, index: &str, keep_alive: &str) -> Result<String> {
        let path = format!("{}/_pit?keep_alive={}", index, keep_alive);
        let response = self.request(Method::POST, &path).send().await?;
        let body = Self::expect_success("open point in time", response).await?;

        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LifecycleError::upstream("open point in time", 200, body.to_string()))
    }

    async fn search_page(&self, request: &PageRequest<'_>) -> Result<SearchPage> {
        let response = self
            .request(Method::POST, "_search")
            .json(&request.to_body())
            .send()
            .await?;
        let body = Self::expect_success("search", response).await?;
        SearchPage::from_response(&body)
    }

    async fn close_pit(&self, pit_id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, "_pit")
            .json(&json!({ "id": pit_id }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Point in time already expired");
            return Ok(());
        }
        Self::expect_success("close point in time", response).await?;
        Ok(())
    }

    async fn bulk(&self, payload: &str) -> Result<BulkSummary> {
        let response = self
            .long_request(Method::POST, "_bulk")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload.to_string())
            .send()
            .await?;
        let body = Self::expect_success("bulk", response).await?;
        Ok(BulkSummary::from_response(&body))
    }
}
