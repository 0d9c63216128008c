//! Upstream Q&A platform client.
//!
//! [`ThreadSource`] is the seam the orchestrator fetches through; [`EdClient`]
//! implements it against the platform's REST API with bearer-token auth.
//! Threads are returned as raw JSON because their shape varies by API
//! version (see [`crate::fields`]).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::UpstreamConfig;

/// A paginated source of raw threads, newest first.
#[async_trait]
pub trait ThreadSource: Send + Sync {
    /// Authenticate against the platform. Called at the start of every run.
    async fn login(&self) -> Result<()>;

    /// Fetch one page of threads for a course, sorted newest first.
    async fn list_threads(&self, course_id: u64, limit: u32, offset: u32) -> Result<Vec<Value>>;
}

pub struct EdClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl EdClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            client,
            base_url,
            token: config.api_token.clone(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("upstream API error {} for {}: {}", status, path, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("invalid JSON from {}", path))
    }
}

#[async_trait]
impl ThreadSource for EdClient {
    async fn login(&self) -> Result<()> {
        let user = self.get_json("user", &[]).await.context("login failed")?;
        let name = user
            .pointer("/user/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown user");
        tracing::info!("Authenticated with upstream API as {}", name);
        Ok(())
    }

    async fn list_threads(&self, course_id: u64, limit: u32, offset: u32) -> Result<Vec<Value>> {
        let path = format!("courses/{}/threads", course_id);
        let query = [
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("sort", "new".to_string()),
        ];
        let body = self.get_json(&path, &query).await?;
        parse_threads(body)
    }
}

/// Extract the `threads` array from a listing response.
pub fn parse_threads(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Object(mut map) => match map.remove("threads") {
            Some(Value::Array(threads)) => Ok(threads),
            Some(other) => bail!("unexpected `threads` value: {}", other),
            None => bail!("thread listing has no `threads` field"),
        },
        Value::Array(threads) => Ok(threads),
        other => bail!("unexpected thread listing: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn threads_are_read_from_wrapper_object() {
        let threads = parse_threads(json!({"threads": [{"id": 1}, {"id": 2}], "users": []})).unwrap();
        assert_eq!(threads.len(), 2);
    }

    #[test]
    fn bare_array_is_accepted() {
        assert_eq!(parse_threads(json!([{"id": 1}])).unwrap().len(), 1);
    }

    #[test]
    fn malformed_listing_is_an_error() {
        assert!(parse_threads(json!({"users": []})).is_err());
        assert!(parse_threads(json!({"threads": 3})).is_err());
        assert!(parse_threads(json!("nope")).is_err());
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = EdClient::new(&UpstreamConfig {
            api_token: "t".into(),
            course_id: 1,
            base_url: "https://example.test/api".into(),
        })
        .unwrap();
        assert_eq!(client.base_url, "https://example.test/api/");
    }
}
