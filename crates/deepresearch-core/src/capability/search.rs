use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::{CapabilityError, RawSearchResult, SecretValue};

/// Web search backend returning scored candidate documents.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RawSearchResult>, CapabilityError>;
}

pub struct TavilySearch {
    client: Client,
    endpoint: String,
    api_key: SecretValue,
    search_depth: String,
}

impl TavilySearch {
    pub fn new(
        base_url: &str,
        api_key: SecretValue,
        search_depth: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CapabilityError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CapabilityError::Configuration(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/search", base_url.trim_end_matches('/')),
            api_key,
            search_depth: search_depth.into(),
        })
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    url: String,
    #[serde(default)]
    score: f64,
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    #[instrument(name = "search.tavily", skip(self))]
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RawSearchResult>, CapabilityError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&json!({
                "query": query,
                "search_depth": self.search_depth,
                "max_results": max_results,
                "include_answer": false,
                "include_raw_content": false,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: TavilyResponse = response
            .json()
            .await
            .map_err(|err| CapabilityError::MalformedOutput(err.to_string()))?;

        Ok(payload
            .results
            .into_iter()
            .map(|hit| RawSearchResult {
                title: hit.title,
                content: hit.content,
                url: hit.url,
                score: hit.score,
            })
            .collect())
    }
}

/// Offline provider: one stable, highly relevant result per query.
#[derive(Debug, Clone, Default)]
pub struct MockSearch;

impl MockSearch {
    pub fn new() -> Self {
        Self
    }

    fn article_id(query: &str) -> u64 {
        let digest = Sha256::digest(query.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix) % 10_000
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RawSearchResult>, CapabilityError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![RawSearchResult {
            title: format!("Research findings: {query}"),
            content: format!(
                "Mock search result for '{query}'. This source covers recent developments, \
                 expert perspectives and practical examples relevant to the query."
            ),
            url: format!("https://mock-source.com/article/{}", Self::article_id(query)),
            score: 0.95,
        }])
    }
}
