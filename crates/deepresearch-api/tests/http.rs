use std::sync::Arc;

use async_trait::async_trait;
use axum_test::TestServer;
use deepresearch_api::{routes::build_router, state::AppState};
use deepresearch_core::{
    Capabilities, CapabilityError, Config, GenerationRequest, LanguageModel, MockSearch,
    RawSearchResult, SearchProvider, SearchProviderKind,
};
use serde_json::{Value, json};

/// Answers every prompt with a canned reply chosen by schema name.
struct CannedModel;

#[async_trait]
impl LanguageModel for CannedModel {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, CapabilityError> {
        let schema = request.response_schema.as_ref().map(|s| s.name.as_str());
        Ok(match schema {
            Some("planner_decision") if request.user.contains("No previous steps.") => {
                r#"{"search_queries":["rust web frameworks comparison"],"is_complete":false}"#
            }
            Some("planner_decision") => r#"{"search_queries":[],"is_complete":true}"#,
            Some("fact_extraction") => {
                r#"{"facts":["Axum is built on hyper and tower","Actix uses an actor runtime"],"is_relevant":true}"#
            }
            Some("critique") => r#"{"approved":true,"feedback":"Well cited and complete."}"#,
            _ => "# Rust Web Frameworks\n\n## Executive Summary\nAxum builds on tower [Source: https://mock-source.com/article/1].",
        }
        .to_string())
    }
}

/// A live-looking provider that never returns anything.
struct SilentSearch;

#[async_trait]
impl SearchProvider for SilentSearch {
    fn name(&self) -> &str {
        "silent"
    }

    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<Vec<RawSearchResult>, CapabilityError> {
        Ok(Vec::new())
    }
}

fn config(max_concurrent_runs: usize) -> Config {
    let mut config = Config::default();
    config.search.provider = SearchProviderKind::Mock;
    config.server.max_concurrent_runs = max_concurrent_runs;
    config
}

fn state(max_concurrent_runs: usize) -> AppState {
    let capabilities = Capabilities::new(
        Arc::new(CannedModel),
        Arc::new(CannedModel),
        Arc::new(MockSearch::new()),
    );
    AppState::new(&config(max_concurrent_runs), capabilities)
}

fn sse_frames(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut kind = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    kind = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data = serde_json::from_str(rest.trim()).ok();
                }
            }
            Some((kind?, data?))
        })
        .collect()
}

#[tokio::test]
async fn health_reports_version() {
    let server = TestServer::new(build_router(state(2))).unwrap();

    let response = server.get("/api/v1/health").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn status_reports_ceilings_and_models() {
    let server = TestServer::new(build_router(state(2))).unwrap();

    let body: Value = server.get("/api/v1/research/status").await.json();
    assert_eq!(body["max_iterations"], 5);
    assert_eq!(body["max_critique_loops"], 3);
    assert_eq!(body["reasoning_model"], "gpt-4o");
    assert_eq!(body["fast_model"], "gpt-4o-mini");
    assert_eq!(body["search_mock_mode"], true);
}

#[tokio::test]
async fn root_points_at_versioned_api() {
    let server = TestServer::new(build_router(state(2))).unwrap();

    let body: Value = server.get("/").await.json();
    assert_eq!(body["api"], "/api/v1");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let unversioned = server.get("/health").expect_failure().await;
    assert_eq!(unversioned.status_code(), 404);
}

#[tokio::test]
async fn status_reflects_injected_search_provider() {
    let capabilities = Capabilities::new(
        Arc::new(CannedModel),
        Arc::new(CannedModel),
        Arc::new(SilentSearch),
    );
    let server = TestServer::new(build_router(AppState::new(&config(2), capabilities))).unwrap();

    let body: Value = server.get("/api/v1/research/status").await.json();
    assert_eq!(body["search_mock_mode"], false);
}

#[tokio::test]
async fn short_query_is_rejected() {
    let server = TestServer::new(build_router(state(2))).unwrap();

    let response = server
        .post("/api/v1/research")
        .json(&json!({ "query": "too short" }))
        .expect_failure()
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid research request");
    assert!(body["detail"].as_str().unwrap_or_default().contains("at least 10"));
}

#[tokio::test]
async fn research_streams_ordered_events() {
    let server = TestServer::new(build_router(state(2))).unwrap();

    let response = server
        .post("/api/v1/research")
        .json(&json!({ "query": "Compare the major Rust web frameworks" }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("x-accel-buffering"), "no");

    let frames = sse_frames(&response.text());
    let kinds: Vec<&str> = frames.iter().map(|(kind, _)| kind.as_str()).collect();
    assert_eq!(kinds.first(), Some(&"status_update"));
    assert_eq!(kinds.last(), Some(&"run_complete"));
    assert!(kinds.contains(&"queries_proposed"));
    assert!(kinds.contains(&"facts_extracted"));
    assert!(kinds.contains(&"critique_result"));

    let (_, complete) = frames.last().expect("terminal frame");
    assert_eq!(complete["kind"], "run_complete");
    assert_eq!(complete["data"]["facts_count"], 2);
    assert_eq!(complete["data"]["sources_count"], 1);
    assert_eq!(complete["data"]["iterations"], 1);
}

#[tokio::test]
async fn saturated_capacity_returns_429() {
    let state = state(1);
    let _held = state.acquire_run_permit().expect("first slot");
    let server = TestServer::new(build_router(state.clone())).unwrap();

    let response = server
        .post("/api/v1/research")
        .json(&json!({ "query": "Compare the major Rust web frameworks" }))
        .expect_failure()
        .await;
    assert_eq!(response.status_code(), 429);
    assert_eq!(state.available_permits(), 0);
}
