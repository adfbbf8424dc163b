#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use deepresearch_core::{CapabilityError, GenerationRequest, LanguageModel};

type Handler = dyn Fn(&str, &GenerationRequest) -> Result<String, CapabilityError> + Send + Sync;

/// Language model fake that dispatches on the requested schema name
/// (`"text"` when no schema is attached) and records every prompt.
pub struct RoutedModel {
    handler: Box<Handler>,
    calls: Mutex<Vec<(String, String)>>,
    count: AtomicUsize,
}

impl RoutedModel {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &GenerationRequest) -> Result<String, CapabilityError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        }
    }

    pub fn calls_for(&self, schema: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|(name, _)| name == schema)
            .count()
    }

    pub fn prompts_for(&self, schema: &str) -> Vec<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|(name, _)| name == schema)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for RoutedModel {
    fn model_name(&self) -> &str {
        "routed-fake"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, CapabilityError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let schema = request
            .response_schema
            .as_ref()
            .map(|schema| schema.name.clone())
            .unwrap_or_else(|| "text".to_string());
        let reply = (self.handler)(&schema, &request);
        self.calls
            .lock()
            .expect("calls lock")
            .push((schema, request.user));
        reply
    }
}

pub const CITED_REPORT: &str = "# AI PM Skills 2025\n\n## Executive Summary\nPMs need AI literacy [Source: https://mock-source.com/article/1].\n\n## Sources\n- https://mock-source.com/article/1";

pub fn two_facts() -> String {
    r#"{"facts":["AI PMs must evaluate model quality with offline metrics","Prompt design is a core AI PM skill"],"is_relevant":true}"#.to_string()
}
