//! In-crate fakes for the language-model and search capabilities.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{CapabilityError, GenerationRequest, LanguageModel, RawSearchResult, SearchProvider};

type Reply = dyn Fn(&GenerationRequest) -> Result<String, CapabilityError> + Send + Sync;

pub(crate) struct ScriptedModel {
    reply: Box<Reply>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub(crate) fn with<F>(reply: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<String, CapabilityError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(text: &'static str) -> Self {
        Self::with(move |_| Ok(text.to_string()))
    }

    pub(crate) fn failing() -> Self {
        Self::with(|_| {
            Err(CapabilityError::Api {
                status: 503,
                message: "upstream unavailable".into(),
            })
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_user_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .ok()?
            .last()
            .map(|request| request.user.clone())
    }

    pub(crate) fn last_system_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .ok()?
            .last()
            .map(|request| request.system.clone())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.reply)(&request);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        reply
    }
}

/// Search fake keyed by exact query text; unknown queries return no results.
#[derive(Default)]
pub(crate) struct StaticSearch {
    results: HashMap<String, Vec<RawSearchResult>>,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, query: &str, results: Vec<RawSearchResult>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    pub(crate) fn failing_on(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(
        &self,
        query: &str,
        _max_results: usize,
    ) -> Result<Vec<RawSearchResult>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|failing| failing == query) {
            return Err(CapabilityError::Transport("connection reset".into()));
        }
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }
}

pub(crate) fn raw(url: &str, score: f64) -> RawSearchResult {
    RawSearchResult {
        title: format!("Article at {url}"),
        content: format!("Body text published at {url}"),
        url: url.to_string(),
        score,
    }
}
