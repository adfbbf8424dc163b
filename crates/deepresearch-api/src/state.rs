use std::sync::Arc;

use axum::http::StatusCode;
use deepresearch_core::{
    Capabilities, Config, DeepResearchError, ResearchWorkflow, WorkflowSettings,
};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::AppError;

/// Capability and ceiling settings reported by `GET /research/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchStatus {
    pub max_iterations: u32,
    pub max_critique_loops: u32,
    pub reasoning_model: String,
    pub fast_model: String,
    pub search_mock_mode: bool,
}

#[derive(Clone)]
pub struct AppState {
    workflow: Arc<ResearchWorkflow>,
    status: Arc<ResearchStatus>,
    run_permits: Arc<Semaphore>,
    cors_origins: Arc<Vec<String>>,
}

impl AppState {
    /// Build capabilities from configuration and environment secrets.
    pub fn try_new(config: &Config) -> Result<Self, DeepResearchError> {
        let capabilities = Capabilities::from_config(config)?;
        Ok(Self::new(config, capabilities))
    }

    pub fn new(config: &Config, capabilities: Capabilities) -> Self {
        let status = ResearchStatus {
            max_iterations: config.workflow.max_iterations,
            max_critique_loops: config.workflow.max_critique_loops,
            reasoning_model: config.llm.reasoning_model.clone(),
            fast_model: config.llm.fast_model.clone(),
            search_mock_mode: capabilities.search.name() == "mock",
        };
        Self {
            workflow: Arc::new(ResearchWorkflow::new(
                capabilities,
                WorkflowSettings::from(config),
            )),
            status: Arc::new(status),
            run_permits: Arc::new(Semaphore::new(config.server.max_concurrent_runs)),
            cors_origins: Arc::new(config.server.cors_origins.clone()),
        }
    }

    pub fn workflow(&self) -> Arc<ResearchWorkflow> {
        Arc::clone(&self.workflow)
    }

    pub fn status(&self) -> &ResearchStatus {
        &self.status
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.cors_origins
    }

    /// Reserve a run slot; the slot frees when the permit is dropped.
    pub fn acquire_run_permit(&self) -> Result<OwnedSemaphorePermit, AppError> {
        match Arc::clone(&self.run_permits).try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits) => Err(AppError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "research capacity reached; retry once a run finishes",
            )),
            Err(TryAcquireError::Closed) => Err(AppError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "research executor unavailable",
            )),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.run_permits.available_permits()
    }
}
