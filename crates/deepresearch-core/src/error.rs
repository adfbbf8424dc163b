use std::path::PathBuf;

use thiserror::Error;

use crate::StageId;

/// Core error type for DeepResearch.
#[derive(Debug, Error)]
pub enum DeepResearchError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid research task: {0}")]
    InvalidTask(String),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeepResearchError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }
}

/// Failure reported by a language model or search provider.
///
/// Whether a failure is fatal depends on the tier that produced it, not on the variant.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed structured output: {0}")]
    MalformedOutput(String),
    #[error("capability misconfigured: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for CapabilityError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Api {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        Self::Transport(err.to_string())
    }
}

/// A run-fatal failure raised inside a stage.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: StageId,
    #[source]
    pub source: CapabilityError,
}

impl StageError {
    pub fn new(stage: StageId, source: CapabilityError) -> Self {
        Self { stage, source }
    }
}
