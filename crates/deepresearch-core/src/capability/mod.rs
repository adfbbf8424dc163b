//! External collaborators consumed by the stages: two language-model tiers and a search provider.

mod llm;
mod search;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

pub use llm::{
    GenerationRequest, LanguageModel, OpenAiChatModel, ResponseSchema, generate_structured,
};
pub use search::{MockSearch, SearchProvider, TavilySearch};

use crate::{CapabilityError, Config, DeepResearchError, SearchProviderKind, require_env};

/// Handles to every capability a run needs.
///
/// `reasoning` serves the planner, writer and reviewer; `fast` serves the distiller.
#[derive(Clone)]
pub struct Capabilities {
    pub reasoning: Arc<dyn LanguageModel>,
    pub fast: Arc<dyn LanguageModel>,
    pub search: Arc<dyn SearchProvider>,
}

impl Capabilities {
    pub fn new(
        reasoning: Arc<dyn LanguageModel>,
        fast: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            reasoning,
            fast,
            search,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, DeepResearchError> {
        let provider = config.llm.provider.to_ascii_lowercase();
        if provider != "openai" && provider != "openai-compatible" {
            return Err(DeepResearchError::InvalidConfiguration(format!(
                "unsupported llm.provider: {}",
                config.llm.provider
            )));
        }

        let api_key = require_env(&config.llm.api_key_env)?;
        let timeout = Duration::from_secs(config.llm.request_timeout_secs);
        let reasoning = OpenAiChatModel::new(
            &config.llm.base_url,
            &config.llm.reasoning_model,
            api_key.clone(),
            timeout,
        )
        .map_err(capability_config_error)?;
        let fast = OpenAiChatModel::new(&config.llm.base_url, &config.llm.fast_model, api_key, timeout)
            .map_err(capability_config_error)?;

        let search: Arc<dyn SearchProvider> = match (config.search.provider, config.search_api_key()) {
            (SearchProviderKind::Mock, _) => {
                info!("search provider set to mock");
                Arc::new(MockSearch::new())
            }
            (SearchProviderKind::Tavily, Some(key)) => Arc::new(
                TavilySearch::new(
                    &config.search.base_url,
                    key,
                    &config.search.search_depth,
                    Duration::from_secs(config.search.request_timeout_secs),
                )
                .map_err(capability_config_error)?,
            ),
            (SearchProviderKind::Tavily, None) => {
                warn!(
                    env = %config.search.api_key_env,
                    "search API key not set; falling back to mock search"
                );
                Arc::new(MockSearch::new())
            }
        };

        Ok(Self::new(Arc::new(reasoning), Arc::new(fast), search))
    }
}

fn capability_config_error(err: CapabilityError) -> DeepResearchError {
    DeepResearchError::InvalidConfiguration(err.to_string())
}
