use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::Stage;
use crate::{
    CapabilityError, Fact, LanguageModel, RawSearchResult, StageError, StageId, StateUpdate,
    WorkflowState, generate_structured, metrics,
};

const SYSTEM_PROMPT: &str = "You extract atomic, verifiable facts from source text for a research task.";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FactExtraction {
    pub facts: Vec<String>,
    pub is_relevant: bool,
}

/// Turns the pass's raw search results into new facts using the fast tier.
pub struct Distiller {
    model: Arc<dyn LanguageModel>,
}

impl Distiller {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

async fn extract(
    model: &dyn LanguageModel,
    task: &str,
    item: &RawSearchResult,
) -> Result<Vec<Fact>, CapabilityError> {
    let prompt = format!(
        "Analyze the following text regarding the user task: '{task}'.\n\n\
         Rules:\n\
         - Extract only atomic facts that help answer the task.\n\
         - Each fact must stand on its own and be a single claim.\n\
         - Prefer concrete data: numbers, dates, names, measured outcomes.\n\
         - Set is_relevant to false if the text does not address the task.\n\n\
         Source title: {title}\n\
         Text:\n{content}",
        title = item.title,
        content = item.content,
    );
    let extraction: FactExtraction =
        generate_structured(model, "fact_extraction", SYSTEM_PROMPT, prompt).await?;

    if !extraction.is_relevant {
        return Ok(Vec::new());
    }
    Ok(extraction
        .facts
        .into_iter()
        .filter(|fact| !fact.trim().is_empty())
        .map(|fact| Fact::new(fact, item.url.clone(), item.score))
        .collect())
}

#[async_trait]
impl Stage for Distiller {
    fn id(&self) -> StageId {
        StageId::Distill
    }

    #[instrument(name = "stage.distill", skip_all, fields(items = state.temp_raw_results.len()))]
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, StageError> {
        let handles: Vec<_> = state
            .temp_raw_results
            .iter()
            .cloned()
            .map(|item| {
                let model = Arc::clone(&self.model);
                let task = state.task().to_string();
                tokio::spawn(async move {
                    let outcome = extract(model.as_ref(), &task, &item).await;
                    (item.url, outcome)
                })
            })
            .collect();

        let mut candidates = Vec::new();
        for joined in join_all(handles).await {
            match joined {
                Ok((_, Ok(facts))) => candidates.extend(facts),
                Ok((url, Err(err))) => {
                    warn!(%url, error = %err, "fact extraction failed; skipping item");
                    metrics::record_capability_failure("fast");
                }
                Err(err) => {
                    warn!(error = %err, "fact extraction task aborted; skipping item");
                    metrics::record_capability_failure("fast");
                }
            }
        }

        let extracted = candidates.len();
        let new_facts = state.gathered_facts.filter_new(candidates);
        debug!(
            extracted,
            duplicates = extracted - new_facts.len(),
            "facts deduplicated"
        );
        info!(new_facts = new_facts.len(), "distill pass complete");

        Ok(StateUpdate {
            new_facts,
            raw_results: Some(Vec::new()),
            ..StateUpdate::default()
        })
    }
}
