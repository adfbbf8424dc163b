use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::Stage;
use crate::{
    FactStore, GenerationRequest, LanguageModel, StageError, StageId, StateUpdate, WorkflowState,
};

const SYSTEM_PROMPT: &str = "You are a senior research analyst writing a comprehensive report \
in Markdown. Use exactly this structure:

# <Report title>
## Executive Summary
## Key Findings
(group findings by theme, one subsection per theme)
## Analysis & Insights
## Conclusions & Recommendations
## Sources

Every factual claim must be attributed inline in the form [Source: URL], using only the \
sources listed in the evidence. Do not invent facts or sources that are not in the evidence.";

pub struct Writer {
    model: Arc<dyn LanguageModel>,
}

impl Writer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

fn user_prompt(state: &WorkflowState) -> String {
    let mut prompt = format!(
        "Research task: {}\n\nEvidence:\n{}\n\nWrite the report.",
        state.task(),
        numbered_evidence(&state.gathered_facts)
    );
    if !state.critique_feedback.trim().is_empty() {
        prompt.push_str("\n\nCRITICAL FEEDBACK FROM PREVIOUS DRAFT:\n");
        prompt.push_str(&state.critique_feedback);
        prompt.push_str("\n\nAddress every one of these issues in your revised report.");
    }
    prompt
}

fn numbered_evidence(facts: &FactStore) -> String {
    if facts.is_empty() {
        return "No facts available.".to_string();
    }
    facts
        .iter()
        .enumerate()
        .map(|(idx, fact)| format!("[{}] {} (Source: {})", idx + 1, fact.content, fact.source))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Stage for Writer {
    fn id(&self) -> StageId {
        StageId::Writer
    }

    #[instrument(name = "stage.writer", skip_all, fields(facts = state.gathered_facts.len()))]
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, StageError> {
        let revision = !state.critique_feedback.trim().is_empty();
        let report = self
            .model
            .generate(GenerationRequest::new(SYSTEM_PROMPT, user_prompt(state)))
            .await
            .map_err(|err| StageError::new(StageId::Writer, err))?;

        info!(revision, chars = report.len(), "report drafted");
        Ok(StateUpdate {
            report: Some(report),
            ..StateUpdate::default()
        })
    }
}
