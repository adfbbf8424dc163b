use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, instrument};

use super::Stage;
use crate::{
    CritiqueVerdict, FactStore, LanguageModel, StageError, StageId, StateUpdate, WorkflowState,
    generate_structured,
};

const SYSTEM_PROMPT: &str = "You are a rigorous research reviewer. Evaluate the report against \
the evidence on five criteria:
1. Factual accuracy: every claim is grounded in the evidence.
2. Citation quality: every claim carries a [Source: URL] attribution.
3. Task alignment: the report answers the research task.
4. Completeness: no important aspect of the evidence is missing.
5. Clarity: the report is well structured and readable.
Approve only if there are no critical issues. Otherwise give specific, actionable feedback.";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct Critique {
    pub approved: bool,
    pub feedback: String,
}

pub struct Reviewer {
    model: Arc<dyn LanguageModel>,
}

impl Reviewer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

fn evidence(facts: &FactStore) -> String {
    if facts.is_empty() {
        return "No context provided.".to_string();
    }
    facts
        .iter()
        .map(|fact| format!("- {} ({})", fact.content, fact.source))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Stage for Reviewer {
    fn id(&self) -> StageId {
        StageId::Reviewer
    }

    #[instrument(name = "stage.reviewer", skip_all, fields(pass = state.critique_count + 1))]
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, StageError> {
        let prompt = format!(
            "Research task: {}\n\nEvidence:\n{}\n\nReport to review:\n{}",
            state.task(),
            evidence(&state.gathered_facts),
            state.report_content
        );
        let critique: Critique =
            generate_structured(self.model.as_ref(), "critique", SYSTEM_PROMPT, prompt)
                .await
                .map_err(|err| StageError::new(StageId::Reviewer, err))?;

        info!(approved = critique.approved, "report reviewed");
        Ok(StateUpdate {
            critique: Some(CritiqueVerdict {
                approved: critique.approved,
                feedback: critique.feedback,
            }),
            ..StateUpdate::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CapabilityError;
    use crate::test_support::ScriptedModel;

    #[tokio::test]
    async fn verdict_is_returned_as_update() {
        let model = Arc::new(ScriptedModel::replying(
            r#"{"approved":false,"feedback":"Add citations to the second theme."}"#,
        ));
        let mut state = WorkflowState::new("What are emerging AI PM skills for 2025?");
        state.report_content = "# Draft".into();

        let update = Reviewer::new(model.clone()).run(&state).await.expect("review");

        assert_eq!(
            update.critique,
            Some(CritiqueVerdict {
                approved: false,
                feedback: "Add citations to the second theme.".into(),
            })
        );
        let prompt = model.last_user_prompt().expect("prompt");
        assert!(prompt.contains("No context provided."));
        assert!(prompt.contains("# Draft"));
    }

    #[tokio::test]
    async fn malformed_verdict_is_fatal() {
        let model = Arc::new(ScriptedModel::replying("looks fine to me"));
        let state = WorkflowState::new("What are emerging AI PM skills for 2025?");

        let err = Reviewer::new(model).run(&state).await.unwrap_err();
        assert_eq!(err.stage, StageId::Reviewer);
        assert!(matches!(err.source, CapabilityError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn verdict_without_feedback_is_fatal() {
        let model = Arc::new(ScriptedModel::replying(r#"{"approved":false}"#));
        let mut state = WorkflowState::new("What are emerging AI PM skills for 2025?");
        state.report_content = "# Draft".into();

        let err = Reviewer::new(model).run(&state).await.unwrap_err();
        assert_eq!(err.stage, StageId::Reviewer);
        assert!(matches!(err.source, CapabilityError::MalformedOutput(_)));
    }
}
