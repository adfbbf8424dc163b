use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::Stage;
use crate::{
    FactStore, LanguageModel, StageError, StageId, StateUpdate, StepLog, WorkflowState,
    generate_structured,
};

fn system_prompt(max_queries: usize) -> String {
    format!(
        "You are a research strategist planning web searches. \
Given the research task, the facts gathered so far and the searches already performed, \
decide whether the evidence is sufficient to write a comprehensive report. \
If it is not, propose up to {max_queries} new, specific search queries that fill the remaining gaps. \
Never repeat a query that already appears in the previous steps. \
Set is_complete to true once the facts cover the task well enough."
    )
}

/// Structured decision requested from the reasoning tier.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PlannerDecision {
    pub search_queries: Vec<String>,
    pub is_complete: bool,
}

pub struct Planner {
    model: Arc<dyn LanguageModel>,
    system_prompt: String,
    max_iterations: u32,
    max_queries: usize,
    preview_chars: usize,
}

impl Planner {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        max_iterations: u32,
        max_queries: usize,
        preview_chars: usize,
    ) -> Self {
        Self {
            model,
            system_prompt: system_prompt(max_queries),
            max_iterations,
            max_queries,
            preview_chars,
        }
    }

    fn user_prompt(&self, state: &WorkflowState) -> String {
        format!(
            "Research task: {task}\n\n\
             Iteration: {iteration}/{max}\n\n\
             Facts gathered so far:\n{facts}\n\n\
             Previous search steps:\n{steps}\n\n\
             Decide whether more searching is needed.",
            task = state.task(),
            iteration = state.iteration_count,
            max = self.max_iterations,
            facts = compress_facts(&state.gathered_facts, self.preview_chars),
            steps = serialize_steps(&state.past_steps),
        )
    }

    fn finalize_plan(&self, decision: PlannerDecision) -> Vec<String> {
        if decision.is_complete {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        decision
            .search_queries
            .into_iter()
            .map(|query| query.trim().to_string())
            .filter(|query| !query.is_empty() && seen.insert(query.clone()))
            .take(self.max_queries)
            .collect()
    }
}

#[async_trait]
impl Stage for Planner {
    fn id(&self) -> StageId {
        StageId::Planner
    }

    #[instrument(name = "stage.planner", skip_all, fields(iteration = state.iteration_count))]
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, StageError> {
        if state.iteration_count >= self.max_iterations {
            info!(
                max_iterations = self.max_iterations,
                "iteration ceiling reached; proceeding to synthesis"
            );
            return Ok(StateUpdate::with_plan(Vec::new()));
        }

        let decision: PlannerDecision = generate_structured(
            self.model.as_ref(),
            "planner_decision",
            self.system_prompt.as_str(),
            self.user_prompt(state),
        )
        .await
        .map_err(|err| StageError::new(StageId::Planner, err))?;

        debug!(
            proposed = decision.search_queries.len(),
            is_complete = decision.is_complete,
            "planner decision received"
        );
        let plan = self.finalize_plan(decision);
        info!(queries = plan.len(), "planner produced plan");
        Ok(StateUpdate::with_plan(plan))
    }
}

fn compress_facts(facts: &FactStore, preview_chars: usize) -> String {
    if facts.is_empty() {
        return "No facts gathered yet.".to_string();
    }
    facts
        .iter()
        .map(|fact| {
            format!(
                "- {} (Source: {})",
                preview(&fact.content, preview_chars),
                fact.source
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn serialize_steps(steps: &[StepLog]) -> String {
    if steps.is_empty() {
        return "No previous steps.".to_string();
    }
    serde_json::to_string(steps).unwrap_or_else(|_| {
        steps
            .iter()
            .map(|step| format!("{}: {}", step.query, step.outcome))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

/// First `limit` characters, with an ellipsis only when something was cut.
fn preview(content: &str, limit: usize) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
