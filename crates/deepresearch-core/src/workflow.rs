//! Driver for the research state machine.
//!
//! The driver owns the [`WorkflowState`] for the whole run. Each step it runs
//! the current stage against the state, merges the returned update, emits
//! events, and asks [`route`] where to go next.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{Span, error, info, instrument};
use uuid::Uuid;

use crate::stages::{Distiller, Planner, Reviewer, SearchGateway, Stage, Writer};
use crate::{
    ApprovalHeuristic, Capabilities, Config, DeepResearchError, DoneReason, EventKind, EventSink,
    Fact, MinimalFeedbackHeuristic, ResearchEvent, RoutingPolicy, StageId, TraceCollector,
    TraceEvent, TraceSummary, Transition, WorkflowState, metrics, route,
};

pub const MIN_TASK_CHARS: usize = 10;
pub const MAX_TASK_CHARS: usize = 2000;

/// Trim a task and enforce the accepted length range (in characters).
pub fn validate_task(task: &str) -> Result<String, DeepResearchError> {
    let task = task.trim();
    let chars = task.chars().count();
    if chars < MIN_TASK_CHARS {
        return Err(DeepResearchError::InvalidTask(format!(
            "task must be at least {MIN_TASK_CHARS} characters (got {chars})"
        )));
    }
    if chars > MAX_TASK_CHARS {
        return Err(DeepResearchError::InvalidTask(format!(
            "task must be at most {MAX_TASK_CHARS} characters (got {chars})"
        )));
    }
    Ok(task.to_string())
}

/// Tunables consumed by the stages and the router.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub max_iterations: u32,
    pub max_critique_loops: u32,
    pub max_queries_per_plan: usize,
    pub fact_preview_chars: usize,
    pub max_results: usize,
    pub min_relevance_score: f64,
    pub approval: Arc<dyn ApprovalHeuristic>,
}

impl WorkflowSettings {
    pub fn with_approval_heuristic(mut self, approval: Arc<dyn ApprovalHeuristic>) -> Self {
        self.approval = approval;
        self
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for WorkflowSettings {
    fn from(config: &Config) -> Self {
        let workflow = &config.workflow;
        Self {
            max_iterations: workflow.max_iterations,
            max_critique_loops: workflow.max_critique_loops,
            max_queries_per_plan: workflow.max_queries_per_plan,
            fact_preview_chars: workflow.fact_preview_chars,
            max_results: config.search.max_results,
            min_relevance_score: config.search.min_relevance_score,
            approval: Arc::new(MinimalFeedbackHeuristic::new(
                workflow.approval_min_feedback_chars,
                workflow.approval_markers.clone(),
            )),
        }
    }
}

/// Result shape handed to request-level callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResponse {
    pub task: String,
    pub report: String,
    pub facts_count: usize,
    pub sources_count: usize,
    pub iterations: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    pub run_id: Uuid,
    pub task: String,
    pub report: String,
    pub facts: Vec<Fact>,
    pub facts_count: usize,
    pub sources_count: usize,
    pub iterations: u32,
    pub critique_count: u32,
    pub approved: bool,
    pub done_reason: DoneReason,
    pub trace: Vec<TraceEvent>,
}

impl ResearchOutcome {
    fn from_state(
        run_id: Uuid,
        state: WorkflowState,
        done_reason: DoneReason,
        trace: TraceCollector,
    ) -> Self {
        let sources_count = state.gathered_facts.sources().len();
        Self {
            run_id,
            task: state.task().to_string(),
            facts_count: state.gathered_facts.len(),
            facts: state.gathered_facts.to_vec(),
            sources_count,
            iterations: state.iteration_count,
            critique_count: state.critique_count,
            approved: state.is_approved,
            report: state.report_content,
            done_reason,
            trace: trace.into_events(),
        }
    }

    pub fn response(&self) -> ResearchResponse {
        ResearchResponse {
            task: self.task.clone(),
            report: self.report.clone(),
            facts_count: self.facts_count,
            sources_count: self.sources_count,
            iterations: self.iterations,
        }
    }

    pub fn trace_summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.trace)
    }
}

/// The five stages plus the routing policy, reusable across runs.
pub struct ResearchWorkflow {
    planner: Planner,
    search: SearchGateway,
    distiller: Distiller,
    writer: Writer,
    reviewer: Reviewer,
    policy: RoutingPolicy,
}

impl ResearchWorkflow {
    pub fn new(capabilities: Capabilities, settings: WorkflowSettings) -> Self {
        Self {
            planner: Planner::new(
                Arc::clone(&capabilities.reasoning),
                settings.max_iterations,
                settings.max_queries_per_plan,
                settings.fact_preview_chars,
            ),
            search: SearchGateway::new(
                capabilities.search,
                settings.max_results,
                settings.min_relevance_score,
            ),
            distiller: Distiller::new(capabilities.fast),
            writer: Writer::new(Arc::clone(&capabilities.reasoning)),
            reviewer: Reviewer::new(capabilities.reasoning),
            policy: RoutingPolicy {
                max_critique_loops: settings.max_critique_loops,
                approval: settings.approval,
            },
        }
    }

    fn stage(&self, id: StageId) -> &dyn Stage {
        match id {
            StageId::Planner => &self.planner,
            StageId::Search => &self.search,
            StageId::Distill => &self.distiller,
            StageId::Writer => &self.writer,
            StageId::Reviewer => &self.reviewer,
        }
    }

    /// Run one task to completion, pushing events to `events` as it goes.
    ///
    /// A fatal stage failure ends the run with a `run_error` event and no report.
    #[instrument(name = "workflow.run", skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        task: &str,
        events: &EventSink,
    ) -> Result<ResearchOutcome, DeepResearchError> {
        let run_id = Uuid::new_v4();
        Span::current().record("run_id", tracing::field::display(run_id));

        let result = match validate_task(task) {
            Ok(task) => {
                events.emit(
                    ResearchEvent::new(
                        EventKind::StatusUpdate,
                        None,
                        json!({ "status": "started", "run_id": run_id }),
                    )
                    .with_message("Starting research..."),
                );
                self.drive(run_id, task, events).await
            }
            Err(err) => Err(err),
        };

        match &result {
            Ok(outcome) if outcome.done_reason == DoneReason::Cancelled => {
                metrics::record_run("cancelled", outcome.facts_count, outcome.sources_count);
            }
            Ok(outcome) => {
                metrics::record_run("completed", outcome.facts_count, outcome.sources_count);
                events.emit(
                    ResearchEvent::new(
                        EventKind::ReportComplete,
                        None,
                        json!({
                            "report": outcome.report,
                            "facts_count": outcome.facts_count,
                            "sources_count": outcome.sources_count,
                        }),
                    )
                    .with_message("Research complete"),
                );
                events.emit(
                    ResearchEvent::new(EventKind::RunComplete, None, to_data(&outcome.response()))
                        .with_message(format!("Finished: {}", outcome.done_reason.as_str())),
                );
                info!(
                    facts = outcome.facts_count,
                    sources = outcome.sources_count,
                    iterations = outcome.iterations,
                    critiques = outcome.critique_count,
                    reason = outcome.done_reason.as_str(),
                    "research run complete"
                );
            }
            Err(err) => {
                metrics::record_run("failed", 0, 0);
                error!(error = %err, "research run failed");
                events.emit(
                    ResearchEvent::new(
                        EventKind::RunError,
                        None,
                        json!({ "error": err.to_string() }),
                    )
                    .with_message("Research failed"),
                );
            }
        }

        result
    }

    async fn drive(
        &self,
        run_id: Uuid,
        task: String,
        events: &EventSink,
    ) -> Result<ResearchOutcome, DeepResearchError> {
        let mut state = WorkflowState::new(task);
        let mut trace = TraceCollector::new();
        let mut current = StageId::Planner;

        let done_reason = loop {
            if events.is_closed() {
                info!(stage = %current, "event consumer disconnected; stopping run");
                break DoneReason::Cancelled;
            }
            debug_assert!(
                current != StageId::Planner || state.temp_raw_results.is_empty(),
                "raw results must be consumed before planning"
            );

            events.emit(
                ResearchEvent::new(EventKind::StageStart, Some(current), json!({}))
                    .with_message(format!("Entering {current}")),
            );

            let started = Instant::now();
            let outcome = self.stage(current).run(&state).await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let update = match outcome {
                Ok(update) => {
                    metrics::record_stage(current.as_str(), "ok", elapsed_ms);
                    update
                }
                Err(err) => {
                    metrics::record_stage(current.as_str(), "failed", elapsed_ms);
                    metrics::record_capability_failure("reasoning");
                    return Err(err.into());
                }
            };

            let before = Snapshot::of(&state);
            let changes = state.apply(update);
            let transition = route(current, &state, &self.policy);

            emit_stage_events(events, current, &state, &before, transition);
            trace.record(current, transition, changes.to_string());
            events.emit(
                ResearchEvent::new(
                    EventKind::StageEnd,
                    Some(current),
                    json!({ "next": transition.to_string(), "changes": changes.to_string() }),
                )
                .with_message(format!("Leaving {current}")),
            );

            match transition {
                Transition::Next(next) => current = next,
                Transition::Done(reason) => break reason,
            }
        };

        Ok(ResearchOutcome::from_state(run_id, state, done_reason, trace))
    }
}

/// Accumulator sizes captured before an update is merged.
struct Snapshot {
    facts: usize,
    steps: usize,
}

impl Snapshot {
    fn of(state: &WorkflowState) -> Self {
        Self {
            facts: state.gathered_facts.len(),
            steps: state.past_steps.len(),
        }
    }
}

fn emit_stage_events(
    events: &EventSink,
    stage: StageId,
    state: &WorkflowState,
    before: &Snapshot,
    transition: Transition,
) {
    let event = |kind, data| ResearchEvent::new(kind, Some(stage), data);

    match stage {
        StageId::Planner => {
            if !state.plan.is_empty() {
                events.emit(
                    event(EventKind::QueriesProposed, json!({ "queries": state.plan }))
                        .with_message(format!("Generated {} search queries", state.plan.len())),
                );
            }
            events.emit(
                event(
                    EventKind::PlanningComplete,
                    json!({
                        "query_count": state.plan.len(),
                        "iteration": state.iteration_count,
                        "next": transition.to_string(),
                    }),
                )
                .with_message(if state.plan.is_empty() {
                    "Research complete, synthesizing report".to_string()
                } else {
                    "Planning complete".to_string()
                }),
            );
        }
        StageId::Search => {
            let steps = &state.past_steps[before.steps..];
            events.emit(
                event(
                    EventKind::SearchCompleted,
                    json!({
                        "iteration": state.iteration_count,
                        "results": state.temp_raw_results.len(),
                        "steps": steps,
                    }),
                )
                .with_message(format!(
                    "Found {} new sources",
                    state.temp_raw_results.len()
                )),
            );
        }
        StageId::Distill => {
            let new_facts: Vec<&Fact> = state.gathered_facts.iter().skip(before.facts).collect();
            events.emit(
                event(
                    EventKind::FactsExtracted,
                    json!({
                        "new_facts": new_facts.len(),
                        "total_facts": state.gathered_facts.len(),
                        "facts": new_facts,
                    }),
                )
                .with_message(format!("Extracted {} new facts", new_facts.len())),
            );
        }
        StageId::Writer => {
            events.emit(
                event(
                    EventKind::ReportProduced,
                    json!({
                        "report": state.report_content,
                        "draft": state.critique_count + 1,
                    }),
                )
                .with_message("Report drafted"),
            );
        }
        StageId::Reviewer => {
            let decision = match transition {
                Transition::Done(reason) => reason.as_str(),
                Transition::Next(_) => "revise",
            };
            metrics::record_critique(decision);
            events.emit(
                event(
                    EventKind::CritiqueResult,
                    json!({
                        "approved": state.is_approved,
                        "feedback": state.critique_feedback,
                        "critique_count": state.critique_count,
                        "decision": decision,
                    }),
                )
                .with_message(if state.is_approved {
                    "Report approved".to_string()
                } else {
                    "Review complete".to_string()
                }),
            );
        }
    }
}

fn to_data<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// A spawned run and the receiving end of its event stream.
///
/// Dropping `events` stops the run at the next stage boundary; calls already
/// in flight finish on their own and their results are discarded.
pub struct ResearchStream {
    pub events: UnboundedReceiverStream<ResearchEvent>,
    pub handle: JoinHandle<Result<ResearchOutcome, DeepResearchError>>,
}

pub fn stream_research(workflow: Arc<ResearchWorkflow>, task: impl Into<String>) -> ResearchStream {
    let (sink, receiver) = EventSink::channel();
    let task = task.into();
    let handle = tokio::spawn(async move { workflow.run(&task, &sink).await });
    ResearchStream {
        events: UnboundedReceiverStream::new(receiver),
        handle,
    }
}
