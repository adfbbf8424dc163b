//! Stage identifiers and the pure transition function of the research state machine.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::WorkflowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Planner,
    Search,
    Distill,
    Writer,
    Reviewer,
}

impl StageId {
    pub const fn as_str(self) -> &'static str {
        match self {
            StageId::Planner => "planner",
            StageId::Search => "search",
            StageId::Distill => "distill",
            StageId::Writer => "writer",
            StageId::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run reached the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    Approved,
    CritiqueCeiling,
    FeedbackIndicatesApproval,
    /// The event consumer went away before the run finished.
    Cancelled,
}

impl DoneReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            DoneReason::Approved => "approved",
            DoneReason::CritiqueCeiling => "critique_ceiling",
            DoneReason::FeedbackIndicatesApproval => "feedback_indicates_approval",
            DoneReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(StageId),
    Done(DoneReason),
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Next(stage) => write!(f, "{stage}"),
            Transition::Done(reason) => write!(f, "done ({})", reason.as_str()),
        }
    }
}

/// Decides whether reviewer feedback that was not an explicit approval
/// should still end the revision loop.
pub trait ApprovalHeuristic: Send + Sync + fmt::Debug {
    fn implies_approval(&self, feedback: &str) -> bool;
}

/// Treats very short feedback, or feedback containing a known marker phrase, as approval.
#[derive(Debug, Clone)]
pub struct MinimalFeedbackHeuristic {
    pub min_chars: usize,
    pub markers: Vec<String>,
}

impl MinimalFeedbackHeuristic {
    pub fn new(min_chars: usize, markers: Vec<String>) -> Self {
        let markers = markers
            .into_iter()
            .filter(|marker| !marker.is_empty())
            .collect();
        Self { min_chars, markers }
    }
}

impl Default for MinimalFeedbackHeuristic {
    fn default() -> Self {
        Self::new(10, vec!["No critical issues".into()])
    }
}

impl ApprovalHeuristic for MinimalFeedbackHeuristic {
    fn implies_approval(&self, feedback: &str) -> bool {
        feedback.chars().count() < self.min_chars
            || self
                .markers
                .iter()
                .any(|marker| feedback.contains(marker.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    pub max_critique_loops: u32,
    pub approval: Arc<dyn ApprovalHeuristic>,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            max_critique_loops: 3,
            approval: Arc::new(MinimalFeedbackHeuristic::default()),
        }
    }
}

/// Next step after `completed` has run and its update has been merged into `state`.
pub fn route(completed: StageId, state: &WorkflowState, policy: &RoutingPolicy) -> Transition {
    match completed {
        StageId::Planner if state.plan.is_empty() => Transition::Next(StageId::Writer),
        StageId::Planner => Transition::Next(StageId::Search),
        StageId::Search => Transition::Next(StageId::Distill),
        StageId::Distill => Transition::Next(StageId::Planner),
        StageId::Writer => Transition::Next(StageId::Reviewer),
        StageId::Reviewer => {
            if state.critique_count >= policy.max_critique_loops {
                Transition::Done(DoneReason::CritiqueCeiling)
            } else if state.is_approved {
                Transition::Done(DoneReason::Approved)
            } else if policy.approval.implies_approval(&state.critique_feedback) {
                Transition::Done(DoneReason::FeedbackIndicatesApproval)
            } else {
                Transition::Next(StageId::Writer)
            }
        }
    }
}
