//! Ordered lifecycle and data events pushed to whoever is watching a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::StageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StatusUpdate,
    StageStart,
    StageEnd,
    QueriesProposed,
    PlanningComplete,
    SearchCompleted,
    FactsExtracted,
    ReportProduced,
    CritiqueResult,
    ReportComplete,
    RunComplete,
    RunError,
}

impl EventKind {
    /// Wire name, also used as the SSE `event:` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::StatusUpdate => "status_update",
            EventKind::StageStart => "stage_start",
            EventKind::StageEnd => "stage_end",
            EventKind::QueriesProposed => "queries_proposed",
            EventKind::PlanningComplete => "planning_complete",
            EventKind::SearchCompleted => "search_completed",
            EventKind::FactsExtracted => "facts_extracted",
            EventKind::ReportProduced => "report_produced",
            EventKind::CritiqueResult => "critique_result",
            EventKind::ReportComplete => "report_complete",
            EventKind::RunComplete => "run_complete",
            EventKind::RunError => "run_error",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, EventKind::RunComplete | EventKind::RunError)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchEvent {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageId>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ResearchEvent {
    pub fn new(kind: EventKind, stage: Option<StageId>, data: Value) -> Self {
        Self {
            kind,
            stage,
            data,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Sending half of a run's event stream.
///
/// A sink created with [`EventSink::noop`] never reports itself closed, so
/// runs without an observer proceed to completion.
#[derive(Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<ResearchEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ResearchEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    pub fn noop() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: ResearchEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(err) = sender.send(event) {
            tracing::debug!(kind = err.0.kind.as_str(), "event consumer gone; dropping event");
        }
    }

    /// True once the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.as_ref().is_some_and(|sender| sender.is_closed())
    }
}
