use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{StageId, Transition};

/// One stage pass: where the machine was, where it went, and what changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub step: usize,
    pub stage: StageId,
    pub next: String,
    pub message: String,
    pub timestamp_ms: u128,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceCollector {
    events: Vec<TraceEvent>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, stage: StageId, next: Transition, message: impl Into<String>) {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        self.events.push(TraceEvent {
            step: self.events.len() + 1,
            stage,
            next: next.to_string(),
            message: message.into(),
            timestamp_ms,
        });
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.events)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceEvent>,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        Self {
            steps: events.to_vec(),
        }
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No trace events recorded.".to_string();
        }
        let mut output = String::from("### Workflow Trace\n");
        for step in &self.steps {
            let _ = writeln!(
                output,
                "{}. {} -> {}: {}",
                step.step, step.stage, step.next, step.message
            );
        }
        output
    }

    /// Mermaid flowchart; consecutive passes of the same stage get distinct nodes.
    pub fn render_mermaid(&self) -> String {
        if self.steps.is_empty() {
            return "flowchart TD\n  %% no trace events captured\n".to_string();
        }

        let mut output = String::from("flowchart TD\n");
        for step in &self.steps {
            let label = sanitize_mermaid(&format!("{}: {}", step.stage, step.message));
            let _ = writeln!(output, "  step{}[\"{label}\"]", step.step);
        }
        for pair in self.steps.windows(2) {
            let _ = writeln!(output, "  step{} --> step{}", pair[0].step, pair[1].step);
        }
        if let Some(last) = self.steps.last()
            && last.next.starts_with("done")
        {
            let _ = writeln!(
                output,
                "  step{} --> done([\"{}\"])",
                last.step,
                sanitize_mermaid(&last.next)
            );
        }
        output
    }
}

fn sanitize_mermaid(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "'")
        .replace('[', "(")
        .replace(']', ")")
        .replace('\n', "<br/>")
}
