use anyhow::Result;
use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct WorkflowMetrics {
    stage_runs: Counter<u64>,
    stage_duration_ms: Histogram<f64>,
    capability_failures: Counter<u64>,
    critique_decisions: Counter<u64>,
    report_facts: Histogram<u64>,
    report_sources: Histogram<u64>,
    runs: Counter<u64>,
}

static METRICS: OnceCell<WorkflowMetrics> = OnceCell::new();

fn handles() -> &'static WorkflowMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("deepresearch.workflow");
        WorkflowMetrics {
            stage_runs: meter
                .u64_counter("workflow_stage_runs_total")
                .with_description("Stage passes by stage and status")
                .init(),
            stage_duration_ms: meter
                .f64_histogram("workflow_stage_duration_ms")
                .with_description("Stage runtime in milliseconds")
                .init(),
            capability_failures: meter
                .u64_counter("workflow_capability_failures_total")
                .with_description("Recovered and fatal capability failures by tier")
                .init(),
            critique_decisions: meter
                .u64_counter("workflow_critique_decisions_total")
                .with_description("Reviewer outcomes by routing decision")
                .init(),
            report_facts: meter
                .u64_histogram("workflow_report_facts")
                .with_description("Facts backing each completed report")
                .init(),
            report_sources: meter
                .u64_histogram("workflow_report_sources")
                .with_description("Distinct sources backing each completed report")
                .init(),
            runs: meter
                .u64_counter("workflow_runs_total")
                .with_description("Research runs by terminal status")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) -> Result<()> {
    if std::env::var("DEEPRESEARCH_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "DEEPRESEARCH_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export workflow metrics."
        );
    }
    Ok(())
}

pub(crate) fn record_stage(stage: &'static str, status: &'static str, duration_ms: f64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("stage", stage),
        KeyValue::new("status", status),
    ];
    metrics.stage_runs.add(1, &attrs);
    metrics.stage_duration_ms.record(duration_ms, &attrs);
}

/// `tier` is one of `search`, `fast`, `reasoning`.
pub(crate) fn record_capability_failure(tier: &'static str) {
    handles()
        .capability_failures
        .add(1, &[KeyValue::new("tier", tier)]);
}

pub(crate) fn record_critique(decision: &'static str) {
    handles()
        .critique_decisions
        .add(1, &[KeyValue::new("decision", decision)]);
}

pub(crate) fn record_run(status: &'static str, facts: usize, sources: usize) {
    let metrics = handles();
    let attrs = [KeyValue::new("status", status)];
    metrics.runs.add(1, &attrs);
    if status == "completed" {
        metrics.report_facts.record(facts as u64, &attrs);
        metrics.report_sources.record(sources as u64, &attrs);
    }
}
