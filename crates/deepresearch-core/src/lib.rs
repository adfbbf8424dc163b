//! DeepResearch core: an iterative plan, search, distill, write and review
//! workflow over pluggable language-model and search capabilities.
//!
//! [`ResearchWorkflow`] drives the state machine; [`stream_research`] runs it
//! in the background and hands back its ordered event stream.

mod capability;
mod config;
mod error;
mod events;
pub mod metrics;
mod routing;
mod security;
pub mod stages;
mod state;
mod telemetry;
mod trace;
mod workflow;

#[cfg(test)]
mod test_support;

pub use capability::{
    Capabilities, GenerationRequest, LanguageModel, MockSearch, OpenAiChatModel, ResponseSchema,
    SearchProvider, TavilySearch, generate_structured,
};
pub use config::{
    Config, ConfigLoader, LlmConfig, LoggingConfig, SearchConfig, SearchProviderKind,
    ServerConfig, WorkflowConfig,
};
pub use error::{CapabilityError, DeepResearchError, StageError};
pub use events::{EventKind, EventSink, ResearchEvent};
pub use routing::{
    ApprovalHeuristic, DoneReason, MinimalFeedbackHeuristic, RoutingPolicy, StageId, Transition,
    route,
};
pub use security::{SecretValue, optional_env, require_env};
pub use state::{
    ChangeSummary, ContentDigest, CritiqueVerdict, Fact, FactStore, RawSearchResult, StateUpdate,
    StepLog, WorkflowState,
};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceCollector, TraceEvent, TraceSummary};
pub use workflow::{
    MAX_TASK_CHARS, MIN_TASK_CHARS, ResearchOutcome, ResearchResponse, ResearchStream,
    ResearchWorkflow, WorkflowSettings, stream_research, validate_task,
};
