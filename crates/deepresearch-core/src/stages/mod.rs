//! The five workflow stages. Each is a pure function of the current state
//! that returns a partial update; merging happens in the driver.

mod distiller;
mod planner;
mod reviewer;
mod search;
mod writer;

use async_trait::async_trait;

pub use distiller::{Distiller, FactExtraction};
pub use planner::{Planner, PlannerDecision};
pub use reviewer::{Critique, Reviewer};
pub use search::SearchGateway;
pub use writer::Writer;

use crate::{StageError, StageId, StateUpdate, WorkflowState};

#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, StageError>;
}
