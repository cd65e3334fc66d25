//! ABOUTME: The durable agent-execution workflow: a reason-act loop over
//! ABOUTME: storage, tool dispatch and LLM streaming activities

mod workflow;

pub use workflow::{TrussAgentExecutionWorkflow, WorkflowConfig};

use truss_core::WorkflowStatus;
use truss_engine::WorkflowHandle;

/// Convenience alias: every running workflow exposes cancellation and
/// status through the same handle type.
pub type StatusHandle = WorkflowHandle<WorkflowStatus>;

#[must_use]
pub fn new_status_handle() -> StatusHandle {
    WorkflowHandle::new(WorkflowStatus {
        current_status: "init".to_string(),
        cancellation_requested: false,
        iterations_completed: 0,
    })
}
