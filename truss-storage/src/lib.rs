//! ABOUTME: Storage contract for sessions, runs and run-steps, plus agent
//! ABOUTME: config lookup — in-memory and embedded-sqlite implementations

mod memory;
mod sqlite;

pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use truss_core::{AgentConfig, Message, Result, Run, RunStatus, RunStep, Session};

/// Storage contract used by the workflow and its activities. Implementors
/// must make `create_run_step` durable before returning, since the
/// workflow relies on persisted steps to reconstruct memory after a
/// worker restart.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_session(&self, agent_config_id: &str, user_id: &str) -> Result<Session>;

    async fn get_session(&self, session_id: &str) -> Result<Session>;

    /// Deletes a session and cascades to its runs and run-steps.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    async fn create_run(&self, session_id: &str) -> Result<Run>;

    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<Run>;

    async fn get_run(&self, run_id: &str) -> Result<Run>;

    async fn create_run_step_from_message(&self, run_id: &str, message: &Message)
        -> Result<RunStep>;

    /// Returns every step belonging to the session, joined through all of
    /// its runs (not just the latest), ordered chronologically by
    /// `created_at`, so the workflow can rebuild `AgentMemory` exactly as
    /// the messages were appended across the session's full history.
    async fn get_steps_for_session(&self, session_id: &str) -> Result<Vec<RunStep>>;

    async fn load_agent_config(&self, agent_config_id: &str) -> Result<AgentConfig>;

    async fn save_agent_config(&self, config: AgentConfig) -> Result<()>;
}
