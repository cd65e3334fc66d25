//! ABOUTME: In-memory Storage implementation used by default in tests and
//! ABOUTME: examples; mirrors the on-disk contract exactly, with no I/O

use crate::Storage;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use truss_core::{AgentConfig, Message, Result, Run, RunStatus, RunStep, Session, TrussError};
use uuid::Uuid;

#[derive(Default)]
struct State {
    sessions: HashMap<String, Session>,
    runs: HashMap<String, Run>,
    steps: HashMap<String, Vec<RunStep>>,
    agent_configs: HashMap<String, AgentConfig>,
    /// session_id -> every run_id created for it, in creation order, used
    /// to reconstruct `get_steps_for_session` by joining steps through
    /// their owning runs rather than only the most recent one.
    runs_for_session: HashMap<String, Vec<String>>,
}

/// Default `Storage` backend: fast, non-durable, scoped to process
/// lifetime. Suitable for tests and for running the workflow without a
/// database dependency.
pub struct InMemoryStorage {
    state: RwLock<State>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_session(&self, agent_config_id: &str, user_id: &str) -> Result<Session> {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            agent_config_id: agent_config_id.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        };
        self.state
            .write()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Session> {
        self.state
            .read()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| TrussError::not_found(format!("session '{session_id}' not found")))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.write();
        state
            .sessions
            .remove(session_id)
            .ok_or_else(|| TrussError::not_found(format!("session '{session_id}' not found")))?;
        if let Some(run_ids) = state.runs_for_session.remove(session_id) {
            for run_id in run_ids {
                state.runs.remove(&run_id);
                state.steps.remove(&run_id);
            }
        }
        Ok(())
    }

    async fn create_run(&self, session_id: &str) -> Result<Run> {
        let mut state = self.state.write();
        if !state.sessions.contains_key(session_id) {
            return Err(TrussError::not_found(format!(
                "session '{session_id}' not found"
            )));
        }
        let now = Utc::now();
        let run = Run {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            status: RunStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        };
        state.runs.insert(run.id.clone(), run.clone());
        state.steps.insert(run.id.clone(), Vec::new());
        state
            .runs_for_session
            .entry(session_id.to_string())
            .or_default()
            .push(run.id.clone());
        Ok(run)
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<Run> {
        let mut state = self.state.write();
        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| TrussError::not_found(format!("run '{run_id}' not found")))?;
        run.status = status;
        run.error = error;
        run.updated_at = Utc::now();
        Ok(run.clone())
    }

    async fn get_run(&self, run_id: &str) -> Result<Run> {
        self.state
            .read()
            .runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| TrussError::not_found(format!("run '{run_id}' not found")))
    }

    async fn create_run_step_from_message(
        &self,
        run_id: &str,
        message: &Message,
    ) -> Result<RunStep> {
        message.validate()?;
        let mut state = self.state.write();
        if !state.runs.contains_key(run_id) {
            return Err(TrussError::not_found(format!("run '{run_id}' not found")));
        }
        let tool_calls = message
            .tool_calls
            .as_ref()
            .map(|calls| {
                serde_json::to_value(calls)
                    .map_err(|e| TrussError::internal(format!("serialise tool_calls: {e}")))
            })
            .transpose()?;
        let step = RunStep {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            role: message.role,
            content: message.content.clone(),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
            created_at: Utc::now(),
        };
        state
            .steps
            .entry(run_id.to_string())
            .or_default()
            .push(step.clone());
        Ok(step)
    }

    async fn get_steps_for_session(&self, session_id: &str) -> Result<Vec<RunStep>> {
        let state = self.state.read();
        let run_ids = state
            .runs_for_session
            .get(session_id)
            .ok_or_else(|| TrussError::not_found(format!("session '{session_id}' not found")))?;
        let mut steps: Vec<RunStep> = run_ids
            .iter()
            .flat_map(|run_id| state.steps.get(run_id).cloned().unwrap_or_default())
            .collect();
        // Join order already reflects each run's creation order and each
        // run's own step insertion order; a stable sort on `created_at`
        // only needs to break ties between runs created in the same
        // instant, matching the sqlite backend's `ORDER BY created_at ASC`.
        steps.sort_by_key(|step| step.created_at);
        Ok(steps)
    }

    async fn load_agent_config(&self, agent_config_id: &str) -> Result<AgentConfig> {
        self.state
            .read()
            .agent_configs
            .get(agent_config_id)
            .cloned()
            .ok_or_else(|| {
                TrussError::not_found(format!("agent config '{agent_config_id}' not found"))
            })
    }

    async fn save_agent_config(&self, config: AgentConfig) -> Result<()> {
        self.state
            .write()
            .agent_configs
            .insert(config.id.clone(), config);
        Ok(())
    }
}
