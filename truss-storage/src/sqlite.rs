//! ABOUTME: Embedded single-file Storage backend over libsql, satisfying
//! ABOUTME: the `DATABASE_URL` contract's default of a local sqlite file

use crate::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Builder, Connection};
use truss_core::{
    AgentConfig, LLMConfig, Message, Result, Role, Run, RunStatus, RunStep, Session, TrussError,
};
use uuid::Uuid;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS agent_configs (
    id TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    agent_config_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    status TEXT NOT NULL,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS run_steps (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT,
    tool_calls TEXT,
    tool_call_id TEXT,
    created_at TEXT NOT NULL
);
";

/// `Storage` backend for a local, embedded `libsql` database file. This is
/// the `DATABASE_URL`-driven default a worker runs against outside of
/// tests (see `truss-config`).
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (creating if absent) the database at `path`, running schema
    /// migrations idempotently.
    pub async fn open(path: &str) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TrussError::storage(format!("open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| TrussError::storage(format!("connect: {e}")))?;
        conn.execute_batch(SCHEMA)
            .await
            .map_err(|e| TrussError::storage(format!("migrate schema: {e}")))?;
        Ok(Self { conn })
    }

    fn run_status_to_str(status: RunStatus) -> &'static str {
        match status {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    fn run_status_from_str(value: &str) -> Result<RunStatus> {
        Ok(match value {
            "pending" => RunStatus::Pending,
            "running" => RunStatus::Running,
            "succeeded" => RunStatus::Succeeded,
            "failed" => RunStatus::Failed,
            "cancelled" => RunStatus::Cancelled,
            other => {
                return Err(TrussError::internal(format!(
                    "corrupt run status in storage: {other}"
                )))
            }
        })
    }

    fn role_to_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn role_from_str(value: &str) -> Result<Role> {
        Ok(match value {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            other => {
                return Err(TrussError::internal(format!(
                    "corrupt message role in storage: {other}"
                )))
            }
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_session(&self, agent_config_id: &str, user_id: &str) -> Result<Session> {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            agent_config_id: agent_config_id.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO sessions (id, agent_config_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.id.clone(),
                    session.agent_config_id.clone(),
                    session.user_id.clone(),
                    session.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| TrussError::storage(format!("insert session: {e}")))?;
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Session> {
        let mut rows = self
            .conn
            .query(
                "SELECT agent_config_id, user_id, created_at FROM sessions WHERE id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| TrussError::storage(format!("query session: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| TrussError::storage(format!("read session row: {e}")))?
            .ok_or_else(|| TrussError::not_found(format!("session '{session_id}' not found")))?;
        let agent_config_id: String = row
            .get(0)
            .map_err(|e| TrussError::internal(format!("decode session: {e}")))?;
        let user_id: String = row
            .get(1)
            .map_err(|e| TrussError::internal(format!("decode session: {e}")))?;
        let created_at: String = row
            .get(2)
            .map_err(|e| TrussError::internal(format!("decode session: {e}")))?;
        Ok(Session {
            id: session_id.to_string(),
            agent_config_id,
            user_id,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut rows = self
            .conn
            .query("SELECT id FROM runs WHERE session_id = ?1", params![session_id])
            .await
            .map_err(|e| TrussError::storage(format!("query runs for deletion: {e}")))?;
        let mut run_ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| TrussError::storage(format!("read run row: {e}")))?
        {
            let run_id: String = row
                .get(0)
                .map_err(|e| TrussError::internal(format!("decode run id: {e}")))?;
            run_ids.push(run_id);
        }
        for run_id in &run_ids {
            self.conn
                .execute("DELETE FROM run_steps WHERE run_id = ?1", params![run_id.clone()])
                .await
                .map_err(|e| TrussError::storage(format!("delete run_steps: {e}")))?;
        }
        self.conn
            .execute("DELETE FROM runs WHERE session_id = ?1", params![session_id])
            .await
            .map_err(|e| TrussError::storage(format!("delete runs: {e}")))?;
        let changed = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![session_id])
            .await
            .map_err(|e| TrussError::storage(format!("delete session: {e}")))?;
        if changed == 0 {
            return Err(TrussError::not_found(format!(
                "session '{session_id}' not found"
            )));
        }
        Ok(())
    }

    async fn create_run(&self, session_id: &str) -> Result<Run> {
        // enforce the FK relationship explicitly; libsql does not run with
        // foreign_keys pragma enabled by default.
        self.get_session(session_id).await?;
        let now = Utc::now();
        let run = Run {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            status: RunStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.conn
            .execute(
                "INSERT INTO runs (id, session_id, status, error, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run.id.clone(),
                    run.session_id.clone(),
                    Self::run_status_to_str(run.status),
                    run.error.clone(),
                    run.created_at.to_rfc3339(),
                    run.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| TrussError::storage(format!("insert run: {e}")))?;
        Ok(run)
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<Run> {
        let now = Utc::now();
        let changed = self
            .conn
            .execute(
                "UPDATE runs SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    Self::run_status_to_str(status),
                    error.clone(),
                    now.to_rfc3339(),
                    run_id
                ],
            )
            .await
            .map_err(|e| TrussError::storage(format!("update run status: {e}")))?;
        if changed == 0 {
            return Err(TrussError::not_found(format!("run '{run_id}' not found")));
        }
        self.get_run(run_id).await
    }

    async fn get_run(&self, run_id: &str) -> Result<Run> {
        let mut rows = self
            .conn
            .query(
                "SELECT session_id, status, error, created_at, updated_at FROM runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(|e| TrussError::storage(format!("query run: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| TrussError::storage(format!("read run row: {e}")))?
            .ok_or_else(|| TrussError::not_found(format!("run '{run_id}' not found")))?;
        let session_id: String = row
            .get(0)
            .map_err(|e| TrussError::internal(format!("decode run: {e}")))?;
        let status: String = row
            .get(1)
            .map_err(|e| TrussError::internal(format!("decode run: {e}")))?;
        let error: Option<String> = row
            .get(2)
            .map_err(|e| TrussError::internal(format!("decode run: {e}")))?;
        let created_at: String = row
            .get(3)
            .map_err(|e| TrussError::internal(format!("decode run: {e}")))?;
        let updated_at: String = row
            .get(4)
            .map_err(|e| TrussError::internal(format!("decode run: {e}")))?;
        Ok(Run {
            id: run_id.to_string(),
            session_id,
            status: Self::run_status_from_str(&status)?,
            error,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    async fn create_run_step_from_message(
        &self,
        run_id: &str,
        message: &Message,
    ) -> Result<RunStep> {
        message.validate()?;
        self.get_run(run_id).await?;
        let tool_calls_json = message
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| TrussError::internal(format!("serialise tool_calls: {e}")))?;
        let step = RunStep {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            role: message.role,
            content: message.content.clone(),
            tool_calls: tool_calls_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| TrussError::internal(format!("re-parse tool_calls: {e}")))?,
            tool_call_id: message.tool_call_id.clone(),
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO run_steps (id, run_id, role, content, tool_calls, tool_call_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    step.id.clone(),
                    step.run_id.clone(),
                    Self::role_to_str(step.role),
                    step.content.clone(),
                    tool_calls_json,
                    step.tool_call_id.clone(),
                    step.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| TrussError::storage(format!("insert run_step: {e}")))?;
        Ok(step)
    }

    async fn get_steps_for_session(&self, session_id: &str) -> Result<Vec<RunStep>> {
        let mut rows = self
            .conn
            .query(
                "SELECT s.id, s.run_id, s.role, s.content, s.tool_calls, s.tool_call_id, s.created_at \
                 FROM run_steps s JOIN runs r ON r.id = s.run_id \
                 WHERE r.session_id = ?1 ORDER BY s.created_at ASC",
                params![session_id],
            )
            .await
            .map_err(|e| TrussError::storage(format!("query run_steps: {e}")))?;
        let mut steps = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| TrussError::storage(format!("read run_step row: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| TrussError::internal(format!("decode step: {e}")))?;
            let run_id: String = row
                .get(1)
                .map_err(|e| TrussError::internal(format!("decode step: {e}")))?;
            let role: String = row
                .get(2)
                .map_err(|e| TrussError::internal(format!("decode step: {e}")))?;
            let content: Option<String> = row
                .get(3)
                .map_err(|e| TrussError::internal(format!("decode step: {e}")))?;
            let tool_calls_json: Option<String> = row
                .get(4)
                .map_err(|e| TrussError::internal(format!("decode step: {e}")))?;
            let tool_call_id: Option<String> = row
                .get(5)
                .map_err(|e| TrussError::internal(format!("decode step: {e}")))?;
            let created_at: String = row
                .get(6)
                .map_err(|e| TrussError::internal(format!("decode step: {e}")))?;
            let tool_calls = tool_calls_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| TrussError::internal(format!("re-parse tool_calls: {e}")))?;
            steps.push(RunStep {
                id,
                run_id,
                role: Self::role_from_str(&role)?,
                content,
                tool_calls,
                tool_call_id,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        if steps.is_empty() {
            // confirm the session exists so callers get NotFound rather than
            // a silently empty memory.
            self.get_session(session_id).await?;
        }
        Ok(steps)
    }

    async fn load_agent_config(&self, agent_config_id: &str) -> Result<AgentConfig> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload FROM agent_configs WHERE id = ?1",
                params![agent_config_id],
            )
            .await
            .map_err(|e| TrussError::storage(format!("query agent_config: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| TrussError::storage(format!("read agent_config row: {e}")))?
            .ok_or_else(|| {
                TrussError::not_found(format!("agent config '{agent_config_id}' not found"))
            })?;
        let payload: String = row
            .get(0)
            .map_err(|e| TrussError::internal(format!("decode agent_config: {e}")))?;
        serde_json::from_str::<AgentConfigRow>(&payload)
            .map_err(|e| TrussError::internal(format!("corrupt agent_config payload: {e}")))?
            .into_agent_config()
    }

    async fn save_agent_config(&self, config: AgentConfig) -> Result<()> {
        let payload = serde_json::to_string(&AgentConfigRow::from(&config))
            .map_err(|e| TrussError::internal(format!("serialise agent_config: {e}")))?;
        self.conn
            .execute(
                "INSERT INTO agent_configs (id, payload) VALUES (?1, ?2) \
                 ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
                params![config.id.clone(), payload],
            )
            .await
            .map_err(|e| TrussError::storage(format!("upsert agent_config: {e}")))?;
        Ok(())
    }
}

/// Serialisation mirror of `AgentConfig`, kept separate so storage-layer
/// JSON shape can evolve independently of the in-memory type.
#[derive(serde::Serialize, serde::Deserialize)]
struct AgentConfigRow {
    id: String,
    name: String,
    system_prompt: String,
    llm_config: LLMConfig,
    tools: Option<Vec<String>>,
}

impl From<&AgentConfig> for AgentConfigRow {
    fn from(config: &AgentConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            system_prompt: config.system_prompt.clone(),
            llm_config: config.llm_config.clone(),
            tools: config.tools.clone(),
        }
    }
}

impl AgentConfigRow {
    fn into_agent_config(self) -> Result<AgentConfig> {
        AgentConfig::new(
            self.id,
            self.name,
            self.system_prompt,
            self.llm_config,
            self.tools,
        )
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TrussError::internal(format!("corrupt timestamp '{value}': {e}")))
}
