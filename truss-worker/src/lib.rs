//! ABOUTME: Worker bootstrap: wires the storage/pub-sub/tool/LLM-provider
//! ABOUTME: dependencies and registers the agent-execution workflow to run on them

use std::sync::Arc;
use truss_config::TrussConfig;
use truss_core::{AgentWorkflowInput, AgentWorkflowOutput, Result};
use truss_engine::WorkflowHandle;
use truss_llm::{LlmProvider, OpenAiCompatibleProvider};
use truss_pubsub::{InMemoryPubSub, PubSub, RedisPubSub};
use truss_storage::{InMemoryStorage, SqliteStorage, Storage};
use truss_tools::{GetStockPriceTool, ToolRegistry, WebSearchTool};
use truss_workflow::{new_status_handle, StatusHandle, TrussAgentExecutionWorkflow, WorkflowConfig};

/// The activity set a Temporal-style worker would register on its task
/// queue alongside `TrussAgentExecutionWorkflow`, named exactly as the
/// core specification's component table (§4.F) lists them. This crate's
/// engine runs these activities in-process (see SPEC_FULL.md's grounding
/// note on `truss-engine`) rather than dispatching them over a wire
/// protocol, but the set is kept explicit so a future Temporal-backed
/// engine has a 1:1 registration list to port.
pub const ACTIVITY_NAMES: &[&str] = &[
    "CreateRun",
    "CreateRunStep",
    "GetRunMemory",
    "LoadAgentConfig",
    "FinalizeRun",
    "LLMStreamPublish",
    "ExecuteTool",
];

/// Registers the two built-in tools (`web_search`, `get_stock_price`) that
/// ship with this workspace. Additional handlers can be registered on the
/// returned registry before it is passed to [`Worker::new`].
#[must_use]
pub fn default_tool_registry() -> ToolRegistry {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(WebSearchTool::new()));
    registry.register(Arc::new(GetStockPriceTool::new()));
    registry
}

/// Builds the `Storage` backend named by `config.database_url`: an
/// in-memory store for `memory://` (used by tests and examples), an
/// embedded sqlite file otherwise.
pub async fn storage_from_config(config: &TrussConfig) -> Result<Arc<dyn Storage>> {
    if config.database_url == "memory://" {
        return Ok(Arc::new(InMemoryStorage::new()));
    }
    let path = config
        .database_url
        .strip_prefix("sqlite://")
        .unwrap_or(&config.database_url);
    Ok(Arc::new(SqliteStorage::open(path).await?))
}

/// Builds the `PubSub` backend: Redis when `redis_url` is configured,
/// otherwise an in-process broadcast bus suitable for a single worker.
pub fn pubsub_from_config(config: &TrussConfig) -> Result<Arc<dyn PubSub>> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(RedisPubSub::new(url)?)),
        None => Ok(Arc::new(InMemoryPubSub::new())),
    }
}

/// Builds the `LlmProvider`, reading `OPENAI_API_KEY` for bearer auth
/// against `config.llm_base_url`.
#[must_use]
pub fn llm_provider_from_config(config: &TrussConfig) -> Arc<dyn LlmProvider> {
    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    Arc::new(OpenAiCompatibleProvider::new(
        config.llm_base_url.clone(),
        api_key,
    ))
}

/// A running worker: the dependency set plus the workflow definition it
/// drives. `task_queue` is carried for parity with the Temporal worker
/// contract in spec.md §4.F / §6, even though this engine dispatches
/// in-process rather than polling a queue.
pub struct Worker {
    task_queue: String,
    workflow: TrussAgentExecutionWorkflow,
}

impl Worker {
    #[must_use]
    pub fn new(
        task_queue: impl Into<String>,
        storage: Arc<dyn Storage>,
        tools: Arc<ToolRegistry>,
        llm_provider: Arc<dyn LlmProvider>,
        pubsub: Arc<dyn PubSub>,
        workflow_config: WorkflowConfig,
    ) -> Self {
        Self {
            task_queue: task_queue.into(),
            workflow: TrussAgentExecutionWorkflow::new(
                storage,
                tools,
                llm_provider,
                pubsub,
                workflow_config,
            ),
        }
    }

    /// Assembles a `Worker` from a `TrussConfig`, registering the built-in
    /// tool set. Equivalent to `run_worker.py`'s dependency wiring, minus
    /// the Temporal client connection (see SPEC_FULL.md's grounding note).
    pub async fn from_config(config: &TrussConfig) -> Result<Self> {
        let storage = storage_from_config(config).await?;
        let pubsub = pubsub_from_config(config)?;
        let llm_provider = llm_provider_from_config(config);
        let tools = Arc::new(default_tool_registry());
        Ok(Self::new(
            config.temporal_task_queue.clone(),
            storage,
            tools,
            llm_provider,
            pubsub,
            WorkflowConfig::default(),
        ))
    }

    #[must_use]
    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Starts one execution of `TrussAgentExecutionWorkflow`, mirroring
    /// the `StartWorkflow` RPC in spec.md §6. Returns a handle the caller
    /// can use to signal cancellation or query status while the workflow
    /// runs, plus a join handle driving it to completion on a spawned
    /// task so the caller can send signals concurrently.
    pub fn start_workflow(
        self: &Arc<Self>,
        input: AgentWorkflowInput,
    ) -> (StatusHandle, tokio::task::JoinHandle<Result<AgentWorkflowOutput>>) {
        let handle = new_status_handle();
        let worker_handle = handle.clone();
        let worker = Arc::clone(self);
        let join = tokio::spawn(async move { worker.workflow.execute(input, &worker_handle).await });
        (handle, join)
    }
}

/// Convenience re-export so binaries/tests only need one `use`.
pub type EngineHandle = WorkflowHandle<truss_core::WorkflowStatus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tool_registry_registers_both_builtins() {
        let registry = default_tool_registry();
        assert!(registry.is_registered("web_search"));
        assert!(registry.is_registered("get_stock_price"));
    }

    #[tokio::test]
    async fn worker_from_config_uses_configured_task_queue() {
        let mut config = TrussConfig::default();
        config.database_url = "memory://".to_string();
        config.temporal_task_queue = "custom-queue".to_string();
        let worker = Worker::from_config(&config).await.unwrap();
        assert_eq!(worker.task_queue(), "custom-queue");
    }
}
