//! ABOUTME: TrussAgentExecutionWorkflow: validate, create the run, then
//! ABOUTME: loop thinking/executing-tools until completion or cancellation

use crate::StatusHandle;
use std::sync::Arc;
use truss_core::{
    AgentWorkflowInput, AgentWorkflowOutput, LLMConfig, Message, Result, RunStatus, TrussError,
    WorkflowOutputStatus, WorkflowStatus,
};
use truss_engine::RetryPolicy;
use truss_llm::LlmProvider;
use truss_pubsub::PubSub;
use truss_storage::Storage;
use truss_tools::{InvocationConfig, ToolRegistry};

/// Tunables for one workflow execution; `max_iterations` bounds the
/// reason-act loop the way the original implementation's iteration
/// counter does, guarding against a tool-calling LLM that never settles.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub max_iterations: u32,
    pub tool_invocation: InvocationConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_invocation: InvocationConfig::default(),
        }
    }
}

/// The durable agent-execution workflow. Holds no per-run state itself —
/// each call to [`execute`](Self::execute) is a fresh run driven entirely
/// by its `input` and the supplied [`StatusHandle`].
pub struct TrussAgentExecutionWorkflow {
    storage: Arc<dyn Storage>,
    tools: Arc<ToolRegistry>,
    llm_provider: Arc<dyn LlmProvider>,
    pubsub: Arc<dyn PubSub>,
    config: WorkflowConfig,
}

impl TrussAgentExecutionWorkflow {
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        tools: Arc<ToolRegistry>,
        llm_provider: Arc<dyn LlmProvider>,
        pubsub: Arc<dyn PubSub>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            storage,
            tools,
            llm_provider,
            pubsub,
            config,
        }
    }

    /// Runs the full reason-act loop for one `AgentWorkflowInput`,
    /// returning once the agent has produced a final assistant message, the
    /// run is cancelled, or an unretryable error terminates it. The run's
    /// terminal status is always persisted before returning, matching the
    /// original workflow's `try/except/finally` structure.
    pub async fn execute(
        &self,
        input: AgentWorkflowInput,
        handle: &StatusHandle,
    ) -> Result<AgentWorkflowOutput> {
        if uuid::Uuid::parse_str(&input.session_id).is_err() {
            return Err(TrussError::invalid_input(format!(
                "session_id '{}' is not a valid UUID",
                input.session_id
            )));
        }
        input.user_message.validate()?;

        let session = RetryPolicy::storage_read()
            .run("GetSession", || self.storage.get_session(&input.session_id))
            .await?;

        let run = RetryPolicy::storage_write()
            .run("CreateRun", || self.storage.create_run(&input.session_id))
            .await?;

        handle.set_status(WorkflowStatus {
            current_status: "thinking".to_string(),
            cancellation_requested: false,
            iterations_completed: 0,
        });

        let create_user_step = RetryPolicy::storage_write().run("CreateRunStep", || {
            self.storage
                .create_run_step_from_message(&run.id, &input.user_message)
        });
        if let Err(err) = create_user_step.await {
            self.finalize(&run.id, RunStatus::Failed, Some(err.to_string()))
                .await;
            return Err(err);
        }

        let agent_config = match RetryPolicy::storage_read()
            .run("LoadAgentConfig", || {
                self.storage.load_agent_config(&session.agent_config_id)
            })
            .await
        {
            Ok(config) => config,
            Err(err) => {
                self.finalize(&run.id, RunStatus::Failed, Some(err.to_string()))
                    .await;
                return Err(err);
            }
        };

        let tool_metadata = agent_config
            .tools
            .as_ref()
            .map(|names| self.tools.metadata(names))
            .unwrap_or_default();

        match self
            .run_loop(&run.id, &input.session_id, &agent_config.system_prompt, &agent_config.llm_config, &tool_metadata, handle)
            .await
        {
            Ok(Outcome::Completed(final_message)) => {
                self.finalize(&run.id, RunStatus::Succeeded, None).await;
                handle.set_status(WorkflowStatus {
                    current_status: "completed".to_string(),
                    cancellation_requested: false,
                    iterations_completed: handle.status().iterations_completed,
                });
                Ok(AgentWorkflowOutput {
                    run_id: run.id,
                    status: WorkflowOutputStatus::Completed,
                    final_message: Some(final_message),
                    error: None,
                })
            }
            Ok(Outcome::Cancelled) => {
                self.finalize(&run.id, RunStatus::Cancelled, None).await;
                handle.set_status(WorkflowStatus {
                    current_status: "cancelled".to_string(),
                    cancellation_requested: true,
                    iterations_completed: handle.status().iterations_completed,
                });
                Ok(AgentWorkflowOutput {
                    run_id: run.id,
                    status: WorkflowOutputStatus::Cancelled,
                    final_message: None,
                    error: None,
                })
            }
            Err(err) => {
                self.finalize(&run.id, RunStatus::Failed, Some(err.to_string()))
                    .await;
                handle.set_status(WorkflowStatus {
                    current_status: "errored".to_string(),
                    cancellation_requested: handle.cancellation_requested(),
                    iterations_completed: handle.status().iterations_completed,
                });
                Ok(AgentWorkflowOutput {
                    run_id: run.id,
                    status: WorkflowOutputStatus::Errored,
                    final_message: None,
                    error: Some(err.to_string()),
                })
            }
        }
    }

    async fn run_loop(
        &self,
        run_id: &str,
        session_id: &str,
        system_prompt: &str,
        llm_config: &LLMConfig,
        tool_metadata: &[truss_core::ToolMetadata],
        handle: &StatusHandle,
    ) -> Result<Outcome> {
        let mut iterations = 0u32;
        loop {
            if handle.cancellation_requested() {
                return Ok(Outcome::Cancelled);
            }

            let steps = RetryPolicy::storage_read()
                .run("GetRunMemory", || self.storage.get_steps_for_session(session_id))
                .await?;
            let messages = steps
                .iter()
                .map(truss_core::RunStep::to_message)
                .collect::<Result<Vec<Message>>>()?;
            let memory = truss_core::AgentMemory::new(messages)?;

            let assistant_message = RetryPolicy::llm_stream()
                .run("LLMStreamPublish", || {
                    truss_llm::stream_and_accumulate(
                        self.llm_provider.as_ref(),
                        self.pubsub.as_ref(),
                        session_id,
                        llm_config,
                        system_prompt,
                        memory.messages(),
                        Some(tool_metadata),
                    )
                })
                .await?;

            RetryPolicy::storage_write()
                .run("CreateRunStep", || {
                    self.storage
                        .create_run_step_from_message(run_id, &assistant_message)
                })
                .await?;

            let Some(tool_calls) = assistant_message.tool_calls.clone().filter(|c| !c.is_empty())
            else {
                return Ok(Outcome::Completed(assistant_message));
            };

            if handle.cancellation_requested() {
                return Ok(Outcome::Cancelled);
            }

            handle.set_status(WorkflowStatus {
                current_status: "executing-tools".to_string(),
                cancellation_requested: false,
                iterations_completed: iterations,
            });

            let dispatches = tool_calls.iter().map(|call| {
                let registry = Arc::clone(&self.tools);
                let invocation = self.config.tool_invocation.clone();
                async move {
                    RetryPolicy::tool_execution()
                        .run("ExecuteTool", || registry.dispatch(call, &invocation))
                        .await
                }
            });
            let results = futures::future::join_all(dispatches).await;

            for result in results {
                let tool_result = result?;
                let tool_message = Message::tool(
                    tool_result.content.to_storage_string(),
                    tool_result.tool_call_id,
                )?;
                RetryPolicy::storage_write()
                    .run("CreateRunStep", || {
                        self.storage.create_run_step_from_message(run_id, &tool_message)
                    })
                    .await?;
            }

            iterations += 1;
            handle.set_status(WorkflowStatus {
                current_status: "thinking".to_string(),
                cancellation_requested: false,
                iterations_completed: iterations,
            });
            if iterations >= self.config.max_iterations {
                return Err(TrussError::internal(format!(
                    "exceeded max_iterations ({})",
                    self.config.max_iterations
                )));
            }
        }
    }

    /// Finalises the run's terminal status. Failures here are logged and
    /// swallowed rather than propagated — matching the original's `finally`
    /// block, which never lets a finalisation error mask the real outcome.
    async fn finalize(&self, run_id: &str, status: RunStatus, error: Option<String>) {
        let outcome = RetryPolicy::finalize_run()
            .run("FinalizeRun", || {
                self.storage.update_run_status(run_id, status, error.clone())
            })
            .await;
        if let Err(err) = outcome {
            tracing::error!(run_id, error = %err, "failed to finalize run status");
        }
    }
}

enum Outcome {
    Completed(Message),
    Cancelled,
}
