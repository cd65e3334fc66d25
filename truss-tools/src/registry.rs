//! ABOUTME: ToolRegistry dispatches a ToolCall to its registered handler
//! ABOUTME: under a timeout, mirroring the teacher's tool-invocation layer

use crate::ToolHandler;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use truss_core::{Result, ToolCall, ToolCallResult, ToolMetadata, TrussError};

/// Dispatch-time knobs, scaled down from the teacher's full
/// `InvocationConfig` to the fields the dispatch activity actually needs.
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    pub execution_timeout: Duration,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(60),
        }
    }
}

/// Registry of available tools, keyed by name. Registration is expected
/// at worker startup; dispatch happens once per tool call emitted by the
/// LLM streaming activity.
pub struct ToolRegistry {
    handlers: DashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    pub fn register(&self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Resolves tool metadata for the names an `AgentConfig` allows, used
    /// to advertise available tools to the LLM provider. Names that are
    /// not registered are silently skipped rather than failing the call —
    /// an agent config listing a not-yet-registered tool should degrade,
    /// not break dispatch of the tools it does have.
    #[must_use]
    pub fn metadata(&self, names: &[String]) -> Vec<ToolMetadata> {
        names
            .iter()
            .filter_map(|name| {
                self.handlers.get(name).map(|entry| ToolMetadata {
                    name: entry.name().to_string(),
                    description: entry.description().to_string(),
                })
            })
            .collect()
    }

    /// Resolves `tool_call.name` in the registry and invokes it, enforcing
    /// `config.execution_timeout`. Matches `ExecuteTool`'s contract: unknown
    /// tool names surface as `TrussError::ToolUnregistered` (non-retryable),
    /// execution failures as `TrussError::ToolExecutionFailed` (retryable).
    pub async fn dispatch(
        &self,
        tool_call: &ToolCall,
        config: &InvocationConfig,
    ) -> Result<ToolCallResult> {
        let handler = self
            .handlers
            .get(&tool_call.name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TrussError::ToolUnregistered {
                name: tool_call.name.clone(),
            })?;

        let result = tokio::time::timeout(
            config.execution_timeout,
            handler.call(tool_call.arguments.clone()),
        )
        .await
        .map_err(|_| TrussError::ToolExecutionFailed {
            name: tool_call.name.clone(),
            message: format!(
                "execution exceeded {:?} timeout",
                config.execution_timeout
            ),
        })?
        .map_err(|e| TrussError::ToolExecutionFailed {
            name: tool_call.name.clone(),
            message: e.to_string(),
        })?;

        Ok(ToolCallResult {
            tool_call_id: tool_call.id.clone(),
            content: result,
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
