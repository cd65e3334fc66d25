//! ABOUTME: Tool registry and dispatch activity: resolves a `ToolCall` by
//! ABOUTME: name and invokes the matching handler under a timeout

mod builtins;
mod registry;

pub use builtins::{GetStockPriceTool, WebSearchTool};
pub use registry::{InvocationConfig, ToolRegistry};

use async_trait::async_trait;
use truss_core::{Result, ToolResultContent};

/// A single callable tool. Implementations should be side-effect-light and
/// return `TrussError::ToolExecutionFailed` (retryable) for transient
/// failures, distinct from `TrussError::InvalidInput` for bad arguments.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn call(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResultContent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use truss_core::{ToolCall, TrussError};

    #[tokio::test]
    async fn dispatching_an_unregistered_tool_is_not_retryable() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "tc1".into(),
            name: "does_not_exist".into(),
            arguments: serde_json::Map::new(),
        };
        let err = registry
            .dispatch(&call, &InvocationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TrussError::ToolUnregistered { .. }));
        assert!(!err.is_retryable());
    }
}
