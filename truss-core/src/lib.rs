//! ABOUTME: Data model and error types shared by every crate in the durable
//! ABOUTME: agent execution core — storage, tools, LLM streaming, workflow

pub mod error;
pub mod types;

pub use error::{Result, TrussError};
pub use types::{
    AgentConfig, AgentMemory, AgentWorkflowInput, AgentWorkflowOutput, JsonArgs, LLMConfig,
    LLMConfigBuilder, Message, Role, Run, RunStatus, RunStep, Session, ToolCall, ToolCallResult,
    ToolMetadata, ToolResultContent, WorkflowOutputStatus, WorkflowStatus,
};
