//! ABOUTME: Core data model: messages, tool calls, agent/run state, workflow I/O
//! ABOUTME: Construction is the only validation path; invalid states cannot be built

use crate::error::{Result, TrussError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single chat message, optionally associated with tool calls or a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

impl Message {
    /// Construct a `system` message. `system` and `user` messages must carry
    /// non-null content and no tool fields.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Construct an `assistant` message. Must carry at least one of
    /// `content`/`tool_calls`; validated eagerly so invalid messages cannot
    /// exist.
    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<ToolCall>>) -> Result<Self> {
        if content.is_none() && tool_calls.as_ref().map_or(true, Vec::is_empty) {
            return Err(TrussError::invalid_input(
                "assistant message requires content or at least one tool call",
            ));
        }
        Ok(Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        })
    }

    /// Construct a `tool` message. Must carry a `tool_call_id` and content.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Result<Self> {
        let tool_call_id = tool_call_id.into();
        if tool_call_id.is_empty() {
            return Err(TrussError::invalid_input(
                "tool message requires a non-empty tool_call_id",
            ));
        }
        Ok(Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id),
        })
    }

    /// Validate a message constructed by other means (e.g. deserialised from
    /// storage) against the same invariants the constructors enforce.
    pub fn validate(&self) -> Result<()> {
        match self.role {
            Role::Tool => {
                if self.tool_call_id.is_none() || self.content.is_none() {
                    return Err(TrussError::invalid_input(
                        "tool message requires tool_call_id and content",
                    ));
                }
            }
            Role::Assistant => {
                if self.content.is_none() && self.tool_calls.as_ref().map_or(true, Vec::is_empty) {
                    return Err(TrussError::invalid_input(
                        "assistant message requires content or tool_calls",
                    ));
                }
            }
            Role::System | Role::User => {
                if self.content.is_none() {
                    return Err(TrussError::invalid_input(
                        "system/user message requires content",
                    ));
                }
                if self.tool_calls.is_some() || self.tool_call_id.is_some() {
                    return Err(TrussError::invalid_input(
                        "system/user message must not carry tool fields",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A single tool invocation request coming from the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolCall {
    /// Unique within the assistant turn; provider-supplied or synthesised at
    /// accumulation time, and must be preserved end-to-end.
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Result payload returned by a tool execution. Modelled as a tagged union
/// so callers can distinguish "the tool returned structured JSON" from "the
/// tool returned an opaque string", with a canonical string form for
/// storage (spec §9 "Polymorphism").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Json(serde_json::Value),
}

impl ToolResultContent {
    #[must_use]
    pub fn to_storage_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub content: ToolResultContent,
}

/// An ordered, non-empty sequence of messages reconstructed from persisted
/// run-steps in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMemory {
    messages: Vec<Message>,
}

impl AgentMemory {
    pub fn new(messages: Vec<Message>) -> Result<Self> {
        if messages.is_empty() {
            return Err(TrussError::invalid_input(
                "agent memory must contain at least one message",
            ));
        }
        Ok(Self { messages })
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// Configuration options for the LLM used by an agent. Immutable once
/// constructed; construction is the only validation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    model_name: String,
    temperature: f64,
    max_tokens: Option<u32>,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
}

impl LLMConfig {
    pub fn builder(model_name: impl Into<String>) -> LLMConfigBuilder {
        LLMConfigBuilder::new(model_name)
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
    #[must_use]
    pub const fn temperature(&self) -> f64 {
        self.temperature
    }
    #[must_use]
    pub const fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }
    #[must_use]
    pub const fn top_p(&self) -> f64 {
        self.top_p
    }
    #[must_use]
    pub const fn frequency_penalty(&self) -> f64 {
        self.frequency_penalty
    }
    #[must_use]
    pub const fn presence_penalty(&self) -> f64 {
        self.presence_penalty
    }
}

pub struct LLMConfigBuilder {
    model_name: String,
    temperature: f64,
    max_tokens: Option<u32>,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
}

impl LLMConfigBuilder {
    fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            temperature: 0.7,
            max_tokens: None,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }

    #[must_use]
    pub const fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub const fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    #[must_use]
    pub const fn frequency_penalty(mut self, frequency_penalty: f64) -> Self {
        self.frequency_penalty = frequency_penalty;
        self
    }

    #[must_use]
    pub const fn presence_penalty(mut self, presence_penalty: f64) -> Self {
        self.presence_penalty = presence_penalty;
        self
    }

    pub fn build(self) -> Result<LLMConfig> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(TrussError::invalid_input(
                "temperature must be within [0.0, 2.0]",
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(TrussError::invalid_input("top_p must be within [0.0, 1.0]"));
        }
        if self.frequency_penalty < 0.0 {
            return Err(TrussError::invalid_input(
                "frequency_penalty must be >= 0",
            ));
        }
        if self.presence_penalty < 0.0 {
            return Err(TrussError::invalid_input("presence_penalty must be >= 0"));
        }
        if let Some(max_tokens) = self.max_tokens {
            if max_tokens == 0 {
                return Err(TrussError::invalid_input("max_tokens must be positive"));
            }
        }
        if self.model_name.is_empty() {
            return Err(TrussError::invalid_input("model_name must not be empty"));
        }
        Ok(LLMConfig {
            model_name: self.model_name,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
        })
    }
}

/// High-level configuration describing an autonomous agent instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    pub llm_config: LLMConfig,
    pub tools: Option<Vec<String>>,
}

impl AgentConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        llm_config: LLMConfig,
        tools: Option<Vec<String>>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(TrussError::invalid_input("agent name must not be empty"));
        }
        Ok(Self {
            id: id.into(),
            name,
            system_prompt: system_prompt.into(),
            llm_config,
            tools,
        })
    }
}

/// A conversation session. Exclusively owns its runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_config_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// One execution attempt of an agent within a session. Exactly one status
/// transition per terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub session_id: String,
    pub status: RunStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable persisted message in a run's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStep {
    pub id: String,
    pub run_id: String,
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Option<serde_json::Value>,
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RunStep {
    /// Reconstruct the `Message` this step represents, for memory assembly.
    pub fn to_message(&self) -> Result<Message> {
        let tool_calls = match &self.tool_calls {
            Some(value) => Some(
                serde_json::from_value::<Vec<ToolCall>>(value.clone())
                    .map_err(|e| TrussError::internal(format!("corrupt tool_calls: {e}")))?,
            ),
            None => None,
        };
        let message = Message {
            role: self.role,
            content: self.content.clone(),
            tool_calls,
            tool_call_id: self.tool_call_id.clone(),
        };
        message.validate()?;
        Ok(message)
    }
}

/// Workflow start input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentWorkflowInput {
    pub session_id: String,
    pub user_message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowOutputStatus {
    Running,
    Completed,
    Errored,
    Cancelled,
}

/// Workflow terminal (or in-flight) output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentWorkflowOutput {
    pub run_id: String,
    pub status: WorkflowOutputStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_message: Option<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Additional metadata exposed via the optional detailed-status query
/// (SPEC_FULL.md §4.E); `get_status()` itself still returns a plain string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub current_status: String,
    pub cancellation_requested: bool,
    pub iterations_completed: u32,
}

/// Metadata describing a registered tool, used by dispatch validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
}

pub type JsonArgs = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_requires_id() {
        assert!(Message::tool("result", "").is_err());
        assert!(Message::tool("result", "tc1").is_ok());
    }

    #[test]
    fn assistant_message_requires_content_or_tool_calls() {
        assert!(Message::assistant(None, None).is_err());
        assert!(Message::assistant(Some("hi".into()), None).is_ok());
        let tc = ToolCall {
            id: "tc1".into(),
            name: "x".into(),
            arguments: serde_json::Map::new(),
        };
        assert!(Message::assistant(None, Some(vec![tc])).is_ok());
    }

    #[test]
    fn llm_config_rejects_out_of_range_temperature() {
        assert!(LLMConfig::builder("gpt-4o")
            .temperature(3.0)
            .build()
            .is_err());
        assert!(LLMConfig::builder("gpt-4o")
            .temperature(2.0)
            .build()
            .is_ok());
        assert!(LLMConfig::builder("gpt-4o")
            .temperature(0.0)
            .build()
            .is_ok());
    }

    #[test]
    fn message_round_trips_through_json() {
        let msg = Message::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn invalid_role_string_is_rejected_at_deserialization() {
        let raw = r#"{"role":"invalid","content":"oops"}"#;
        let result: std::result::Result<Message, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn tool_result_content_serializes_canonically() {
        let text = ToolResultContent::Text("hi".into());
        assert_eq!(text.to_storage_string(), "hi");
        let json = ToolResultContent::Json(serde_json::json!({"a": 1}));
        assert_eq!(json.to_storage_string(), r#"{"a":1}"#);
    }

    proptest::proptest! {
        /// Invariant 5 (spec.md §8): every data-model value serialises to
        /// JSON and deserialises back to an equal value.
        #[test]
        fn user_message_round_trips_for_arbitrary_content(content in ".*") {
            let msg = Message::user(content);
            let json = serde_json::to_string(&msg).unwrap();
            let back: Message = serde_json::from_str(&json).unwrap();
            proptest::prop_assert_eq!(msg, back);
        }

        #[test]
        fn llm_config_round_trips_within_valid_ranges(
            temperature in 0.0f64..=2.0,
            top_p in 0.0f64..=1.0,
            frequency_penalty in 0.0f64..10.0,
            presence_penalty in 0.0f64..10.0,
        ) {
            let config = LLMConfig::builder("gpt-4o")
                .temperature(temperature)
                .top_p(top_p)
                .frequency_penalty(frequency_penalty)
                .presence_penalty(presence_penalty)
                .build()
                .unwrap();
            let json = serde_json::to_string(&config).unwrap();
            let back: LLMConfig = serde_json::from_str(&json).unwrap();
            proptest::prop_assert_eq!(config, back);
        }
    }
}
