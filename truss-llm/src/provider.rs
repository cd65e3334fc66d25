//! ABOUTME: LlmProvider trait plus an OpenAI-compatible SSE implementation,
//! ABOUTME: grounded on the same eventsource-stream parsing the teacher uses

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use truss_core::{LLMConfig, Message, Result, ToolMetadata, TrussError};

/// One unit of a streaming completion. Providers emit `TextDelta` and
/// `ToolCallDelta` chunks interleaved in arrival order and a single
/// trailing `Done`; a malformed upstream event is logged and skipped
/// rather than surfaced, per SPEC_FULL.md §4.D.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderChunk {
    TextDelta(String),
    /// A partial tool-call fragment. `id` is stable across fragments of the
    /// same call; `name`/`arguments_delta` are `None` when this fragment
    /// doesn't carry that piece.
    ToolCallDelta {
        id: String,
        name: Option<String>,
        arguments_delta: Option<String>,
    },
    Done,
}

/// A chat-completion streaming backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn stream_completion(
        &self,
        config: &LLMConfig,
        system_prompt: &str,
        messages: &[Message],
        tools: Option<&[ToolMetadata]>,
    ) -> Result<BoxStream<'static, Result<ProviderChunk>>>;
}

/// Implementation against any OpenAI-compatible `/chat/completions`
/// streaming endpoint (OpenAI itself, and the many providers that mirror
/// its wire format), using Server-Sent Events.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn build_request_body(
        &self,
        config: &LLMConfig,
        system_prompt: &str,
        messages: &[Message],
        tools: Option<&[ToolMetadata]>,
    ) -> serde_json::Value {
        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        wire_messages.push(serde_json::json!({ "role": "system", "content": system_prompt }));
        for message in messages {
            wire_messages.push(message_to_wire(message));
        }

        let mut body = serde_json::json!({
            "model": config.model_name(),
            "temperature": config.temperature(),
            "top_p": config.top_p(),
            "frequency_penalty": config.frequency_penalty(),
            "presence_penalty": config.presence_penalty(),
            "stream": true,
            "messages": wire_messages,
        });
        if let Some(max_tokens) = config.max_tokens() {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::json!(tools
                    .iter()
                    .map(|tool| serde_json::json!({
                        "type": "function",
                        "function": { "name": tool.name, "description": tool.description },
                    }))
                    .collect::<Vec<_>>());
            }
        }
        body
    }
}

fn message_to_wire(message: &Message) -> serde_json::Value {
    let mut value = serde_json::json!({ "role": message.role.to_string() });
    if let Some(content) = &message.content {
        value["content"] = serde_json::json!(content);
    }
    if let Some(tool_calls) = &message.tool_calls {
        value["tool_calls"] = serde_json::json!(tool_calls
            .iter()
            .map(|call| serde_json::json!({
                "id": call.id,
                "type": "function",
                "function": { "name": call.name, "arguments": serde_json::Value::Object(call.arguments.clone()).to_string() },
            }))
            .collect::<Vec<_>>());
    }
    if let Some(tool_call_id) = &message.tool_call_id {
        value["tool_call_id"] = serde_json::json!(tool_call_id);
    }
    value
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn stream_completion(
        &self,
        config: &LLMConfig,
        system_prompt: &str,
        messages: &[Message],
        tools: Option<&[ToolMetadata]>,
    ) -> Result<BoxStream<'static, Result<ProviderChunk>>> {
        let body = self.build_request_body(config, system_prompt, messages, tools);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TrussError::provider(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(TrussError::provider(format!(
                "provider returned {status}: {text}"
            )));
        }

        let byte_stream = response.bytes_stream();
        let event_stream = eventsource_stream::Eventsource::eventsource(byte_stream);
        let chunk_stream = event_stream.filter_map(|event| async move {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed SSE event, skipping");
                    return None;
                }
            };
            if event.data == "[DONE]" {
                return Some(Ok(ProviderChunk::Done));
            }
            match parse_openai_chunk(&event.data) {
                Ok(Some(chunk)) => Some(Ok(chunk)),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable completion chunk, skipping");
                    None
                }
            }
        });
        Ok(Box::pin(chunk_stream))
    }
}

fn parse_openai_chunk(data: &str) -> std::result::Result<Option<ProviderChunk>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    let delta = &value["choices"][0]["delta"];
    if let Some(content) = delta["content"].as_str() {
        if !content.is_empty() {
            return Ok(Some(ProviderChunk::TextDelta(content.to_string())));
        }
    }
    if let Some(tool_calls) = delta["tool_calls"].as_array() {
        if let Some(first) = tool_calls.first() {
            let id = first["id"]
                .as_str()
                .map(ToString::to_string)
                .unwrap_or_else(|| format!("index:{}", first["index"].as_u64().unwrap_or(0)));
            let name = first["function"]["name"].as_str().map(ToString::to_string);
            let arguments_delta = first["function"]["arguments"]
                .as_str()
                .map(ToString::to_string);
            return Ok(Some(ProviderChunk::ToolCallDelta {
                id,
                name,
                arguments_delta,
            }));
        }
    }
    Ok(None)
}
