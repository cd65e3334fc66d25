//! ABOUTME: Accumulates a stream of ProviderChunks into one assistant
//! ABOUTME: Message, preserving first-seen tool-call order exactly

use crate::ProviderChunk;
use std::collections::HashMap;
use truss_core::{Message, ToolCall};

struct ToolCallBuffer {
    name: Option<String>,
    arguments: Vec<String>,
}

/// Builds a single assistant `Message` out of interleaved text and
/// tool-call delta chunks. Tool calls are keyed by `id`; the order calls
/// are first observed in is preserved in the final message regardless of
/// how their fragments interleave with text.
#[derive(Default)]
pub struct ChunkAccumulator {
    full_content: Vec<String>,
    tool_call_order: Vec<String>,
    tool_buffers: HashMap<String, ToolCallBuffer>,
}

impl ChunkAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, chunk: &ProviderChunk) {
        match chunk {
            ProviderChunk::TextDelta(text) => self.full_content.push(text.clone()),
            ProviderChunk::ToolCallDelta {
                id,
                name,
                arguments_delta,
            } => {
                let buffer = self.tool_buffers.entry(id.clone()).or_insert_with(|| {
                    self.tool_call_order.push(id.clone());
                    ToolCallBuffer {
                        name: None,
                        arguments: Vec::new(),
                    }
                });
                if let Some(name) = name {
                    buffer.name = Some(name.clone());
                }
                if let Some(delta) = arguments_delta {
                    buffer.arguments.push(delta.clone());
                }
            }
            ProviderChunk::Done => {}
        }
    }

    /// Returns `true` once at least one chunk carrying content has been
    /// ingested; used to detect a zero-chunk completion (`EmptyCompletion`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.full_content.is_empty() && self.tool_call_order.is_empty()
    }

    /// Finalises accumulation into an assistant `Message`. Tool call
    /// arguments are parsed as JSON if possible; malformed JSON is retained
    /// under a sentinel `{"raw": "..."}` key rather than dropped, per
    /// spec §4.D step 3 / §9 "Ownership of streaming state" — the call is
    /// never silently emptied out.
    pub fn finish(self) -> truss_core::Result<Message> {
        let content = if self.full_content.is_empty() {
            None
        } else {
            Some(self.full_content.concat())
        };

        let tool_calls = if self.tool_call_order.is_empty() {
            None
        } else {
            let mut calls = Vec::with_capacity(self.tool_call_order.len());
            for id in &self.tool_call_order {
                let buffer = self
                    .tool_buffers
                    .get(id)
                    .expect("tool_call_order only ever holds keys present in tool_buffers");
                let arguments_raw = buffer.arguments.concat();
                let arguments = if arguments_raw.trim().is_empty() {
                    serde_json::Map::new()
                } else {
                    serde_json::from_str::<serde_json::Value>(&arguments_raw)
                        .ok()
                        .and_then(|value| value.as_object().cloned())
                        .unwrap_or_else(|| {
                            let mut raw = serde_json::Map::new();
                            raw.insert(
                                "raw".to_string(),
                                serde_json::Value::String(arguments_raw.clone()),
                            );
                            raw
                        })
                };
                calls.push(ToolCall {
                    id: id.clone(),
                    name: buffer.name.clone().unwrap_or_default(),
                    arguments,
                });
            }
            Some(calls)
        };

        Message::assistant(content, tool_calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_first_seen_tool_call_order_across_interleaved_chunks() {
        let mut acc = ChunkAccumulator::new();
        acc.ingest(&ProviderChunk::ToolCallDelta {
            id: "b".into(),
            name: Some("get_stock_price".into()),
            arguments_delta: Some(r#"{"ticker_symbol":"MSFT"}"#.into()),
        });
        acc.ingest(&ProviderChunk::TextDelta("thinking...".into()));
        acc.ingest(&ProviderChunk::ToolCallDelta {
            id: "a".into(),
            name: Some("web_search".into()),
            arguments_delta: Some(r#"{"query":"rust"}"#.into()),
        });
        let message = acc.finish().unwrap();
        let tool_calls = message.tool_calls.unwrap();
        assert_eq!(tool_calls[0].id, "b");
        assert_eq!(tool_calls[1].id, "a");
    }

    #[test]
    fn malformed_arguments_are_retained_under_a_raw_sentinel_key() {
        let mut acc = ChunkAccumulator::new();
        acc.ingest(&ProviderChunk::ToolCallDelta {
            id: "a".into(),
            name: Some("web_search".into()),
            arguments_delta: Some("not json".into()),
        });
        let message = acc.finish().unwrap();
        let tool_calls = message.tool_calls.unwrap();
        assert_eq!(
            tool_calls[0].arguments.get("raw").and_then(|v| v.as_str()),
            Some("not json")
        );
    }

    #[test]
    fn text_only_completion_has_no_tool_calls() {
        let mut acc = ChunkAccumulator::new();
        acc.ingest(&ProviderChunk::TextDelta("hello ".into()));
        acc.ingest(&ProviderChunk::TextDelta("world".into()));
        let message = acc.finish().unwrap();
        assert_eq!(message.content.as_deref(), Some("hello world"));
        assert!(message.tool_calls.is_none());
    }

    #[test]
    fn empty_accumulation_is_reported() {
        let acc = ChunkAccumulator::new();
        assert!(acc.is_empty());
    }
}
