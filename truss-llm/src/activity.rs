//! ABOUTME: LLMStreamPublish activity: streams a completion, publishing
//! ABOUTME: each chunk and returning the accumulated assistant message

use crate::{ChunkAccumulator, LlmProvider, ProviderChunk};
use futures_util::StreamExt;
use truss_core::{LLMConfig, Message, Result, ToolMetadata, TrussError};
use truss_pubsub::{stream_channel, PubSub};

/// Streams a completion from `provider`, publishing each chunk to
/// `stream:{session_id}` as it arrives and accumulating the full assistant
/// message for persistence. A publish failure is logged and does not
/// interrupt accumulation — the pub/sub channel is a side-channel for
/// live consumers, not the durable record of the run.
pub async fn stream_and_accumulate(
    provider: &dyn LlmProvider,
    pubsub: &dyn PubSub,
    session_id: &str,
    config: &LLMConfig,
    system_prompt: &str,
    messages: &[Message],
    tools: Option<&[ToolMetadata]>,
) -> Result<Message> {
    let channel = stream_channel(session_id);
    let mut stream = provider
        .stream_completion(config, system_prompt, messages, tools)
        .await?;

    let mut accumulator = ChunkAccumulator::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if matches!(chunk, ProviderChunk::Done) {
            break;
        }
        if let Err(e) = pubsub.publish(&channel, chunk_to_json(&chunk)).await {
            tracing::warn!(error = %e, session_id, "failed to publish stream chunk");
        }
        accumulator.ingest(&chunk);
    }

    if accumulator.is_empty() {
        return Err(TrussError::EmptyCompletion);
    }

    accumulator.finish()
}

fn chunk_to_json(chunk: &ProviderChunk) -> serde_json::Value {
    match chunk {
        ProviderChunk::TextDelta(text) => serde_json::json!({ "type": "text_delta", "delta": text }),
        ProviderChunk::ToolCallDelta {
            id,
            name,
            arguments_delta,
        } => serde_json::json!({
            "type": "tool_call_delta",
            "id": id,
            "name": name,
            "arguments_delta": arguments_delta,
        }),
        ProviderChunk::Done => serde_json::json!({ "type": "done" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use truss_pubsub::InMemoryPubSub;

    struct FixedProvider {
        chunks: Vec<ProviderChunk>,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn stream_completion(
            &self,
            _config: &LLMConfig,
            _system_prompt: &str,
            _messages: &[Message],
            _tools: Option<&[ToolMetadata]>,
        ) -> Result<BoxStream<'static, Result<ProviderChunk>>> {
            let chunks = self.chunks.clone();
            Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
        }
    }

    #[tokio::test]
    async fn accumulates_and_publishes_each_chunk() {
        let provider = FixedProvider {
            chunks: vec![
                ProviderChunk::TextDelta("hi ".into()),
                ProviderChunk::TextDelta("there".into()),
                ProviderChunk::Done,
            ],
        };
        let pubsub = InMemoryPubSub::new();
        let mut sub = pubsub.subscribe("stream:s1").await.unwrap();
        let config = LLMConfig::builder("gpt-4o").build().unwrap();
        let message = stream_and_accumulate(
            &provider,
            &pubsub,
            "s1",
            &config,
            "be helpful",
            &[],
            None,
        )
        .await
        .unwrap();
        assert_eq!(message.content.as_deref(), Some("hi there"));

        use futures::StreamExt as _;
        let first = sub.next().await.unwrap();
        assert_eq!(first["delta"], "hi ");
    }

    #[tokio::test]
    async fn zero_chunks_is_empty_completion() {
        let provider = FixedProvider {
            chunks: vec![ProviderChunk::Done],
        };
        let pubsub = InMemoryPubSub::new();
        let config = LLMConfig::builder("gpt-4o").build().unwrap();
        let err = stream_and_accumulate(&provider, &pubsub, "s1", &config, "x", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, TrussError::EmptyCompletion));
        assert!(err.is_retryable());
    }
}
