//! ABOUTME: Pub/sub contract used by the LLM streaming activity to publish
//! ABOUTME: chunks to `stream:{session_id}` — in-memory and Redis backends

mod memory;
mod redis_backend;

pub use memory::InMemoryPubSub;
pub use redis_backend::RedisPubSub;

use async_trait::async_trait;
use futures::stream::BoxStream;
use truss_core::Result;

/// A transport for broadcasting JSON payloads on named channels.
/// Subscribers that are not listening when a message is published simply
/// miss it — this is a streaming side-channel, not a durable log; the
/// durable record of a run lives in `Storage`.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> Result<()>;

    /// Subscribes to `channel`, returning a stream of payloads published
    /// after subscription. The stream never terminates on its own; callers
    /// drop it to unsubscribe.
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, serde_json::Value>>;
}

/// Channel naming convention shared by publishers and subscribers: chunk
/// streams are scoped per session, matching the original implementation's
/// `stream:{session_id}` key.
#[must_use]
pub fn stream_channel(session_id: &str) -> String {
    format!("stream:{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn in_memory_pubsub_delivers_to_active_subscriber() {
        let bus = InMemoryPubSub::new();
        let mut stream = bus.subscribe("stream:s1").await.unwrap();
        bus.publish("stream:s1", serde_json::json!({"delta": "hi"}))
            .await
            .unwrap();
        let received = stream.next().await.unwrap();
        assert_eq!(received, serde_json::json!({"delta": "hi"}));
    }

    #[test]
    fn stream_channel_matches_the_original_naming_convention() {
        assert_eq!(stream_channel("abc"), "stream:abc");
    }
}
