//! ABOUTME: In-process PubSub backed by per-channel broadcast channels,
//! ABOUTME: created lazily and kept alive for the process lifetime

use crate::PubSub;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use truss_core::Result;

const CHANNEL_CAPACITY: usize = 256;

pub struct InMemoryPubSub {
    channels: DashMap<String, broadcast::Sender<serde_json::Value>>,
}

impl InMemoryPubSub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<serde_json::Value> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> Result<()> {
        // No subscribers is not an error: a publisher may race ahead of the
        // first subscriber, and a miss here is acceptable for a side-channel.
        let _ = self.sender_for(channel).send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, serde_json::Value>> {
        let receiver = self.sender_for(channel).subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(
            |item: std::result::Result<serde_json::Value, BroadcastStreamRecvError>| match item {
                Ok(value) => Some(value),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "pubsub subscriber lagged, dropping skipped messages");
                    None
                }
            },
        );
        Ok(Box::pin(stream))
    }
}
