//! ABOUTME: Redis-backed PubSub for multi-process / multi-worker
//! ABOUTME: deployments, driven by `REDIS_URL` (see truss-config)

use crate::PubSub;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use redis::AsyncCommands;
use truss_core::{Result, TrussError};

/// Redis-backed `PubSub`. Each `publish` acquires a pooled multiplexed
/// connection; each `subscribe` opens its own dedicated connection, since
/// Redis pub/sub connections cannot also serve regular commands.
pub struct RedisPubSub {
    client: redis::Client,
}

impl RedisPubSub {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| TrussError::storage(format!("invalid REDIS_URL: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PubSub for RedisPubSub {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TrussError::storage(format!("redis connect: {e}")))?;
        let body = payload.to_string();
        let _: () = conn
            .publish(channel, body)
            .await
            .map_err(|e| TrussError::storage(format!("redis publish: {e}")))?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, serde_json::Value>> {
        let pubsub_conn = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| TrussError::storage(format!("redis pubsub connect: {e}")))?;
        let mut pubsub_conn = pubsub_conn;
        pubsub_conn
            .subscribe(channel)
            .await
            .map_err(|e| TrussError::storage(format!("redis subscribe: {e}")))?;
        let stream = pubsub_conn.into_on_message().filter_map(|msg| async move {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping non-utf8 redis pubsub payload");
                    return None;
                }
            };
            match serde_json::from_str(&payload) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed redis pubsub payload");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
