use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::StreamReadReply;

use crate::errors::{AppError, Result};
use crate::models::events::DomainEvent;

/// Outbound port for domain-event publication. Fire-and-forget from the
/// business caller's perspective: transport failures surface as
/// `UpstreamUnavailable` and the caller decides whether to swallow them.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, topic: &str, event: &DomainEvent) -> Result<()>;
}

/// Redis Streams implementation. Each topic is a stream; entries hold the
/// serialized envelope under a single `payload` field.
#[derive(Clone)]
pub struct RedisEventBus {
    conn: ConnectionManager,
}

/// Upper bound on a single publish so a dead broker cannot stall the
/// request path.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

impl RedisEventBus {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl EventSink for RedisEventBus {
    async fn publish(&self, topic: &str, event: &DomainEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(topic).arg("*").arg("payload").arg(&payload);
        let push = cmd.query_async::<_, String>(&mut conn);

        match tokio::time::timeout(PUBLISH_TIMEOUT, push).await {
            Ok(Ok(_id)) => {
                tracing::debug!("event {} pushed to '{}'", event.event_type, topic);
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(AppError::upstream(format!(
                "publish to '{}' timed out",
                topic
            ))),
        }
    }
}

/// One blocking poll of a stream. Returns `(entry_id, payload)` pairs past
/// `last_id`; empty when the block window elapses with nothing new. Callers
/// run this in a loop and check their shutdown signal between polls.
pub async fn read_stream(
    conn: &mut ConnectionManager,
    stream: &str,
    last_id: &str,
    block_ms: u64,
) -> Result<Vec<(String, String)>> {
    let reply: Option<StreamReadReply> = redis::cmd("XREAD")
        .arg("BLOCK")
        .arg(block_ms)
        .arg("COUNT")
        .arg(64)
        .arg("STREAMS")
        .arg(stream)
        .arg(last_id)
        .query_async(conn)
        .await?;

    let mut entries = Vec::new();
    if let Some(reply) = reply {
        for key in reply.keys {
            for id in key.ids {
                if let Some(payload) = id.get::<String>("payload") {
                    entries.push((id.id, payload));
                }
            }
        }
    }
    Ok(entries)
}
