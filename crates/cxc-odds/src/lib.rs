//! Realtime odds relay: subscribes to a Redis pub/sub channel, keeps a
//! process-wide snapshot of the latest message, and fans messages out to
//! WebSocket subscribers.
//!
//! Single-writer discipline: only the subscribe loop in [`run`] ever writes
//! `latestOdds`; every other reader takes a clone through [`OddsRelay::snapshot`].

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

const BUS_CAPACITY: usize = 1024;

/// Cloneable handle shared across Axum handlers: one per process, wired into
/// `AppState`.
#[derive(Clone)]
pub struct OddsRelay {
    latest: Arc<RwLock<Option<Value>>>,
    bus: broadcast::Sender<Value>,
}

impl OddsRelay {
    pub fn new() -> Self {
        let (bus, _rx) = broadcast::channel(BUS_CAPACITY);
        Self {
            latest: Arc::new(RwLock::new(None)),
            bus,
        }
    }

    /// The current snapshot, if the relay has received at least one message.
    /// A freshly connected WS client is sent this immediately.
    pub async fn snapshot(&self) -> Option<Value> {
        self.latest.read().await.clone()
    }

    /// Subscribe to future updates. Slow consumers lag and silently miss
    /// messages rather than stalling the relay — `recv()` returns
    /// `Lagged` in that case, which callers should treat as "skip ahead".
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.bus.subscribe()
    }

    async fn publish(&self, value: Value) {
        *self.latest.write().await = Some(value.clone());
        // No subscribers is a normal idle state, not an error.
        let _ = self.bus.send(value);
    }
}

impl Default for OddsRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the subscribe loop until the connection is dropped or the process
/// shuts down. Reconnects are the caller's responsibility (wrap this in a
/// retry loop at the call site, mirroring the payout worker's run loop).
pub async fn run(redis_url: &str, channel: &str, relay: OddsRelay) -> anyhow::Result<()> {
    let client = redis::Client::open(redis_url)?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "odds relay: non-string pub/sub payload, dropping");
                continue;
            }
        };

        match serde_json::from_str::<Value>(&payload) {
            Ok(value) => {
                debug!("odds relay: snapshot updated");
                relay.publish(value).await;
            }
            Err(e) => {
                warn!(error = %e, "odds relay: invalid JSON payload, dropping");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_subscriber_receives_published_snapshot() {
        let relay = OddsRelay::new();
        assert!(relay.snapshot().await.is_none());

        let mut rx = relay.subscribe();
        relay.publish(serde_json::json!({"bet_id": "x", "odds": 2.5})).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received["odds"], 2.5);
        assert_eq!(relay.snapshot().await.unwrap()["odds"], 2.5);
    }

    #[tokio::test]
    async fn snapshot_survives_after_all_subscribers_drop() {
        let relay = OddsRelay::new();
        {
            let _rx = relay.subscribe();
        }
        relay.publish(serde_json::json!({"bet_id": "y"})).await;
        assert_eq!(relay.snapshot().await.unwrap()["bet_id"], "y");
    }
}
