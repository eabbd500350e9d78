//! Publish fan-out
//!
//! Fans published messages out to any number of subscribers through a
//! bounded broadcast ring of depth 2. A slow subscriber lags and silently
//! loses the overwritten messages; the publisher never blocks and never
//! observes delivery failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::protocol::PubMessage;

/// Per-subscriber queue depth; overflow drops the oldest undelivered message
pub const QUEUE_DEPTH: usize = 2;

/// Per-subscriber session bookkeeping
#[derive(Debug, Clone)]
pub struct SubscriberSession {
    pub id: String,
    pub connected_at: Instant,
    pub messages_sent: u64,
}

/// Fan-out hub shared by the publish stage and the subscriber socket tasks
pub struct PublishHub {
    tx: broadcast::Sender<PubMessage>,
    sessions: RwLock<HashMap<String, SubscriberSession>>,
}

impl PublishHub {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(QUEUE_DEPTH);
        Arc::new(Self {
            tx,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Emit one message; fire-and-forget regardless of subscriber state
    pub fn publish(&self, message: PubMessage) {
        let _ = self.tx.send(message);
    }

    /// Attach a new subscriber queue
    pub fn subscribe(&self) -> broadcast::Receiver<PubMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sessions.read().len()
    }

    fn register(&self, id: String) {
        let session = SubscriberSession {
            id: id.clone(),
            connected_at: Instant::now(),
            messages_sent: 0,
        };
        self.sessions.write().insert(id.clone(), session);
        info!(
            "subscriber {} connected (total: {})",
            id,
            self.subscriber_count()
        );
    }

    fn unregister(&self, id: &str) {
        if let Some(session) = self.sessions.write().remove(id) {
            info!(
                "subscriber {} disconnected after {:.1}s ({} messages)",
                id,
                session.connected_at.elapsed().as_secs_f32(),
                session.messages_sent
            );
        }
    }

    fn record_sent(&self, id: &str) {
        if let Some(session) = self.sessions.write().get_mut(id) {
            session.messages_sent += 1;
        }
    }

    /// Forward messages to one connected subscriber until it goes away
    ///
    /// Lagged receives are the intended backpressure mechanism, not errors.
    pub async fn forward(self: Arc<Self>, mut stream: TcpStream) {
        let id = Uuid::new_v4().to_string();
        let guard = SubscriberGuard::new(id.clone(), self.clone());
        let mut rx = self.subscribe();

        loop {
            match rx.recv().await {
                Ok(message) => {
                    if message.write_to(&mut stream).await.is_err() {
                        break;
                    }
                    self.record_sent(guard.id());
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("subscriber {} lagged, {} messages dropped", id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// RAII guard tying a session entry to the forwarding task's lifetime
pub struct SubscriberGuard {
    id: String,
    hub: Arc<PublishHub>,
}

impl SubscriberGuard {
    pub fn new(id: String, hub: Arc<PublishHub>) -> Self {
        hub.register(id.clone());
        Self { id, hub }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.hub.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn messages_reach_a_subscriber_in_order() {
        let hub = PublishHub::new();
        let mut rx = hub.subscribe();
        hub.publish(PubMessage::metadata(0, Bytes::from_static(b"{}")));
        hub.publish(PubMessage::jpeg(0, Bytes::from_static(b"img")));

        assert_eq!(rx.recv().await.unwrap().sequence, 0);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.tag, crate::protocol::MessageTag::Jpeg);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_never_blocks() {
        let hub = PublishHub::new();
        for sequence in 0..100 {
            hub.publish(PubMessage::metadata(sequence, Bytes::new()));
        }
    }

    #[tokio::test]
    async fn slow_subscriber_lags_to_newest() {
        let hub = PublishHub::new();
        let mut rx = hub.subscribe();
        for sequence in 0..10 {
            hub.publish(PubMessage::metadata(sequence, Bytes::new()));
            hub.publish(PubMessage::jpeg(sequence, Bytes::new()));
        }

        // the queue held only the newest messages; the receiver reports the
        // gap once, then resumes with what is left
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                assert!(skipped >= 18);
            }
            other => panic!("expected lag, got {:?}", other),
        }
        let newest = rx.recv().await.unwrap();
        assert_eq!(newest.sequence, 9);
    }

    #[tokio::test]
    async fn guard_tracks_session_lifetime() {
        let hub = PublishHub::new();
        {
            let _guard = SubscriberGuard::new("sub-1".into(), hub.clone());
            assert_eq!(hub.subscriber_count(), 1);
        }
        assert_eq!(hub.subscriber_count(), 0);
    }
}
