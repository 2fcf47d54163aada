//! Real-time import event notifier
//!
//! The pipeline never talks to the transport directly: it drops typed
//! `ImportEvent`s into a bounded channel via a cheap, non-blocking handle and
//! a dedicated task forwards them to the transport. Losing an event — channel
//! full, transport down, no resolvable owner — is acceptable; notification is
//! strictly observational and must never slow down or fail an import.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{ImportEvent, ImportEventEnvelope};

const CHANNEL_CAPACITY: usize = 256;

/// Transport abstraction for delivering events addressed to one user
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Deliver a serialized event to the user's channel
    async fn publish(&self, user_id: Uuid, payload: Vec<u8>) -> Result<()>;

    /// Get the name of this transport implementation
    fn name(&self) -> &'static str;
}

/// NATS-backed transport; each user has a dedicated subject
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    fn subject(user_id: Uuid) -> String {
        format!("pokladna.user.{}.import", user_id)
    }
}

#[async_trait]
impl EventTransport for NatsTransport {
    async fn publish(&self, user_id: Uuid, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(Self::subject(user_id), payload.into())
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "nats"
    }
}

/// A queued notification: an event addressed to its owning user
#[derive(Debug)]
struct Notification {
    user_id: Uuid,
    event: ImportEvent,
}

/// Cheap, cloneable handle used by the pipeline to emit events
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Spawn the notification task and return the handle feeding it.
    ///
    /// With no transport configured the task still drains the channel, so
    /// emitting stays a no-op rather than an error.
    pub fn start(transport: Option<Arc<dyn EventTransport>>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(CHANNEL_CAPACITY);

        match &transport {
            Some(t) => info!("Import notifications enabled via {}", t.name()),
            None => info!("Import notifications disabled (no transport)"),
        }

        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let Some(transport) = transport.as_ref() else {
                    continue;
                };
                let envelope = ImportEventEnvelope::new(notification.event);
                let payload = match serde_json::to_vec(&envelope) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Failed to serialize import event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = transport.publish(notification.user_id, payload).await {
                    warn!(
                        "Failed to publish import event for job {}: {}",
                        envelope.event.job_id(),
                        e
                    );
                }
            }
        });

        Self { tx }
    }

    /// Emit an event addressed to `owner`. `None` means the owning identity
    /// could not be resolved and the event is silently skipped. Never blocks:
    /// a full channel drops the event.
    pub fn notify(&self, owner: Option<Uuid>, event: ImportEvent) {
        let Some(user_id) = owner else {
            return;
        };
        if let Err(e) = self.tx.try_send(Notification { user_id, event }) {
            debug!("Import event dropped: {}", e);
        }
    }
}

// ==========================================================================
// Tests
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Transport that records every delivery for assertions
    struct MockTransport {
        deliveries: Mutex<Vec<(Uuid, Vec<u8>)>>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                deliveries: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.deliveries.lock().len()
        }
    }

    #[async_trait]
    impl EventTransport for MockTransport {
        async fn publish(&self, user_id: Uuid, payload: Vec<u8>) -> Result<()> {
            self.deliveries.lock().push((user_id, payload));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    async fn wait_for_count(transport: &MockTransport, expected: usize) {
        for _ in 0..100 {
            if transport.count() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_event_reaches_transport_addressed_to_owner() {
        let transport = MockTransport::new();
        let notifier = Notifier::start(Some(transport.clone() as Arc<dyn EventTransport>));
        let owner = Uuid::new_v4();
        let job_id = Uuid::new_v4();

        notifier.notify(
            Some(owner),
            ImportEvent::Started {
                job_id,
                file_name: "t.csv".to_string(),
            },
        );

        wait_for_count(&transport, 1).await;
        let deliveries = transport.deliveries.lock();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, owner);
        let json = String::from_utf8(deliveries[0].1.clone()).unwrap();
        assert!(json.contains("import:started"));
        assert!(json.contains(&job_id.to_string()));
    }

    #[tokio::test]
    async fn test_unresolved_owner_skips_delivery() {
        let transport = MockTransport::new();
        let notifier = Notifier::start(Some(transport.clone() as Arc<dyn EventTransport>));

        notifier.notify(
            None,
            ImportEvent::Started {
                job_id: Uuid::new_v4(),
                file_name: "t.csv".to_string(),
            },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_no_transport_is_a_noop() {
        let notifier = Notifier::start(None);

        // Must not panic or block
        notifier.notify(
            Some(Uuid::new_v4()),
            ImportEvent::Failed {
                job_id: Uuid::new_v4(),
                error: "boom".to_string(),
            },
        );
    }
}
