use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::errors::Result;
use crate::models::Event;
use crate::platform::normalize;
use crate::platform::wire::UpdatesEnvelope;
use crate::session::ClientHandle;

/// Buffered events per subscriber before new ones are dropped
pub const SUBSCRIBER_CAPACITY: usize = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Keyed set of bounded event queues.
///
/// Broadcasting never waits on a slow subscriber; an event that does not fit
/// is dropped for that subscriber only.
#[derive(Clone, Default)]
pub struct UpdateFanout {
    subscribers: Arc<RwLock<HashMap<String, mpsc::Sender<Event>>>>,
}

impl UpdateFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue under `key`, replacing (and closing) any previous one
    pub async fn subscribe(&self, key: &str) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        if self.subscribers.write().await.insert(key.to_string(), tx).is_some() {
            log::debug!("Replaced update subscriber {}", key);
        }
        rx
    }

    pub async fn unsubscribe(&self, key: &str) -> bool {
        self.subscribers.write().await.remove(key).is_some()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn broadcast(&self, event: &Event) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let subscribers = self.subscribers.read().await;
        for (key, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    log::warn!("Dropping update for subscriber {}: {}", key, e);
                    report.dropped += 1;
                }
            }
        }
        report
    }
}

/// Background task forwarding a platform update stream into the fan-out
pub struct UpdateListener;

impl UpdateListener {
    pub fn spawn(rx: mpsc::Receiver<UpdatesEnvelope>, fanout: UpdateFanout) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut stream = ReceiverStream::new(rx);
            while let Some(envelope) = stream.next().await {
                for event in normalize::normalize_updates(&envelope) {
                    let report = fanout.broadcast(&event).await;
                    log::debug!(
                        "Broadcast update to {} subscribers ({} dropped)",
                        report.delivered,
                        report.dropped
                    );
                }
            }
            log::info!("Platform update stream closed");
        })
    }

    /// Subscribe to a client's updates and start forwarding them
    pub async fn start(handle: &ClientHandle, fanout: UpdateFanout) -> Result<JoinHandle<()>> {
        let rx = handle.client().updates().await?;
        Ok(Self::spawn(rx, fanout))
    }
}
