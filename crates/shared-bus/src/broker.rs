//! # In-Memory Broker
//!
//! Single-process broker backed by one `tokio::sync::broadcast` channel per
//! channel name. Channels are created lazily on first subscribe.
//!
//! For a multi-process deployment, implement [`PubSubConnection`] over an
//! external broker (e.g. Redis) instead.

use crate::connection::{check_channel, BusError, PubSubConnection};
use crate::subscriber::{BroadcastSubscription, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

/// In-memory pub/sub broker.
pub struct InMemoryBroker {
    /// Channel name -> sender.
    channels: RwLock<HashMap<String, broadcast::Sender<Bytes>>>,

    /// Per-subscriber buffer size.
    capacity: usize,

    /// Total messages accepted for publishing.
    messages_published: AtomicU64,
}

impl InMemoryBroker {
    /// Create a broker with the default per-subscriber capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a broker with a custom per-subscriber capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            messages_published: AtomicU64::new(0),
        }
    }

    /// Open a new connection to this broker.
    #[must_use]
    pub fn connection(self: &Arc<Self>) -> InMemoryConnection {
        let (generation, _) = watch::channel(0);
        InMemoryConnection {
            broker: Arc::clone(self),
            closed: AtomicBool::new(false),
            generation,
        }
    }

    /// Number of live subscribers on a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Total messages published through this broker.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    fn publish(&self, channel: &str, payload: Bytes) -> usize {
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        let channels = self.channels.read();
        let Some(sender) = channels.get(channel) else {
            trace!(channel, "Published to channel with no subscribers");
            return 0;
        };

        // SendError only means there are no receivers right now
        sender.send(payload).unwrap_or(0)
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<Bytes> {
        if let Some(sender) = self.channels.read().get(channel) {
            return sender.subscribe();
        }

        let mut channels = self.channels.write();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection to an [`InMemoryBroker`].
///
/// Closing bumps the connection's generation, which ends every subscription
/// created before the close. Re-connecting does not revive them.
pub struct InMemoryConnection {
    broker: Arc<InMemoryBroker>,
    closed: AtomicBool,
    generation: watch::Sender<u64>,
}

impl InMemoryConnection {
    /// The broker this connection talks to.
    #[must_use]
    pub fn broker(&self) -> &Arc<InMemoryBroker> {
        &self.broker
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl PubSubConnection for InMemoryConnection {
    async fn connect(&self) -> Result<(), BusError> {
        if self.closed.swap(false, Ordering::AcqRel) {
            debug!("In-memory connection re-opened");
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<usize, BusError> {
        check_channel(channel)?;
        self.ensure_open()?;
        Ok(self.broker.publish(channel, payload))
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError> {
        check_channel(channel)?;
        self.ensure_open()?;

        let receiver = self.broker.subscribe(channel);
        debug!(channel, "Subscribed");

        Ok(Box::new(BroadcastSubscription::new(
            channel.to_string(),
            receiver,
            self.generation.subscribe(),
        )))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.generation.send_modify(|generation| *generation += 1);
            debug!("In-memory connection closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
