//! # Subscriber
//!
//! Defines the receiving side of the bus.

use crate::connection::BusError;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// A live subscription to one channel.
#[async_trait]
pub trait Subscription: Send {
    /// The channel this subscription listens on.
    fn channel(&self) -> &str;

    /// Wait for the next message on the channel.
    ///
    /// # Returns
    ///
    /// - `Ok(payload)` - The next message
    /// - `Err(BusError::ConnectionClosed)` - The owning connection was closed
    /// - `Err(BusError::SubscriptionClosed)` - The channel went away
    async fn next_message(&mut self) -> Result<Bytes, BusError>;

    /// Stop receiving. Subsequent calls to `next_message` fail.
    fn unsubscribe(&mut self);
}

/// Subscription backed by a `tokio::sync::broadcast` receiver.
///
/// Ends as soon as the connection that created it is closed, even if the
/// connection is re-opened afterwards.
pub struct BroadcastSubscription {
    /// Channel name.
    channel: String,

    /// Broadcast receiver, `None` once unsubscribed.
    receiver: Option<broadcast::Receiver<Bytes>>,

    /// Close generation of the owning connection.
    generation: watch::Receiver<u64>,

    /// Generation this subscription was created in.
    created_in: u64,
}

enum Next {
    Message(Result<Bytes, broadcast::error::RecvError>),
    Recheck,
    Dropped,
}

impl BroadcastSubscription {
    /// Create a new subscription.
    pub(crate) fn new(
        channel: String,
        receiver: broadcast::Receiver<Bytes>,
        generation: watch::Receiver<u64>,
    ) -> Self {
        let created_in = *generation.borrow();
        Self {
            channel,
            receiver: Some(receiver),
            generation,
            created_in,
        }
    }

    fn connection_closed(&self) -> bool {
        *self.generation.borrow() != self.created_in
    }
}

#[async_trait]
impl Subscription for BroadcastSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next_message(&mut self) -> Result<Bytes, BusError> {
        loop {
            if self.receiver.is_some() && self.connection_closed() {
                self.receiver = None;
                return Err(BusError::ConnectionClosed);
            }

            let next = {
                let Some(receiver) = self.receiver.as_mut() else {
                    return Err(BusError::SubscriptionClosed);
                };

                tokio::select! {
                    biased;

                    changed = self.generation.changed() => {
                        if changed.is_err() { Next::Dropped } else { Next::Recheck }
                    }
                    message = receiver.recv() => Next::Message(message),
                }
            };

            match next {
                Next::Message(Ok(payload)) => return Ok(payload),
                Next::Message(Err(broadcast::error::RecvError::Lagged(count))) => {
                    warn!(
                        channel = %self.channel,
                        lagged = count,
                        "Subscriber lagged, some messages dropped"
                    );
                }
                Next::Message(Err(broadcast::error::RecvError::Closed)) => {
                    self.receiver = None;
                    return Err(BusError::SubscriptionClosed);
                }
                // Re-check the generation at the top of the loop
                Next::Recheck => {}
                Next::Dropped => {
                    self.receiver = None;
                    return Err(BusError::ConnectionClosed);
                }
            }
        }
    }

    fn unsubscribe(&mut self) {
        if self.receiver.take().is_some() {
            debug!(channel = %self.channel, "Unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::connection::PubSubConnection;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_subscription_receives_in_order() {
        let broker = Arc::new(InMemoryBroker::new());
        let conn = broker.connection();
        let mut sub = conn.subscribe("jobs").await.unwrap();

        conn.publish("jobs", Bytes::from_static(b"one")).await.unwrap();
        conn.publish("jobs", Bytes::from_static(b"two")).await.unwrap();

        let first = timeout(Duration::from_millis(100), sub.next_message())
            .await
            .expect("timeout")
            .expect("message");
        let second = timeout(Duration::from_millis(100), sub.next_message())
            .await
            .expect("timeout")
            .expect("message");

        assert_eq!(&first[..], b"one");
        assert_eq!(&second[..], b"two");
        assert_eq!(sub.channel(), "jobs");
    }

    #[tokio::test]
    async fn test_subscription_ignores_other_channels() {
        let broker = Arc::new(InMemoryBroker::new());
        let conn = broker.connection();
        let mut sub = conn.subscribe("jobs").await.unwrap();

        conn.publish("other", Bytes::from_static(b"noise")).await.unwrap();
        conn.publish("jobs", Bytes::from_static(b"signal")).await.unwrap();

        let received = timeout(Duration::from_millis(100), sub.next_message())
            .await
            .expect("timeout")
            .expect("message");
        assert_eq!(&received[..], b"signal");
    }

    #[tokio::test]
    async fn test_close_ends_pending_receive() {
        let broker = Arc::new(InMemoryBroker::new());
        let conn = Arc::new(broker.connection());
        let mut sub = conn.subscribe("jobs").await.unwrap();

        let closer = Arc::clone(&conn);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close().await;
        });

        let result = timeout(Duration::from_millis(500), sub.next_message())
            .await
            .expect("timeout");
        assert_eq!(result, Err(BusError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_subscription_stays_dead_after_reconnect() {
        let broker = Arc::new(InMemoryBroker::new());
        let conn = broker.connection();
        let mut sub = conn.subscribe("jobs").await.unwrap();

        conn.close().await;
        conn.connect().await.unwrap();
        conn.publish("jobs", Bytes::from_static(b"late")).await.unwrap();

        assert_eq!(sub.next_message().await, Err(BusError::ConnectionClosed));
        assert_eq!(sub.next_message().await, Err(BusError::SubscriptionClosed));
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let broker = Arc::new(InMemoryBroker::new());
        let conn = broker.connection();
        let mut sub = conn.subscribe("jobs").await.unwrap();

        sub.unsubscribe();
        conn.publish("jobs", Bytes::from_static(b"x")).await.unwrap();

        assert_eq!(sub.next_message().await, Err(BusError::SubscriptionClosed));
    }
}
