//! # Pub/Sub Connection
//!
//! The interface every transport implements.

use crate::subscriber::Subscription;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors from pub/sub operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The connection was closed; no further publishes or subscriptions.
    #[error("connection closed")]
    ConnectionClosed,

    /// The subscription's channel went away.
    #[error("subscription closed")]
    SubscriptionClosed,

    /// Channel names must be non-empty.
    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),

    /// The transport could not (re)establish the connection.
    #[error("connection failed: {0}")]
    ConnectFailed(String),
}

/// A shared connection to a pub/sub broker.
///
/// Implementations must be safe to share between tasks: one connection is
/// used concurrently by the dispatch loop, every running handler and every
/// caller publishing a task.
#[async_trait]
pub trait PubSubConnection: Send + Sync {
    /// Open the connection. A no-op if it is already open.
    async fn connect(&self) -> Result<(), BusError>;

    /// Publish a payload to a channel.
    ///
    /// # Returns
    ///
    /// The number of subscribers the payload was delivered to.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<usize, BusError>;

    /// Subscribe to a channel.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError>;

    /// Close the connection, ending every subscription made through it.
    async fn close(&self);

    /// Whether the connection is currently closed.
    fn is_closed(&self) -> bool;
}

/// Reject empty channel names before touching the transport.
pub(crate) fn check_channel(channel: &str) -> Result<(), BusError> {
    if channel.is_empty() {
        return Err(BusError::InvalidChannel(channel.to_string()));
    }
    Ok(())
}
