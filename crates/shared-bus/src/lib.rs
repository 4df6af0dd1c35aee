//! # Shared Bus - Pub/Sub Transport
//!
//! Named-channel publish/subscribe used by the task queue. Every subscriber
//! of a channel receives every message published to it; filtering happens
//! on the receiving side.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Dispatcher  │                    │   Listener   │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │    Broker    │          │
//!                  │  (channels)  │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! A [`PubSubConnection`] is the application's single shared handle to the
//! broker. It is owned by the service context and passed to every component
//! that publishes or subscribes. Closing it ends all of its subscriptions and
//! makes further publishes fail with [`BusError::ConnectionClosed`].

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod connection;
pub mod subscriber;

// Re-export main types
pub use broker::{InMemoryBroker, InMemoryConnection};
pub use connection::{BusError, PubSubConnection};
pub use subscriber::{BroadcastSubscription, Subscription};

/// Maximum messages to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
