//! # scenelink-channel
//!
//! The channel manager: one push-stream (WebSocket) connection per active
//! scene, with a typed publish/subscribe registry that outlives the
//! connection itself.
//!
//! Connection loss is routine here, not exceptional: every unexpected close
//! leads to a fixed-delay reconnect, indefinitely, and subscriptions are
//! held outside the connection so handlers registered before or during an
//! outage receive events as soon as the stream is back. Malformed frames
//! and unknown event types are logged and dropped — the reconciliation
//! store downstream is the layer that makes redelivery harmless.

#![deny(unsafe_code)]

pub mod manager;
pub mod registry;

pub use manager::{ChannelConfig, ChannelManager};
pub use registry::{Subscription, SubscriptionRegistry};
