//! # scenelink-client
//!
//! The facade that wires the engine together: REST API, push channel,
//! reconciliation store, expiry clock, and presence poller behind one
//! [`SceneClient`] with an explicit lifecycle.
//!
//! A single-writer loop task owns all store mutation: channel handlers and
//! timer callbacks only enqueue messages to it, so push events apply in
//! arrival order no matter which task produced them. Command methods are
//! the optimistic path — echo first, confirm or roll back when the server
//! answers.
//!
//! Also home to the continuity cache (best-effort persistence of persona,
//! scene, and radius across launches) and tracing setup.

#![deny(unsafe_code)]

pub mod cache;
pub mod client;
pub mod errors;
pub mod logging;

pub use cache::ContinuityCache;
pub use client::{ClientConfig, SceneClient};
pub use errors::{CacheError, ClientError, Result};
