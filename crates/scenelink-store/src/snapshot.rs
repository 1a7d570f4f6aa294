//! REST snapshot input to hydration.

use serde::{Deserialize, Serialize};

use scenelink_core::domain::{ChatRequest, ChatSession};

/// A point-in-time server snapshot of our chat state.
///
/// Hydration replaces the store's collections with these wholesale; a
/// snapshot taken at any time is safe to apply because the server is
/// authoritative.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Pending requests addressed to us.
    pub inbound: Vec<ChatRequest>,
    /// Pending requests we sent.
    pub outbound: Vec<ChatRequest>,
    /// Live sessions.
    pub sessions: Vec<ChatSession>,
}
