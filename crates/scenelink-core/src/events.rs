//! Push-stream wire types.
//!
//! Every server push is a JSON envelope `{ "type": string, "data": object }`.
//! [`PushEvent`] is the typed view of the envelope; its serde strings match
//! the server wire format exactly — do not rename them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::{MessageId, Nonce, RequestId, SceneId};

/// Errors decoding or encoding a push envelope.
#[derive(Debug, Error)]
pub enum EventError {
    /// The payload was not valid JSON or did not match the expected shape.
    #[error("malformed push payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The envelope carried an event type this client does not know.
    #[error("unknown push event type: {0}")]
    UnknownType(String),
}

/// All event type strings this client understands, for dispatch and tests.
pub const ALL_EVENT_TYPES: &[&str] = &[
    "chat.request.received",
    "chat.request.accepted",
    "chat.request.rejected",
    "chat.request.canceled",
    "chat.message.received",
    "chat.expired",
    "chat.session.ended",
    "scene.started",
    "scene.ended",
];

/// A typed server push event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PushEvent {
    /// Someone sent us a chat request.
    #[serde(rename = "chat.request.received")]
    RequestReceived {
        /// Request ID.
        id: RequestId,
        /// Sender's scene.
        from_scene_id: SceneId,
        /// Sender persona display name.
        from_persona_name: String,
        /// Sender persona avatar URL.
        from_persona_avatar: String,
        /// Sender persona description.
        from_persona_description: String,
        /// Optional opening message.
        message: Option<String>,
        /// Server creation time.
        created_at: DateTime<Utc>,
    },
    /// A request was accepted; a session now exists until `expires_at`.
    #[serde(rename = "chat.request.accepted")]
    RequestAccepted {
        /// Request ID.
        request_id: RequestId,
        /// Session deadline.
        expires_at: DateTime<Utc>,
        /// Requester's scene.
        from_scene_id: SceneId,
        /// Recipient's scene.
        to_scene_id: SceneId,
    },
    /// A request we sent was declined.
    #[serde(rename = "chat.request.rejected")]
    RequestRejected {
        /// Request ID.
        request_id: RequestId,
        /// Display name of the persona that declined, if provided.
        #[serde(default)]
        rejecter_name: Option<String>,
    },
    /// A request sent to us was withdrawn by its sender.
    #[serde(rename = "chat.request.canceled")]
    RequestCanceled {
        /// Request ID.
        request_id: RequestId,
    },
    /// A message arrived in one of our sessions.
    #[serde(rename = "chat.message.received")]
    MessageReceived {
        /// Server-assigned message ID.
        message_id: MessageId,
        /// Owning session (request) ID.
        request_id: RequestId,
        /// Sender's scene.
        from_scene_id: SceneId,
        /// Message text.
        content: String,
        /// Echo of the sender's idempotency nonce (empty when not supplied).
        #[serde(default)]
        nonce: Option<Nonce>,
        /// Server creation time.
        created_at: DateTime<Utc>,
        /// The scene this copy was addressed to.
        #[serde(default)]
        target_scene_id: Option<SceneId>,
    },
    /// A session hit its deadline server-side.
    #[serde(rename = "chat.expired")]
    ChatExpired {
        /// Request ID of the expired session.
        request_id: RequestId,
        /// Requester's scene.
        #[serde(default)]
        from_scene_id: Option<SceneId>,
        /// Recipient's scene.
        #[serde(default)]
        to_scene_id: Option<SceneId>,
    },
    /// A session was ended explicitly by either party.
    #[serde(rename = "chat.session.ended")]
    SessionEnded {
        /// Request ID of the ended session.
        request_id: RequestId,
    },
    /// A nearby scene started or moved. The roster picks it up on the
    /// next poll; the store ignores it.
    #[serde(rename = "scene.started")]
    SceneStarted {
        /// Scene ID.
        scene_id: SceneId,
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
    },
    /// A scene went dark: drop its roster entry, sessions, and pending
    /// requests.
    #[serde(rename = "scene.ended")]
    SceneEnded {
        /// Scene ID.
        scene_id: SceneId,
    },
}

impl PushEvent {
    /// The wire event-type string for this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RequestReceived { .. } => "chat.request.received",
            Self::RequestAccepted { .. } => "chat.request.accepted",
            Self::RequestRejected { .. } => "chat.request.rejected",
            Self::RequestCanceled { .. } => "chat.request.canceled",
            Self::MessageReceived { .. } => "chat.message.received",
            Self::ChatExpired { .. } => "chat.expired",
            Self::SessionEnded { .. } => "chat.session.ended",
            Self::SceneStarted { .. } => "scene.started",
            Self::SceneEnded { .. } => "scene.ended",
        }
    }
}

/// Raw push envelope as it crosses the wire, in either direction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type string.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload — shape varies by event type.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an outbound envelope.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Parse an envelope from raw frame text.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode this envelope into a typed [`PushEvent`].
    ///
    /// Unknown event types are reported as [`EventError::UnknownType`] so the
    /// caller can log and drop them without treating them as corruption.
    pub fn into_event(self) -> Result<PushEvent, EventError> {
        if !ALL_EVENT_TYPES.contains(&self.event_type.as_str()) {
            return Err(EventError::UnknownType(self.event_type));
        }
        let value = serde_json::json!({ "type": self.event_type, "data": self.data });
        Ok(serde_json::from_value(value)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
