//! Domain model for presence and ephemeral chat.
//!
//! These are the client-side authoritative shapes held by the reconciliation
//! store. They are deliberately plain data: no interior mutability, no
//! back-references. Cross-entity references are by [`SceneId`] — the scene is
//! the canonical correlation key; persona data is embedded display-only
//! value state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, Nonce, PersonaId, RequestId, SceneId};

/// A geographic coordinate pair (WGS84 degrees).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// A persona: the identity a user presents while a scene is live.
///
/// Embedded by value wherever it appears. Server rows that carry only the
/// display columns (request inbox, session list) leave `id` unset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Persona ID when the server provided one.
    pub id: Option<PersonaId>,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    pub avatar: String,
    /// Short free-text description.
    pub description: String,
}

/// Lifecycle status of a chat request.
///
/// `Pending` is the only non-terminal state; every transition out of it is
/// one-way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Awaiting a decision from the recipient.
    Pending,
    /// Accepted; a chat session exists (or existed) for this request.
    Accepted,
    /// Declined by the recipient.
    Rejected,
    /// Withdrawn by the sender before a decision.
    Canceled,
    /// Timed out, or torn down because a party's scene ended.
    Expired,
}

impl RequestStatus {
    /// Whether this status can never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A chat request, inbound or outbound.
///
/// `counterparty_scene_id` is the other side regardless of direction: the
/// sender's scene for inbound requests, the recipient's for outbound.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Server-assigned request ID.
    pub id: RequestId,
    /// Display data for the other party.
    pub counterparty: Persona,
    /// Scene ID of the other party.
    pub counterparty_scene_id: SceneId,
    /// Optional opening message attached to the request.
    pub message: Option<String>,
    /// When the request was created on the server.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: RequestStatus,
}

/// Preview of the most recent message in a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessagePreview {
    /// Message text.
    pub content: String,
    /// Scene that sent it.
    pub sender_scene_id: SceneId,
    /// When it was sent.
    pub sent_at: DateTime<Utc>,
}

/// An active, time-boxed chat session.
///
/// Keyed by the accepted request's ID; exactly one session exists per
/// accepted request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    /// The accepted request this session came from (primary key).
    pub request_id: RequestId,
    /// Our side of the conversation.
    pub local_scene_id: SceneId,
    /// The counterparty's scene.
    pub remote_scene_id: SceneId,
    /// Hard deadline after which the session is gone.
    pub expires_at: DateTime<Utc>,
    /// Display data for the other party.
    pub counterparty: Persona,
    /// Most recent message, if any.
    pub last_message: Option<MessagePreview>,
}

/// A single chat message within a session.
///
/// An optimistic local echo has `id: None` and a `nonce`; confirmation
/// replaces it in place with the server-assigned ID.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned ID (`None` while the send is unconfirmed).
    pub id: Option<MessageId>,
    /// Owning session (request) ID.
    pub request_id: RequestId,
    /// Scene that sent the message.
    pub sender_scene_id: SceneId,
    /// Message text.
    pub content: String,
    /// Server creation time, or local send time for an unconfirmed echo.
    pub created_at: DateTime<Utc>,
    /// Client idempotency nonce (set on locally-sent messages).
    pub nonce: Option<Nonce>,
}

impl ChatMessage {
    /// Whether this entry is an unconfirmed optimistic echo.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.id.is_none()
    }
}

/// The local user's presence broadcast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Scene ID.
    pub id: SceneId,
    /// Persona broadcasting this scene.
    pub persona_id: PersonaId,
    /// Broadcast location.
    pub location: GeoPoint,
    /// Whether the scene is currently live.
    pub active: bool,
    /// When the broadcast started.
    pub started_at: DateTime<Utc>,
    /// When the broadcast lapses server-side.
    pub expires_at: DateTime<Utc>,
}

/// A nearby presence entry from the roster poll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NearbyScene {
    /// Scene ID (roster key).
    pub scene_id: SceneId,
    /// Persona broadcasting there.
    pub persona: Persona,
    /// Where the scene is.
    pub location: GeoPoint,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
