//! Wire DTOs for the REST surface.
//!
//! Field names mirror the server's snake_case JSON exactly. The conversion
//! helpers produce `scenelink-core` domain values; direction-dependent
//! mappings (inbound vs outbound requests, session sides) take the local
//! scene ID as context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scenelink_core::domain::{
    ChatMessage, ChatRequest, ChatSession, GeoPoint, MessagePreview, NearbyScene, Persona,
    RequestStatus, Scene,
};
use scenelink_core::ids::{MessageId, PersonaId, RequestId, SceneId};

/// A chat request row, with the joined persona display columns.
///
/// The inbox endpoint fills the `from_persona_*` fields with the sender's
/// persona. The sent endpoint puts the recipient's name in
/// `to_persona_name` and reuses `from_persona_avatar`/`_description` for
/// the recipient's avatar and description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequestDto {
    /// Request ID.
    pub id: RequestId,
    /// Sender's scene.
    pub from_scene_id: SceneId,
    /// Recipient's scene.
    pub to_scene_id: SceneId,
    /// Optional opening message.
    #[serde(default)]
    pub message: Option<String>,
    /// Lifecycle status.
    pub status: RequestStatus,
    /// When the request was accepted, if it was.
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    /// Session deadline, set on acceptance.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Sender persona name (inbox) — absent on the bare create response.
    #[serde(default)]
    pub from_persona_name: String,
    /// Sender persona avatar URL (recipient's on the sent endpoint).
    #[serde(default)]
    pub from_persona_avatar: String,
    /// Sender persona description (recipient's on the sent endpoint).
    #[serde(default)]
    pub from_persona_description: String,
    /// Recipient persona name (sent endpoint only).
    #[serde(default)]
    pub to_persona_name: Option<String>,
}

impl ChatRequestDto {
    /// Convert an inbox row: the counterparty is the sender.
    #[must_use]
    pub fn into_inbound(self) -> ChatRequest {
        ChatRequest {
            id: self.id,
            counterparty: Persona {
                id: None,
                name: self.from_persona_name,
                avatar: self.from_persona_avatar,
                description: self.from_persona_description,
            },
            counterparty_scene_id: self.from_scene_id,
            message: self.message,
            created_at: self.created_at,
            status: self.status,
        }
    }

    /// Convert a sent row: the counterparty is the recipient.
    #[must_use]
    pub fn into_outbound(self) -> ChatRequest {
        let name = self.to_persona_name.unwrap_or(self.from_persona_name);
        ChatRequest {
            id: self.id,
            counterparty: Persona {
                id: None,
                name,
                avatar: self.from_persona_avatar,
                description: self.from_persona_description,
            },
            counterparty_scene_id: self.to_scene_id,
            message: self.message,
            created_at: self.created_at,
            status: self.status,
        }
    }
}

/// Response to accepting a chat request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcceptResponse {
    /// Request ID.
    pub request_id: RequestId,
    /// Session deadline assigned by the server.
    pub expires_at: DateTime<Utc>,
}

/// A chat message row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessageDto {
    /// Message ID.
    pub id: MessageId,
    /// Owning request ID.
    pub chat_request_id: RequestId,
    /// Sender's scene.
    pub from_scene_id: SceneId,
    /// Message text.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ChatMessageDto {
    /// Convert to the domain message (server rows carry no nonce).
    #[must_use]
    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            id: Some(self.id),
            request_id: self.chat_request_id,
            sender_scene_id: self.from_scene_id,
            content: self.content,
            created_at: self.created_at,
            nonce: None,
        }
    }
}

/// An active chat session row with last-message preview.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatSessionDto {
    /// Request ID (session key).
    pub request_id: RequestId,
    /// Requester's scene.
    pub from_scene_id: SceneId,
    /// Recipient's scene.
    pub to_scene_id: SceneId,
    /// Session deadline.
    pub expires_at: DateTime<Utc>,
    /// Counterparty persona name.
    pub other_persona_name: String,
    /// Counterparty persona avatar URL.
    pub other_persona_avatar: String,
    /// Counterparty persona description.
    pub other_persona_description: String,
    /// Most recent message text, if any message exists.
    #[serde(default)]
    pub last_message_content: Option<String>,
    /// Scene that sent the most recent message.
    #[serde(default)]
    pub last_message_sender_id: Option<SceneId>,
    /// When the most recent message was sent.
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ChatSessionDto {
    /// Convert to the domain session, resolving sides against our scene.
    #[must_use]
    pub fn into_session(self, local_scene_id: &SceneId) -> ChatSession {
        let (local, remote) = if &self.from_scene_id == local_scene_id {
            (self.from_scene_id, self.to_scene_id)
        } else {
            (self.to_scene_id, self.from_scene_id)
        };
        let last_message = match (
            self.last_message_content,
            self.last_message_sender_id,
            self.last_message_at,
        ) {
            (Some(content), Some(sender_scene_id), Some(sent_at)) => Some(MessagePreview {
                content,
                sender_scene_id,
                sent_at,
            }),
            _ => None,
        };
        ChatSession {
            request_id: self.request_id,
            local_scene_id: local,
            remote_scene_id: remote,
            expires_at: self.expires_at,
            counterparty: Persona {
                id: None,
                name: self.other_persona_name,
                avatar: self.other_persona_avatar,
                description: self.other_persona_description,
            },
            last_message,
        }
    }
}

/// A scene row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneDto {
    /// Scene ID.
    pub id: SceneId,
    /// Owning persona.
    pub persona_id: PersonaId,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Whether the scene is live.
    pub is_active: bool,
    /// When the broadcast started.
    pub started_at: DateTime<Utc>,
    /// When the broadcast lapses.
    pub expires_at: DateTime<Utc>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

impl SceneDto {
    /// Convert to the domain scene.
    #[must_use]
    pub fn into_scene(self) -> Scene {
        Scene {
            id: self.id,
            persona_id: self.persona_id,
            location: GeoPoint {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            active: self.is_active,
            started_at: self.started_at,
            expires_at: self.expires_at,
        }
    }
}

/// Response from the active-scene endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActiveSceneResponse {
    /// Whether the user has a live scene.
    pub active: bool,
    /// The scene, present when `active` is true.
    #[serde(default)]
    pub scene: Option<SceneDto>,
}

/// A nearby scene row: scene columns plus the joined persona.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NearbySceneDto {
    /// Scene columns.
    #[serde(flatten)]
    pub scene: SceneDto,
    /// Persona name.
    #[serde(default)]
    pub persona_name: String,
    /// Persona avatar URL.
    #[serde(default)]
    pub persona_avatar: String,
    /// Persona description.
    #[serde(default)]
    pub persona_description: String,
}

impl NearbySceneDto {
    /// Convert to a roster entry.
    #[must_use]
    pub fn into_nearby(self) -> NearbyScene {
        NearbyScene {
            scene_id: self.scene.id,
            persona: Persona {
                id: Some(self.scene.persona_id),
                name: self.persona_name,
                avatar: self.persona_avatar,
                description: self.persona_description,
            },
            location: GeoPoint {
                latitude: self.scene.latitude,
                longitude: self.scene.longitude,
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn request_dto() -> ChatRequestDto {
        serde_json::from_value(serde_json::json!({
            "id": "r1",
            "from_scene_id": "scn-b",
            "to_scene_id": "scn-a",
            "message": "hi there",
            "status": "pending",
            "accepted_at": null,
            "expires_at": null,
            "created_at": "2025-06-01T12:00:00Z",
            "from_persona_name": "Neon Fox",
            "from_persona_avatar": "https://example.com/fox.png",
            "from_persona_description": "night owl"
        }))
        .unwrap()
    }

    #[test]
    fn inbound_counterparty_is_the_sender() {
        let req = request_dto().into_inbound();
        assert_eq!(req.counterparty_scene_id.as_str(), "scn-b");
        assert_eq!(req.counterparty.name, "Neon Fox");
        assert_eq!(req.status, RequestStatus::Pending);
    }

    #[test]
    fn outbound_counterparty_is_the_recipient() {
        let mut dto = request_dto();
        dto.to_persona_name = Some("Quiet Moth".to_string());
        let req = dto.into_outbound();
        assert_eq!(req.counterparty_scene_id.as_str(), "scn-a");
        assert_eq!(req.counterparty.name, "Quiet Moth");
    }

    #[test]
    fn bare_create_response_decodes_without_persona_columns() {
        let dto: ChatRequestDto = serde_json::from_value(serde_json::json!({
            "id": "r2",
            "from_scene_id": "scn-a",
            "to_scene_id": "scn-b",
            "message": null,
            "status": "pending",
            "created_at": "2025-06-01T12:00:00Z"
        }))
        .unwrap();
        assert!(dto.from_persona_name.is_empty());
    }

    #[test]
    fn session_sides_resolve_against_local_scene() {
        let dto: ChatSessionDto = serde_json::from_value(serde_json::json!({
            "request_id": "r1",
            "from_scene_id": "scn-b",
            "to_scene_id": "scn-a",
            "expires_at": "2025-06-01T12:05:00Z",
            "other_persona_name": "Neon Fox",
            "other_persona_avatar": "",
            "other_persona_description": ""
        }))
        .unwrap();
        let session = dto.into_session(&SceneId::from("scn-a"));
        assert_eq!(session.local_scene_id.as_str(), "scn-a");
        assert_eq!(session.remote_scene_id.as_str(), "scn-b");
        assert!(session.last_message.is_none());
    }

    #[test]
    fn session_preview_requires_all_three_columns() {
        let dto: ChatSessionDto = serde_json::from_value(serde_json::json!({
            "request_id": "r1",
            "from_scene_id": "scn-a",
            "to_scene_id": "scn-b",
            "expires_at": "2025-06-01T12:05:00Z",
            "other_persona_name": "x",
            "other_persona_avatar": "",
            "other_persona_description": "",
            "last_message_content": "see you there",
            "last_message_sender_id": "scn-b",
            "last_message_at": "2025-06-01T12:01:00Z"
        }))
        .unwrap();
        let session = dto.into_session(&SceneId::from("scn-a"));
        let preview = session.last_message.expect("preview should be present");
        assert_eq!(preview.content, "see you there");
        assert_eq!(preview.sender_scene_id.as_str(), "scn-b");
    }

    #[test]
    fn nearby_scene_flattens_scene_columns() {
        let dto: NearbySceneDto = serde_json::from_value(serde_json::json!({
            "id": "scn-9",
            "persona_id": "p-9",
            "latitude": 40.7,
            "longitude": -74.0,
            "is_active": true,
            "started_at": "2025-06-01T10:00:00Z",
            "expires_at": "2025-06-01T14:00:00Z",
            "created_at": "2025-06-01T10:00:00Z",
            "persona_name": "Glass Heron",
            "persona_avatar": "https://example.com/heron.png",
            "persona_description": "watching the water"
        }))
        .unwrap();
        let nearby = dto.into_nearby();
        assert_eq!(nearby.scene_id.as_str(), "scn-9");
        assert_eq!(nearby.persona.id.as_ref().unwrap().as_str(), "p-9");
        assert!((nearby.location.latitude - 40.7).abs() < f64::EPSILON);
    }

    #[test]
    fn message_dto_converts_confirmed() {
        let dto: ChatMessageDto = serde_json::from_value(serde_json::json!({
            "id": "m42",
            "chat_request_id": "r1",
            "from_scene_id": "scn-a",
            "content": "hello",
            "created_at": "2025-06-01T12:00:30Z"
        }))
        .unwrap();
        let msg = dto.into_message();
        assert!(!msg.is_pending());
        assert!(msg.nonce.is_none());
    }
}
