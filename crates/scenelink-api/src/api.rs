//! The [`SceneApi`] trait: every REST call the engine makes.
//!
//! The rest of the workspace programs against this trait so tests can plug
//! in programmable fakes; [`crate::HttpApi`] is the production impl.

use async_trait::async_trait;

use scenelink_core::domain::GeoPoint;
use scenelink_core::ids::{Nonce, PersonaId, RequestId, SceneId};

use crate::errors::Result;
use crate::types::{
    AcceptResponse, ActiveSceneResponse, ChatMessageDto, ChatRequestDto, ChatSessionDto,
    NearbySceneDto, SceneDto,
};

/// Request/response operations against the scene server.
#[async_trait]
pub trait SceneApi: Send + Sync {
    /// Send a chat request to another scene.
    async fn send_chat_request(
        &self,
        to_scene_id: &SceneId,
        message: Option<&str>,
    ) -> Result<ChatRequestDto>;

    /// Pending requests addressed to our scene.
    async fn chat_inbox(&self) -> Result<Vec<ChatRequestDto>>;

    /// Pending requests our scene has sent.
    async fn sent_requests(&self) -> Result<Vec<ChatRequestDto>>;

    /// Accept a pending request; the server assigns the session deadline.
    async fn accept_chat_request(&self, request_id: &RequestId) -> Result<AcceptResponse>;

    /// Reject a pending request addressed to us.
    async fn reject_chat_request(&self, request_id: &RequestId) -> Result<()>;

    /// Withdraw a pending request we sent.
    async fn cancel_chat_request(&self, request_id: &RequestId) -> Result<()>;

    /// Send a message in an accepted session, tagged with an idempotency nonce.
    async fn send_chat_message(
        &self,
        request_id: &RequestId,
        content: &str,
        nonce: &Nonce,
    ) -> Result<ChatMessageDto>;

    /// Full message history for a session.
    async fn chat_messages(&self, request_id: &RequestId) -> Result<Vec<ChatMessageDto>>;

    /// All live sessions for our scene.
    async fn active_sessions(&self) -> Result<Vec<ChatSessionDto>>;

    /// Start (or refresh) our presence broadcast.
    async fn start_scene(&self, persona_id: &PersonaId, location: GeoPoint) -> Result<SceneDto>;

    /// End our presence broadcast.
    async fn stop_scene(&self) -> Result<()>;

    /// Our currently live scene, if any.
    async fn active_scene(&self) -> Result<ActiveSceneResponse>;

    /// Active scenes around a point.
    async fn nearby_scenes(&self, center: GeoPoint) -> Result<Vec<NearbySceneDto>>;
}
