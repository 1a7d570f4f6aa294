//! `reqwest`-backed [`SceneApi`] implementation.
//!
//! All routes live under `/api/v1` on the configured base URL and carry a
//! bearer token. Non-success statuses are mapped to [`ApiError::Status`]
//! with the server's `{"error": "..."}` body text when present.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::debug;

use scenelink_core::domain::GeoPoint;
use scenelink_core::ids::{Nonce, PersonaId, RequestId, SceneId};

use crate::api::SceneApi;
use crate::errors::{ApiError, Result};
use crate::types::{
    AcceptResponse, ActiveSceneResponse, ChatMessageDto, ChatRequestDto, ChatSessionDto,
    NearbySceneDto, SceneDto,
};

/// Production REST client.
pub struct HttpApi {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpApi {
    /// Create a client for `base_url` (scheme + host, no trailing slash)
    /// authenticating with `token`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Map non-success statuses to [`ApiError::Status`], extracting the
    /// server's error message when the body is the usual `{"error": ...}`.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .ok()
            .and_then(|body| {
                serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                    .or(Some(body))
            })
            .unwrap_or_default();
        Err(ApiError::Status { status, message })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        let response = self
            .client
            .get(self.url(path))
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post(&self, path: &str, body: Option<serde_json::Value>) -> Result<Response> {
        debug!(path, "POST");
        let mut request = self
            .client
            .post(self.url(path))
            .header(AUTHORIZATION, self.bearer());
        if let Some(body) = body {
            request = request.json(&body);
        }
        Self::check(request.send().await?).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        Ok(self.post(path, body).await?.json().await?)
    }
}

#[async_trait]
impl SceneApi for HttpApi {
    async fn send_chat_request(
        &self,
        to_scene_id: &SceneId,
        message: Option<&str>,
    ) -> Result<ChatRequestDto> {
        self.post_json(
            "/chat/requests",
            Some(serde_json::json!({
                "to_scene_id": to_scene_id,
                "message": message,
            })),
        )
        .await
    }

    async fn chat_inbox(&self) -> Result<Vec<ChatRequestDto>> {
        self.get_json("/chat/requests/inbox").await
    }

    async fn sent_requests(&self) -> Result<Vec<ChatRequestDto>> {
        self.get_json("/chat/requests/sent").await
    }

    async fn accept_chat_request(&self, request_id: &RequestId) -> Result<AcceptResponse> {
        self.post_json(&format!("/chat/requests/{request_id}/accept"), None)
            .await
    }

    async fn reject_chat_request(&self, request_id: &RequestId) -> Result<()> {
        let _ = self
            .post(&format!("/chat/requests/{request_id}/reject"), None)
            .await?;
        Ok(())
    }

    async fn cancel_chat_request(&self, request_id: &RequestId) -> Result<()> {
        let _ = self
            .post(&format!("/chat/requests/{request_id}/cancel"), None)
            .await?;
        Ok(())
    }

    async fn send_chat_message(
        &self,
        request_id: &RequestId,
        content: &str,
        nonce: &Nonce,
    ) -> Result<ChatMessageDto> {
        self.post_json(
            "/chat/messages",
            Some(serde_json::json!({
                "request_id": request_id,
                "content": content,
                "nonce": nonce,
            })),
        )
        .await
    }

    async fn chat_messages(&self, request_id: &RequestId) -> Result<Vec<ChatMessageDto>> {
        self.get_json(&format!("/chat/messages/{request_id}")).await
    }

    async fn active_sessions(&self) -> Result<Vec<ChatSessionDto>> {
        self.get_json("/chat/sessions").await
    }

    async fn start_scene(&self, persona_id: &PersonaId, location: GeoPoint) -> Result<SceneDto> {
        self.post_json(
            "/scenes/start",
            Some(serde_json::json!({
                "persona_id": persona_id,
                "latitude": location.latitude,
                "longitude": location.longitude,
            })),
        )
        .await
    }

    async fn stop_scene(&self) -> Result<()> {
        let _ = self.post("/scenes/stop", None).await?;
        Ok(())
    }

    async fn active_scene(&self) -> Result<ActiveSceneResponse> {
        self.get_json("/scenes/active").await
    }

    async fn nearby_scenes(&self, center: GeoPoint) -> Result<Vec<NearbySceneDto>> {
        debug!(path = "/scenes/nearby", "GET");
        let response = self
            .client
            .get(self.url("/scenes/nearby"))
            .header(AUTHORIZATION, self.bearer())
            .query(&[
                ("latitude", center.latitude.to_string()),
                ("longitude", center.longitude.to_string()),
            ])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
