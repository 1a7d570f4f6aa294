//! The client facade: lifecycle, single-writer loop, commands, views.
//!
//! All asynchronous inputs — push events, expiry callbacks, refresh
//! results — are forwarded as messages into one loop task that owns store
//! mutation, so events apply in arrival order and never race each other.
//! Command methods apply their optimistic/confirmed changes through the
//! same store under the same lock.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scenelink_api::SceneApi;
use scenelink_api::types::{ChatMessageDto, ChatRequestDto};
use scenelink_channel::{ChannelConfig, ChannelManager, Subscription};
use scenelink_clock::ExpiryClock;
use scenelink_core::domain::{
    ChatMessage, ChatRequest, ChatSession, GeoPoint, NearbyScene, Persona, Scene,
};
use scenelink_core::events::{ALL_EVENT_TYPES, Envelope, PushEvent};
use scenelink_core::ids::{RequestId, SceneId};
use scenelink_presence::{PresenceConfig, PresencePoller};
use scenelink_store::{ReconciliationStore, Snapshot, StoreEffect};

use crate::cache::{self, ContinuityCache};
use crate::errors::{ClientError, Result};

/// Clock key for the local scene's own broadcast deadline. Session timers
/// are keyed by request ID, which can never be this string.
const SCENE_TIMER_ID: &str = "scene";

/// Construction-time knobs for [`SceneClient`].
pub struct ClientConfig {
    /// Push-stream endpoint, e.g. `ws://host/ws`.
    pub ws_url: String,
    /// Continuity cache file. `None` uses `~/.scenelink/cache.json`.
    pub cache_path: Option<PathBuf>,
    /// Channel manager tuning.
    pub channel: ChannelConfig,
    /// Presence poller tuning.
    pub presence: PresenceConfig,
}

impl ClientConfig {
    /// Config with defaults for everything but the stream endpoint.
    #[must_use]
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            cache_path: None,
            channel: ChannelConfig::default(),
            presence: PresenceConfig::default(),
        }
    }
}

/// Messages feeding the single-writer loop.
enum LoopMessage {
    /// A typed event arrived over the push stream.
    Push(PushEvent),
    /// A session's local countdown hit zero.
    SessionExpired(RequestId),
    /// Our own scene's countdown hit zero.
    SceneExpired,
    /// A background refresh produced a fresh snapshot.
    Hydrated(Snapshot),
}

/// Everything the loop, timer callbacks, and command methods share.
struct Shared {
    api: Arc<dyn SceneApi>,
    store: Mutex<ReconciliationStore>,
    clock: ExpiryClock,
    poller: PresencePoller,
    channel: ChannelManager,
    cache: Mutex<ContinuityCache>,
    cache_path: PathBuf,
    tx: mpsc::UnboundedSender<LoopMessage>,
}

/// The engine facade: one instance per app process.
///
/// Create with [`new`](Self::new) (requires a tokio runtime), bring a scene
/// up with [`activate_scene`](Self::activate_scene), and tear everything
/// down with [`dispose`](Self::dispose).
pub struct SceneClient {
    shared: Arc<Shared>,
    subscriptions: Mutex<Vec<Subscription>>,
    loop_task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SceneClient {
    /// Build the client and start its event loop.
    ///
    /// Loads the continuity cache; its stored radius seeds the poller.
    #[must_use]
    pub fn new(api: Arc<dyn SceneApi>, config: ClientConfig) -> Self {
        let cache_path = config.cache_path.unwrap_or_else(cache::cache_path);
        let cached = cache::load_cache(&cache_path);
        let mut presence = config.presence;
        presence.radius_km = cached.radius_km;

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            store: Mutex::new(ReconciliationStore::new()),
            clock: ExpiryClock::new(),
            poller: PresencePoller::new(Arc::clone(&api), presence),
            channel: ChannelManager::new(config.ws_url, config.channel),
            api,
            cache: Mutex::new(cached),
            cache_path,
            tx,
        });

        let mut subscriptions = Vec::with_capacity(ALL_EVENT_TYPES.len());
        for event_type in ALL_EVENT_TYPES {
            let tx = shared.tx.clone();
            subscriptions.push(shared.channel.subscribe(event_type, move |event| {
                let _ = tx.send(LoopMessage::Push(event.clone()));
            }));
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(Arc::clone(&shared), rx, cancel.clone()));
        Self {
            shared,
            subscriptions: Mutex::new(subscriptions),
            loop_task: Mutex::new(Some((cancel, task))),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start broadcasting as `persona` at `location`.
    ///
    /// Starts the scene over REST, connects the push channel scoped to it,
    /// hydrates chat state, arms the scene countdown, and starts the
    /// roster poller. A hydration failure unwinds the partial activation
    /// (scene identity, channel) before returning the error, so the
    /// caller can simply retry.
    pub async fn activate_scene(&self, persona: &Persona, location: GeoPoint) -> Result<Scene> {
        let persona_id = persona.id.clone().ok_or(ClientError::MissingPersonaId)?;
        let scene = self
            .shared
            .api
            .start_scene(&persona_id, location)
            .await?
            .into_scene();

        let _ = self
            .shared
            .store
            .lock()
            .set_local_scene(Some(scene.id.clone()));
        self.shared.channel.connect(Some(&scene.id)).await;

        let snapshot = match fetch_snapshot(&self.shared).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                teardown_scene(&self.shared).await;
                return Err(error);
            }
        };
        let effects = self.shared.store.lock().hydrate(snapshot);
        handle_effects(&self.shared, effects);

        let tx = self.shared.tx.clone();
        self.shared
            .clock
            .arm(SCENE_TIMER_ID, scene.expires_at, move || {
                let _ = tx.send(LoopMessage::SceneExpired);
            });
        self.shared.poller.start(location);

        update_cache(&self.shared, |cache| {
            cache.persona = Some(persona.clone());
            cache.scene_id = Some(scene.id.clone());
            cache.scene_active = true;
        });
        Ok(scene)
    }

    /// Stop broadcasting: end the scene over REST, then tear down local
    /// state, timers, poller, and the channel.
    pub async fn deactivate(&self) -> Result<()> {
        self.shared.api.stop_scene().await?;
        teardown_scene(&self.shared).await;
        Ok(())
    }

    /// Shut the client down: unsubscribe handlers, stop the loop, disarm
    /// timers, stop polling, close the channel. The instance is inert
    /// afterwards.
    pub async fn dispose(&self) {
        for subscription in self.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }
        let task = self.loop_task.lock().take();
        if let Some((cancel, task)) = task {
            cancel.cancel();
            let _ = task.await;
        }
        self.shared.clock.clear();
        self.shared.poller.stop();
        self.shared.channel.disconnect().await;
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send a chat request to another scene.
    ///
    /// The outbound entry is recorded only once the server has assigned
    /// its ID, so a failure here leaves nothing to roll back.
    pub async fn send_request(
        &self,
        to_scene_id: &SceneId,
        message: Option<&str>,
    ) -> Result<ChatRequest> {
        let dto = self
            .shared
            .api
            .send_chat_request(to_scene_id, message)
            .await?;
        let request = dto.into_outbound();
        self.shared.store.lock().record_outbound(request.clone());
        Ok(request)
    }

    /// Accept a pending inbound request, opening its session.
    pub async fn accept_request(&self, request_id: &RequestId) -> Result<()> {
        let response = self.shared.api.accept_chat_request(request_id).await?;
        let effects = self
            .shared
            .store
            .lock()
            .accept_local(request_id, response.expires_at);
        handle_effects(&self.shared, effects);
        Ok(())
    }

    /// Decline a pending inbound request.
    pub async fn reject_request(&self, request_id: &RequestId) -> Result<()> {
        self.shared.api.reject_chat_request(request_id).await?;
        self.shared.store.lock().reject_local(request_id);
        Ok(())
    }

    /// Withdraw a pending request we sent.
    pub async fn cancel_request(&self, request_id: &RequestId) -> Result<()> {
        self.shared.api.cancel_chat_request(request_id).await?;
        self.shared.store.lock().cancel_local(request_id);
        Ok(())
    }

    /// Send a message in a session: optimistic echo first, then confirm
    /// with the server row or roll the echo back on failure.
    pub async fn send_message(
        &self,
        request_id: &RequestId,
        content: &str,
    ) -> Result<ChatMessage> {
        let echo = self
            .shared
            .store
            .lock()
            .begin_message(request_id, content)
            .ok_or_else(|| ClientError::UnknownSession(request_id.clone()))?;
        // begin_message always tags its echo
        let Some(nonce) = echo.nonce.clone() else {
            return Err(ClientError::UnknownSession(request_id.clone()));
        };

        match self
            .shared
            .api
            .send_chat_message(request_id, content, &nonce)
            .await
        {
            Ok(dto) => {
                let confirmed = dto.into_message();
                self.shared
                    .store
                    .lock()
                    .confirm_message(request_id, &nonce, confirmed.clone());
                Ok(confirmed)
            }
            Err(error) => {
                self.shared.store.lock().rollback_message(request_id, &nonce);
                Err(error.into())
            }
        }
    }

    /// Fetch a session's full history from the server into the store.
    pub async fn fetch_history(&self, request_id: &RequestId) -> Result<()> {
        let rows = self.shared.api.chat_messages(request_id).await?;
        let history = rows.into_iter().map(ChatMessageDto::into_message).collect();
        self.shared.store.lock().load_messages(request_id, history);
        Ok(())
    }

    /// Mark which session the user is looking at (clears its unread
    /// marker), or none.
    pub fn set_foreground(&self, request_id: Option<RequestId>) {
        self.shared.store.lock().set_foreground(request_id);
    }

    /// Change the roster radius; refetches immediately and persists the
    /// choice.
    pub fn set_radius(&self, radius_km: f64) {
        self.shared.poller.set_radius(radius_km);
        update_cache(&self.shared, |cache| cache.radius_km = radius_km);
    }

    /// Move the roster center; refetches immediately.
    pub fn set_center(&self, center: GeoPoint) {
        self.shared.poller.set_center(center);
    }

    /// Push our location upstream. Dropped (returns `false`) while the
    /// channel is down.
    pub fn publish_location(&self, location: GeoPoint) -> bool {
        self.shared.channel.publish(Envelope::new(
            "location.update",
            serde_json::json!({
                "latitude": location.latitude,
                "longitude": location.longitude,
            }),
        ))
    }

    // ── Views ────────────────────────────────────────────────────────

    /// Inbound requests, newest first.
    #[must_use]
    pub fn inbound_requests(&self) -> Vec<ChatRequest> {
        self.shared.store.lock().inbound_requests().to_vec()
    }

    /// Outbound requests, newest first.
    #[must_use]
    pub fn outbound_requests(&self) -> Vec<ChatRequest> {
        self.shared.store.lock().outbound_requests().to_vec()
    }

    /// Live sessions.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<ChatSession> {
        self.shared.store.lock().active_sessions().to_vec()
    }

    /// Messages of a session in arrival order.
    #[must_use]
    pub fn messages_of(&self, request_id: &RequestId) -> Vec<ChatMessage> {
        self.shared.store.lock().messages_of(request_id).to_vec()
    }

    /// Count of inbound requests still pending.
    #[must_use]
    pub fn pending_inbound_count(&self) -> usize {
        self.shared.store.lock().pending_inbound_count()
    }

    /// Count of sessions with unseen messages.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.shared.store.lock().unread_count()
    }

    /// Whether a session has unseen messages.
    #[must_use]
    pub fn is_unread(&self, request_id: &RequestId) -> bool {
        self.shared.store.lock().is_unread(request_id)
    }

    /// Pending inbound requests plus unread sessions.
    #[must_use]
    pub fn activity_badge_count(&self) -> usize {
        self.shared.store.lock().activity_badge_count()
    }

    /// The nearby-scene roster from the latest poll.
    #[must_use]
    pub fn roster(&self) -> Vec<NearbyScene> {
        self.shared.poller.roster()
    }

    /// Seconds until a session expires, clamped to zero. `None` when the
    /// session is unknown.
    #[must_use]
    pub fn session_remaining_seconds(&self, request_id: &RequestId) -> Option<i64> {
        self.shared.clock.remaining_seconds(request_id.as_str())
    }

    /// Seconds until our scene's broadcast lapses. `None` without a scene.
    #[must_use]
    pub fn scene_remaining_seconds(&self) -> Option<i64> {
        self.shared.clock.remaining_seconds(SCENE_TIMER_ID)
    }

    /// Whether the push channel is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.channel.is_connected()
    }

    /// Our live scene's ID, if a scene is active.
    #[must_use]
    pub fn local_scene_id(&self) -> Option<SceneId> {
        self.shared.store.lock().local_scene_id().cloned()
    }

    /// The last persisted continuity snapshot.
    #[must_use]
    pub fn cached(&self) -> ContinuityCache {
        self.shared.cache.lock().clone()
    }
}

// ── Loop and effect plumbing ─────────────────────────────────────────────

async fn run_loop(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<LoopMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(message) => handle_message(&shared, message).await,
                None => return,
            },
            () = cancel.cancelled() => return,
        }
    }
}

async fn handle_message(shared: &Arc<Shared>, message: LoopMessage) {
    match message {
        LoopMessage::Push(event) => {
            if let PushEvent::SceneEnded { scene_id } = &event {
                shared.poller.scene_ended(scene_id);
                let ours = shared.store.lock().local_scene_id() == Some(scene_id);
                if ours {
                    debug!("our scene ended server-side");
                    teardown_scene(shared).await;
                    return;
                }
            }
            let effects = shared.store.lock().apply(&event);
            handle_effects(shared, effects);
        }
        LoopMessage::SessionExpired(request_id) => {
            // Local expiry converges with the server's chat.expired path.
            let effects = shared
                .store
                .lock()
                .apply(&PushEvent::SessionEnded { request_id });
            handle_effects(shared, effects);
        }
        LoopMessage::SceneExpired => teardown_scene(shared).await,
        LoopMessage::Hydrated(snapshot) => {
            let effects = shared.store.lock().hydrate(snapshot);
            handle_effects(shared, effects);
        }
    }
}

/// Act on store effects: arm/disarm session timers, kick off refreshes.
fn handle_effects(shared: &Arc<Shared>, effects: Vec<StoreEffect>) {
    for effect in effects {
        match effect {
            StoreEffect::ArmSession {
                request_id,
                expires_at,
            } => {
                let tx = shared.tx.clone();
                let id = request_id.clone();
                shared.clock.arm(request_id.as_str(), expires_at, move || {
                    let _ = tx.send(LoopMessage::SessionExpired(id));
                });
            }
            StoreEffect::DisarmSession { request_id } => {
                shared.clock.disarm(request_id.as_str());
            }
            StoreEffect::RefreshSessions => spawn_refresh(shared),
        }
    }
}

/// Re-fetch the authoritative snapshot in the background; the result
/// re-enters through the loop so hydration is serialized with events.
fn spawn_refresh(shared: &Arc<Shared>) {
    let shared = Arc::clone(shared);
    drop(tokio::spawn(async move {
        match fetch_snapshot(&shared).await {
            Ok(snapshot) => {
                let _ = shared.tx.send(LoopMessage::Hydrated(snapshot));
            }
            Err(error) => warn!(error = %error, "session refresh failed"),
        }
    }));
}

async fn fetch_snapshot(shared: &Shared) -> Result<Snapshot> {
    let local = shared
        .store
        .lock()
        .local_scene_id()
        .cloned()
        .ok_or(ClientError::NoActiveScene)?;
    let inbox = shared.api.chat_inbox().await?;
    let sent = shared.api.sent_requests().await?;
    let sessions = shared.api.active_sessions().await?;
    Ok(Snapshot {
        inbound: inbox.into_iter().map(ChatRequestDto::into_inbound).collect(),
        outbound: sent.into_iter().map(ChatRequestDto::into_outbound).collect(),
        sessions: sessions
            .into_iter()
            .map(|s| s.into_session(&local))
            .collect(),
    })
}

/// Local teardown after the scene ends for any reason (REST stop, local
/// expiry, or a server push naming our scene).
async fn teardown_scene(shared: &Arc<Shared>) {
    shared.clock.clear();
    shared.poller.stop();
    shared.channel.disconnect().await;
    let _ = shared.store.lock().set_local_scene(None);
    update_cache(shared, |cache| {
        cache.scene_id = None;
        cache.scene_active = false;
    });
}

/// Mutate and persist the continuity cache. Persistence is best-effort.
fn update_cache(shared: &Shared, mutate: impl FnOnce(&mut ContinuityCache)) {
    let snapshot = {
        let mut cached = shared.cache.lock();
        mutate(&mut cached);
        cached.clone()
    };
    if let Err(error) = cache::save_cache(&shared.cache_path, &snapshot) {
        warn!(error = %error, "failed to write continuity cache");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::{TimeDelta, Utc};
    use std::time::Duration;

    use scenelink_api::errors::{ApiError, Result as ApiResult};
    use scenelink_api::types::{
        AcceptResponse, ActiveSceneResponse, ChatSessionDto, NearbySceneDto, SceneDto,
    };
    use scenelink_core::ids::{MessageId, Nonce, PersonaId};

    const LOCAL: &str = "scn-a";
    const REMOTE: &str = "scn-b";

    #[derive(Default)]
    struct FakeApi {
        sessions: Mutex<Vec<ChatSessionDto>>,
        inbox: Mutex<Vec<ChatRequestDto>>,
        fail_message_send: Mutex<bool>,
        fail_sessions: Mutex<bool>,
        history: Mutex<Vec<ChatMessageDto>>,
    }

    #[async_trait]
    impl SceneApi for FakeApi {
        async fn send_chat_request(
            &self,
            to_scene_id: &SceneId,
            message: Option<&str>,
        ) -> ApiResult<ChatRequestDto> {
            Ok(ChatRequestDto {
                id: RequestId::from("r-new"),
                from_scene_id: SceneId::from(LOCAL),
                to_scene_id: to_scene_id.clone(),
                message: message.map(str::to_owned),
                status: scenelink_core::domain::RequestStatus::Pending,
                accepted_at: None,
                expires_at: None,
                created_at: Utc::now(),
                from_persona_name: String::new(),
                from_persona_avatar: String::new(),
                from_persona_description: String::new(),
                to_persona_name: None,
            })
        }

        async fn chat_inbox(&self) -> ApiResult<Vec<ChatRequestDto>> {
            Ok(self.inbox.lock().clone())
        }

        async fn sent_requests(&self) -> ApiResult<Vec<ChatRequestDto>> {
            Ok(Vec::new())
        }

        async fn accept_chat_request(&self, request_id: &RequestId) -> ApiResult<AcceptResponse> {
            Ok(AcceptResponse {
                request_id: request_id.clone(),
                expires_at: Utc::now() + TimeDelta::minutes(5),
            })
        }

        async fn reject_chat_request(&self, _request_id: &RequestId) -> ApiResult<()> {
            Ok(())
        }

        async fn cancel_chat_request(&self, _request_id: &RequestId) -> ApiResult<()> {
            Ok(())
        }

        async fn send_chat_message(
            &self,
            request_id: &RequestId,
            content: &str,
            _nonce: &Nonce,
        ) -> ApiResult<ChatMessageDto> {
            if *self.fail_message_send.lock() {
                return Err(ApiError::Status {
                    status: reqwest::StatusCode::CONFLICT,
                    message: "chat expired".to_owned(),
                });
            }
            Ok(ChatMessageDto {
                id: MessageId::from("m-srv"),
                chat_request_id: request_id.clone(),
                from_scene_id: SceneId::from(LOCAL),
                content: content.to_owned(),
                created_at: Utc::now(),
            })
        }

        async fn chat_messages(&self, _request_id: &RequestId) -> ApiResult<Vec<ChatMessageDto>> {
            Ok(self.history.lock().clone())
        }

        async fn active_sessions(&self) -> ApiResult<Vec<ChatSessionDto>> {
            if *self.fail_sessions.lock() {
                return Err(ApiError::Status {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Failed to fetch sessions".to_owned(),
                });
            }
            Ok(self.sessions.lock().clone())
        }

        async fn start_scene(
            &self,
            persona_id: &PersonaId,
            location: GeoPoint,
        ) -> ApiResult<SceneDto> {
            Ok(SceneDto {
                id: SceneId::from(LOCAL),
                persona_id: persona_id.clone(),
                latitude: location.latitude,
                longitude: location.longitude,
                is_active: true,
                started_at: Utc::now(),
                expires_at: Utc::now() + TimeDelta::hours(1),
                created_at: Utc::now(),
            })
        }

        async fn stop_scene(&self) -> ApiResult<()> {
            Ok(())
        }

        async fn active_scene(&self) -> ApiResult<ActiveSceneResponse> {
            Ok(ActiveSceneResponse {
                active: false,
                scene: None,
            })
        }

        async fn nearby_scenes(&self, _center: GeoPoint) -> ApiResult<Vec<NearbySceneDto>> {
            Ok(Vec::new())
        }
    }

    fn session_dto(request_id: &str) -> ChatSessionDto {
        ChatSessionDto {
            request_id: RequestId::from(request_id),
            from_scene_id: SceneId::from(REMOTE),
            to_scene_id: SceneId::from(LOCAL),
            expires_at: Utc::now() + TimeDelta::minutes(5),
            other_persona_name: "Neon Fox".to_owned(),
            other_persona_avatar: String::new(),
            other_persona_description: String::new(),
            last_message_content: None,
            last_message_sender_id: None,
            last_message_at: None,
        }
    }

    fn persona() -> Persona {
        Persona {
            id: Some(PersonaId::from("p1")),
            name: "Midnight Owl".to_owned(),
            avatar: String::new(),
            description: String::new(),
        }
    }

    fn here() -> GeoPoint {
        GeoPoint {
            latitude: 40.0,
            longitude: -73.9,
        }
    }

    fn client_with(api: Arc<FakeApi>, dir: &tempfile::TempDir) -> SceneClient {
        SceneClient::new(
            api,
            ClientConfig {
                ws_url: "ws://127.0.0.1:1/ws".to_owned(),
                cache_path: Some(dir.path().join("cache.json")),
                channel: ChannelConfig::default(),
                presence: PresenceConfig::default(),
            },
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn activate_scene_hydrates_and_arms_timers() {
        let api = Arc::new(FakeApi::default());
        *api.sessions.lock() = vec![session_dto("r1")];
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(Arc::clone(&api), &dir);

        let scene = client.activate_scene(&persona(), here()).await.unwrap();
        assert_eq!(scene.id.as_str(), LOCAL);
        assert_eq!(client.local_scene_id().unwrap().as_str(), LOCAL);

        let sessions = client.active_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].remote_scene_id.as_str(), REMOTE);
        assert!(
            client
                .session_remaining_seconds(&RequestId::from("r1"))
                .is_some()
        );
        assert!(client.scene_remaining_seconds().is_some());

        client.dispose().await;
    }

    #[tokio::test]
    async fn activation_without_persona_id_is_rejected() {
        let api = Arc::new(FakeApi::default());
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(api, &dir);

        let mut anon = persona();
        anon.id = None;
        let result = client.activate_scene(&anon, here()).await;
        assert_matches!(result, Err(ClientError::MissingPersonaId));

        client.dispose().await;
    }

    #[tokio::test]
    async fn failed_hydration_unwinds_the_partial_activation() {
        let api = Arc::new(FakeApi::default());
        *api.fail_sessions.lock() = true;
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(Arc::clone(&api), &dir);

        let result = client.activate_scene(&persona(), here()).await;
        assert_matches!(result, Err(ClientError::Api(_)));
        assert!(client.local_scene_id().is_none());
        assert!(client.scene_remaining_seconds().is_none());

        // A retry after the outage succeeds cleanly.
        *api.fail_sessions.lock() = false;
        let scene = client.activate_scene(&persona(), here()).await.unwrap();
        assert_eq!(scene.id.as_str(), LOCAL);
        assert_eq!(client.local_scene_id().unwrap().as_str(), LOCAL);

        client.dispose().await;
    }

    #[tokio::test]
    async fn activation_persists_the_continuity_cache() {
        let api = Arc::new(FakeApi::default());
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(api, &dir);

        let _ = client.activate_scene(&persona(), here()).await.unwrap();
        let cached = cache::load_cache(&dir.path().join("cache.json"));
        assert!(cached.scene_active);
        assert_eq!(cached.scene_id.unwrap().as_str(), LOCAL);
        assert_eq!(cached.persona.unwrap().name, "Midnight Owl");

        client.deactivate().await.unwrap();
        let cached = cache::load_cache(&dir.path().join("cache.json"));
        assert!(!cached.scene_active);
        assert!(cached.scene_id.is_none());

        client.dispose().await;
    }

    #[tokio::test]
    async fn send_message_confirms_the_echo_with_the_server_row() {
        let api = Arc::new(FakeApi::default());
        *api.sessions.lock() = vec![session_dto("r1")];
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(Arc::clone(&api), &dir);
        let _ = client.activate_scene(&persona(), here()).await.unwrap();

        let req = RequestId::from("r1");
        let sent = client.send_message(&req, "omw").await.unwrap();
        assert_eq!(sent.id.as_ref().unwrap().as_str(), "m-srv");

        let msgs = client.messages_of(&req);
        assert_eq!(msgs.len(), 1);
        assert!(!msgs[0].is_pending());

        client.dispose().await;
    }

    #[tokio::test]
    async fn failed_send_rolls_the_echo_back() {
        let api = Arc::new(FakeApi::default());
        *api.sessions.lock() = vec![session_dto("r1")];
        *api.fail_message_send.lock() = true;
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(Arc::clone(&api), &dir);
        let _ = client.activate_scene(&persona(), here()).await.unwrap();

        let req = RequestId::from("r1");
        let result = client.send_message(&req, "omw").await;
        assert_matches!(result, Err(ClientError::Api(_)));
        assert!(client.messages_of(&req).is_empty());

        client.dispose().await;
    }

    #[tokio::test]
    async fn sending_into_an_unknown_session_fails_fast() {
        let api = Arc::new(FakeApi::default());
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(api, &dir);
        let _ = client.activate_scene(&persona(), here()).await.unwrap();

        let result = client.send_message(&RequestId::from("r-ghost"), "hi").await;
        assert_matches!(result, Err(ClientError::UnknownSession(_)));

        client.dispose().await;
    }

    #[tokio::test]
    async fn push_events_flow_through_the_loop() {
        let api = Arc::new(FakeApi::default());
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(api, &dir);
        let _ = client.activate_scene(&persona(), here()).await.unwrap();

        let _ = client
            .shared
            .tx
            .send(LoopMessage::Push(PushEvent::RequestReceived {
                id: RequestId::from("r9"),
                from_scene_id: SceneId::from(REMOTE),
                from_persona_name: "Neon Fox".to_owned(),
                from_persona_avatar: String::new(),
                from_persona_description: String::new(),
                message: None,
                created_at: Utc::now(),
            }));
        settle().await;

        assert_eq!(client.pending_inbound_count(), 1);
        assert_eq!(client.activity_badge_count(), 1);

        client.dispose().await;
    }

    #[tokio::test]
    async fn accepting_a_request_opens_and_arms_a_session() {
        let api = Arc::new(FakeApi::default());
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(api, &dir);
        let _ = client.activate_scene(&persona(), here()).await.unwrap();

        let _ = client
            .shared
            .tx
            .send(LoopMessage::Push(PushEvent::RequestReceived {
                id: RequestId::from("r2"),
                from_scene_id: SceneId::from(REMOTE),
                from_persona_name: "Neon Fox".to_owned(),
                from_persona_avatar: String::new(),
                from_persona_description: String::new(),
                message: None,
                created_at: Utc::now(),
            }));
        settle().await;

        let req = RequestId::from("r2");
        client.accept_request(&req).await.unwrap();
        assert!(client.active_sessions().iter().any(|s| s.request_id == req));
        assert!(client.session_remaining_seconds(&req).is_some());

        client.dispose().await;
    }

    #[tokio::test]
    async fn session_expiry_tears_the_session_down() {
        let api = Arc::new(FakeApi::default());
        *api.sessions.lock() = vec![session_dto("r1")];
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(Arc::clone(&api), &dir);
        let _ = client.activate_scene(&persona(), here()).await.unwrap();
        assert_eq!(client.active_sessions().len(), 1);

        let _ = client
            .shared
            .tx
            .send(LoopMessage::SessionExpired(RequestId::from("r1")));
        settle().await;

        assert!(client.active_sessions().is_empty());
        assert!(
            client
                .session_remaining_seconds(&RequestId::from("r1"))
                .is_none()
        );

        client.dispose().await;
    }

    #[tokio::test]
    async fn fetch_history_loads_server_rows() {
        let api = Arc::new(FakeApi::default());
        *api.sessions.lock() = vec![session_dto("r1")];
        *api.history.lock() = vec![ChatMessageDto {
            id: MessageId::from("m1"),
            chat_request_id: RequestId::from("r1"),
            from_scene_id: SceneId::from(REMOTE),
            content: "hey".to_owned(),
            created_at: Utc::now(),
        }];
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(Arc::clone(&api), &dir);
        let _ = client.activate_scene(&persona(), here()).await.unwrap();

        let req = RequestId::from("r1");
        client.fetch_history(&req).await.unwrap();
        let msgs = client.messages_of(&req);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "hey");

        client.dispose().await;
    }

    #[tokio::test]
    async fn a_push_ending_our_own_scene_tears_everything_down() {
        let api = Arc::new(FakeApi::default());
        *api.sessions.lock() = vec![session_dto("r1")];
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(Arc::clone(&api), &dir);
        let _ = client.activate_scene(&persona(), here()).await.unwrap();

        let _ = client
            .shared
            .tx
            .send(LoopMessage::Push(PushEvent::SceneEnded {
                scene_id: SceneId::from(LOCAL),
            }));
        settle().await;

        assert!(client.local_scene_id().is_none());
        assert!(client.active_sessions().is_empty());
        assert!(client.scene_remaining_seconds().is_none());

        client.dispose().await;
    }

    #[tokio::test]
    async fn send_request_records_the_outbound_entry() {
        let api = Arc::new(FakeApi::default());
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(api, &dir);
        let _ = client.activate_scene(&persona(), here()).await.unwrap();

        let request = client
            .send_request(&SceneId::from(REMOTE), Some("hello"))
            .await
            .unwrap();
        assert_eq!(request.id.as_str(), "r-new");
        assert_eq!(client.outbound_requests().len(), 1);

        client.dispose().await;
    }

    #[tokio::test]
    async fn set_radius_persists_the_choice() {
        let api = Arc::new(FakeApi::default());
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(api, &dir);

        client.set_radius(2.0);
        let cached = cache::load_cache(&dir.path().join("cache.json"));
        assert!((cached.radius_km - 2.0).abs() < f64::EPSILON);

        client.dispose().await;
    }
}
