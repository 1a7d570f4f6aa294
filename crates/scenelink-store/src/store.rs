//! The reconciliation store itself.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use scenelink_core::domain::{
    ChatMessage, ChatRequest, ChatSession, MessagePreview, Persona, RequestStatus,
};
use scenelink_core::events::PushEvent;
use scenelink_core::ids::{Nonce, RequestId, SceneId};

use crate::effects::StoreEffect;
use crate::snapshot::Snapshot;

/// Authoritative in-memory chat state for the local scene.
///
/// All mutation goes through [`apply`](Self::apply), the optimistic command
/// helpers, and [`hydrate`](Self::hydrate). Everything is synchronous; the
/// caller owns timers and network work via the returned [`StoreEffect`]s.
#[derive(Debug, Default)]
pub struct ReconciliationStore {
    local_scene_id: Option<SceneId>,
    inbound: Vec<ChatRequest>,
    outbound: Vec<ChatRequest>,
    sessions: Vec<ChatSession>,
    messages: HashMap<RequestId, Vec<ChatMessage>>,
    unread: HashSet<RequestId>,
    foreground: Option<RequestId>,
}

impl ReconciliationStore {
    /// Create an empty store with no scene identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or clear) the local scene identity.
    ///
    /// Clearing it also clears all chat state: without a scene there is
    /// nothing to correlate against.
    pub fn set_local_scene(&mut self, scene_id: Option<SceneId>) -> Vec<StoreEffect> {
        self.local_scene_id = scene_id;
        if self.local_scene_id.is_none() {
            let effects = self
                .sessions
                .drain(..)
                .map(|s| StoreEffect::DisarmSession {
                    request_id: s.request_id,
                })
                .collect();
            self.inbound.clear();
            self.outbound.clear();
            self.messages.clear();
            self.unread.clear();
            self.foreground = None;
            return effects;
        }
        Vec::new()
    }

    /// The local scene identity, if a scene is live.
    #[must_use]
    pub fn local_scene_id(&self) -> Option<&SceneId> {
        self.local_scene_id.as_ref()
    }

    // ── Hydration ────────────────────────────────────────────────────

    /// Replace request and session collections with a server snapshot.
    ///
    /// Messages and unread markers survive only for sessions the snapshot
    /// still contains. Returns disarms for vanished sessions and arms for
    /// every surviving one.
    pub fn hydrate(&mut self, snapshot: Snapshot) -> Vec<StoreEffect> {
        let mut effects = Vec::new();

        let surviving: HashSet<RequestId> = snapshot
            .sessions
            .iter()
            .map(|s| s.request_id.clone())
            .collect();
        for session in &self.sessions {
            if !surviving.contains(&session.request_id) {
                effects.push(StoreEffect::DisarmSession {
                    request_id: session.request_id.clone(),
                });
            }
        }

        self.inbound = snapshot.inbound;
        self.outbound = snapshot.outbound;
        self.sessions = snapshot.sessions;
        self.messages.retain(|id, _| surviving.contains(id));
        self.unread.retain(|id| surviving.contains(id));
        if self
            .foreground
            .as_ref()
            .is_some_and(|fg| !surviving.contains(fg))
        {
            self.foreground = None;
        }

        for session in &self.sessions {
            effects.push(StoreEffect::ArmSession {
                request_id: session.request_id.clone(),
                expires_at: session.expires_at,
            });
        }
        effects
    }

    // ── Push event application ───────────────────────────────────────

    /// Apply a push event. Safe to call with replayed or stale events;
    /// anything already reflected is a no-op.
    pub fn apply(&mut self, event: &PushEvent) -> Vec<StoreEffect> {
        match event {
            PushEvent::RequestReceived {
                id,
                from_scene_id,
                from_persona_name,
                from_persona_avatar,
                from_persona_description,
                message,
                created_at,
            } => {
                if self.find_request(id).is_some() {
                    return Vec::new();
                }
                self.inbound.insert(
                    0,
                    ChatRequest {
                        id: id.clone(),
                        counterparty: Persona {
                            id: None,
                            name: from_persona_name.clone(),
                            avatar: from_persona_avatar.clone(),
                            description: from_persona_description.clone(),
                        },
                        counterparty_scene_id: from_scene_id.clone(),
                        message: message.clone(),
                        created_at: *created_at,
                        status: RequestStatus::Pending,
                    },
                );
                Vec::new()
            }

            PushEvent::RequestAccepted {
                request_id,
                expires_at,
                from_scene_id,
                to_scene_id,
            } => self.accept_request(request_id, *expires_at, Some((from_scene_id, to_scene_id))),

            PushEvent::RequestRejected { request_id, .. } => {
                let _ = self.transition(request_id, RequestStatus::Rejected);
                Vec::new()
            }

            PushEvent::RequestCanceled { request_id } => {
                let _ = self.transition(request_id, RequestStatus::Canceled);
                Vec::new()
            }

            PushEvent::MessageReceived {
                message_id,
                request_id,
                from_scene_id,
                content,
                nonce,
                created_at,
                ..
            } => {
                if self.session_index(request_id).is_none() {
                    debug!(%request_id, "message for unknown session; requesting refresh");
                    return vec![StoreEffect::RefreshSessions];
                }
                let incoming = ChatMessage {
                    id: Some(message_id.clone()),
                    request_id: request_id.clone(),
                    sender_scene_id: from_scene_id.clone(),
                    content: content.clone(),
                    created_at: *created_at,
                    nonce: nonce.clone().filter(|n| !n.is_empty()),
                };
                self.merge_message(request_id, incoming);
                Vec::new()
            }

            PushEvent::ChatExpired { request_id, .. } | PushEvent::SessionEnded { request_id } => {
                self.end_session(request_id)
            }

            PushEvent::SceneEnded { scene_id } => self.scene_ended(scene_id),

            // Presence additions are poll-driven; the store has no view to update.
            PushEvent::SceneStarted { .. } => Vec::new(),
        }
    }

    // ── Optimistic commands ──────────────────────────────────────────

    /// Record an outbound request after the server assigned its ID.
    pub fn record_outbound(&mut self, request: ChatRequest) {
        if self.find_request(&request.id).is_some() {
            return;
        }
        self.outbound.insert(0, request);
    }

    /// Append an optimistic echo for a message we are about to send.
    ///
    /// Returns the echo (carrying its fresh nonce) so the caller can hand
    /// the nonce to the server, or `None` when the session is unknown or no
    /// scene is live.
    pub fn begin_message(&mut self, request_id: &RequestId, content: &str) -> Option<ChatMessage> {
        let local = self.local_scene_id.clone()?;
        let _ = self.session_index(request_id)?;
        let echo = ChatMessage {
            id: None,
            request_id: request_id.clone(),
            sender_scene_id: local,
            content: content.to_owned(),
            created_at: Utc::now(),
            nonce: Some(Nonce::new()),
        };
        self.messages
            .entry(request_id.clone())
            .or_default()
            .push(echo.clone());
        self.refresh_preview(request_id);
        Some(echo)
    }

    /// Replace the echo tagged `nonce` with the server's confirmed message.
    ///
    /// Falls back to the normal merge rules, so a push event that already
    /// confirmed the echo makes this a no-op.
    pub fn confirm_message(&mut self, request_id: &RequestId, nonce: &Nonce, mut confirmed: ChatMessage) {
        if self.session_index(request_id).is_none() {
            return;
        }
        confirmed.nonce = Some(nonce.clone());
        self.merge_message(request_id, confirmed);
    }

    /// Remove the echo tagged `nonce` after a failed send.
    pub fn rollback_message(&mut self, request_id: &RequestId, nonce: &Nonce) {
        if let Some(list) = self.messages.get_mut(request_id) {
            list.retain(|m| !(m.is_pending() && m.nonce.as_ref() == Some(nonce)));
        }
        self.refresh_preview(request_id);
    }

    /// Replace a session's history with fetched server rows, keeping any
    /// optimistic echoes still awaiting confirmation at the tail.
    pub fn load_messages(&mut self, request_id: &RequestId, history: Vec<ChatMessage>) {
        if self.session_index(request_id).is_none() {
            return;
        }
        let mut list = history;
        if let Some(prev) = self.messages.get_mut(request_id) {
            for echo in prev.drain(..) {
                if echo.is_pending() {
                    list.push(echo);
                }
            }
        }
        let _ = self.messages.insert(request_id.clone(), list);
        self.refresh_preview(request_id);
    }

    /// Apply a locally-performed accept (REST response) to the store.
    ///
    /// Converges with the push-driven path, so whichever arrives first wins
    /// and the other is a no-op.
    pub fn accept_local(
        &mut self,
        request_id: &RequestId,
        expires_at: DateTime<Utc>,
    ) -> Vec<StoreEffect> {
        self.accept_request(request_id, expires_at, None)
    }

    /// Apply a locally-performed reject.
    pub fn reject_local(&mut self, request_id: &RequestId) {
        let _ = self.transition(request_id, RequestStatus::Rejected);
    }

    /// Apply a locally-performed cancel.
    pub fn cancel_local(&mut self, request_id: &RequestId) {
        let _ = self.transition(request_id, RequestStatus::Canceled);
    }

    /// Mark a session as the one the user is looking at (clears its unread
    /// marker), or none.
    pub fn set_foreground(&mut self, request_id: Option<RequestId>) {
        if let Some(id) = &request_id {
            let _ = self.unread.remove(id);
        }
        self.foreground = request_id;
    }

    // ── Derived views ────────────────────────────────────────────────

    /// Inbound requests, newest first.
    #[must_use]
    pub fn inbound_requests(&self) -> &[ChatRequest] {
        &self.inbound
    }

    /// Outbound requests, newest first.
    #[must_use]
    pub fn outbound_requests(&self) -> &[ChatRequest] {
        &self.outbound
    }

    /// Live sessions.
    #[must_use]
    pub fn active_sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// A session by its request ID.
    #[must_use]
    pub fn session(&self, request_id: &RequestId) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| &s.request_id == request_id)
    }

    /// Messages of a session in arrival order (empty when unknown).
    #[must_use]
    pub fn messages_of(&self, request_id: &RequestId) -> &[ChatMessage] {
        self.messages.get(request_id).map_or(&[], Vec::as_slice)
    }

    /// Count of inbound requests still pending.
    #[must_use]
    pub fn pending_inbound_count(&self) -> usize {
        self.inbound
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .count()
    }

    /// Count of sessions with unseen messages.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.unread.len()
    }

    /// Whether a session has unseen messages.
    #[must_use]
    pub fn is_unread(&self, request_id: &RequestId) -> bool {
        self.unread.contains(request_id)
    }

    /// Pending inbound requests plus unread sessions: the activity badge.
    #[must_use]
    pub fn activity_badge_count(&self) -> usize {
        self.pending_inbound_count() + self.unread.len()
    }

    /// The foregrounded session, if any.
    #[must_use]
    pub fn foreground(&self) -> Option<&RequestId> {
        self.foreground.as_ref()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn find_request(&self, id: &RequestId) -> Option<&ChatRequest> {
        self.inbound
            .iter()
            .chain(self.outbound.iter())
            .find(|r| &r.id == id)
    }

    fn find_request_mut(&mut self, id: &RequestId) -> Option<&mut ChatRequest> {
        self.inbound
            .iter_mut()
            .chain(self.outbound.iter_mut())
            .find(|r| &r.id == id)
    }

    fn session_index(&self, request_id: &RequestId) -> Option<usize> {
        self.sessions
            .iter()
            .position(|s| &s.request_id == request_id)
    }

    /// One-way status transition; stale or replayed terminal events are
    /// silent no-ops. Returns whether the transition happened.
    fn transition(&mut self, request_id: &RequestId, to: RequestStatus) -> bool {
        match self.find_request_mut(request_id) {
            Some(request) if request.status == RequestStatus::Pending => {
                request.status = to;
                true
            }
            Some(request) => {
                debug!(
                    %request_id,
                    current = ?request.status,
                    attempted = ?to,
                    "ignoring transition on terminal request"
                );
                false
            }
            None => false,
        }
    }

    fn accept_request(
        &mut self,
        request_id: &RequestId,
        expires_at: DateTime<Utc>,
        sides: Option<(&SceneId, &SceneId)>,
    ) -> Vec<StoreEffect> {
        if self.session_index(request_id).is_some() {
            return Vec::new();
        }

        let Some(request) = self.find_request(request_id).cloned() else {
            // Reconnect gap: the accept outran our knowledge of the request.
            warn!(%request_id, "accepted event for unknown request; requesting refresh");
            return vec![StoreEffect::RefreshSessions];
        };
        if request.status.is_terminal() {
            return Vec::new();
        }

        let remote = request.counterparty_scene_id.clone();
        let local = match sides {
            Some((from, to)) if *from == remote => to.clone(),
            Some((from, _)) => from.clone(),
            None => match self.local_scene_id.clone() {
                Some(id) => id,
                None => return vec![StoreEffect::RefreshSessions],
            },
        };

        let _ = self.transition(request_id, RequestStatus::Accepted);
        self.sessions.push(ChatSession {
            request_id: request_id.clone(),
            local_scene_id: local,
            remote_scene_id: remote,
            expires_at,
            counterparty: request.counterparty,
            last_message: None,
        });
        vec![StoreEffect::ArmSession {
            request_id: request_id.clone(),
            expires_at,
        }]
    }

    /// Merge an incoming (or confirmed) message into its session.
    ///
    /// Dedup order: known server ID wins, then nonce-matched echo
    /// replacement in place, then append.
    fn merge_message(&mut self, request_id: &RequestId, incoming: ChatMessage) {
        let from_counterparty = Some(&incoming.sender_scene_id) != self.local_scene_id.as_ref();
        let list = self.messages.entry(request_id.clone()).or_default();

        if incoming
            .id
            .as_ref()
            .is_some_and(|id| list.iter().any(|m| m.id.as_ref() == Some(id)))
        {
            return;
        }

        let echo_pos = incoming.nonce.as_ref().and_then(|nonce| {
            list.iter()
                .position(|m| m.is_pending() && m.nonce.as_ref() == Some(nonce))
        });
        match echo_pos {
            Some(pos) => list[pos] = incoming,
            None => {
                list.push(incoming);
                if from_counterparty && self.foreground.as_ref() != Some(request_id) {
                    let _ = self.unread.insert(request_id.clone());
                }
            }
        }
        self.refresh_preview(request_id);
    }

    fn refresh_preview(&mut self, request_id: &RequestId) {
        let preview = self
            .messages
            .get(request_id)
            .and_then(|list| list.last())
            .map(|m| MessagePreview {
                content: m.content.clone(),
                sender_scene_id: m.sender_scene_id.clone(),
                sent_at: m.created_at,
            });
        if let Some(pos) = self.session_index(request_id) {
            self.sessions[pos].last_message = preview;
        }
    }

    /// Tear down one session: drop it plus its messages and unread marker,
    /// and expire its request if still pending.
    fn end_session(&mut self, request_id: &RequestId) -> Vec<StoreEffect> {
        let _ = self.transition(request_id, RequestStatus::Expired);
        let Some(pos) = self.session_index(request_id) else {
            return Vec::new();
        };
        let _ = self.sessions.remove(pos);
        let _ = self.messages.remove(request_id);
        let _ = self.unread.remove(request_id);
        if self.foreground.as_ref() == Some(request_id) {
            self.foreground = None;
        }
        vec![StoreEffect::DisarmSession {
            request_id: request_id.clone(),
        }]
    }

    /// A scene went dark: remove sessions on either side of it and expire
    /// pending requests tied to it (the server deletes those rows).
    fn scene_ended(&mut self, scene_id: &SceneId) -> Vec<StoreEffect> {
        let ended: Vec<RequestId> = self
            .sessions
            .iter()
            .filter(|s| &s.remote_scene_id == scene_id || &s.local_scene_id == scene_id)
            .map(|s| s.request_id.clone())
            .collect();
        let mut effects = Vec::new();
        for request_id in ended {
            effects.extend(self.end_session(&request_id));
        }

        let dead: Vec<RequestId> = self
            .inbound
            .iter()
            .chain(self.outbound.iter())
            .filter(|r| {
                r.status == RequestStatus::Pending && &r.counterparty_scene_id == scene_id
            })
            .map(|r| r.id.clone())
            .collect();
        for request_id in dead {
            let _ = self.transition(&request_id, RequestStatus::Expired);
        }
        effects
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
