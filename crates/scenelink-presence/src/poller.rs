//! The roster polling task.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scenelink_api::SceneApi;
use scenelink_core::domain::{GeoPoint, NearbyScene};
use scenelink_core::ids::SceneId;

use crate::geo::distance_km;

/// Poller tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct PresenceConfig {
    /// Snapshot fetch cadence.
    pub poll_interval: Duration,
    /// Roster radius around the center, in kilometers.
    pub radius_km: f64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            radius_km: 5.0,
        }
    }
}

struct PollHandle {
    cancel: CancellationToken,
    refetch: mpsc::Sender<()>,
}

/// Polls the nearby-scene roster and exposes it as a shared snapshot.
///
/// Each successful poll replaces the roster wholesale; `scene_ended`
/// removes an entry immediately between polls. Additions never short-cut
/// the poll — a `scene.started` push is ignored here by design.
///
/// The radius outlives the poll loop: a `set_radius` made at any point,
/// polling or not, stays in force across `stop`/`start` cycles.
pub struct PresencePoller {
    api: Arc<dyn SceneApi>,
    config: PresenceConfig,
    roster: Arc<RwLock<Vec<NearbyScene>>>,
    center: Arc<Mutex<Option<GeoPoint>>>,
    radius_km: Arc<Mutex<f64>>,
    handle: Mutex<Option<PollHandle>>,
}

impl PresencePoller {
    /// Create a poller over `api`.
    #[must_use]
    pub fn new(api: Arc<dyn SceneApi>, config: PresenceConfig) -> Self {
        Self {
            api,
            roster: Arc::new(RwLock::new(Vec::new())),
            center: Arc::new(Mutex::new(None)),
            radius_km: Arc::new(Mutex::new(config.radius_km)),
            handle: Mutex::new(None),
            config,
        }
    }

    /// Start polling around `center` with the current radius. Replaces any
    /// running poll loop and fetches immediately.
    pub fn start(&self, center: GeoPoint) {
        self.stop();
        *self.center.lock() = Some(center);

        let cancel = CancellationToken::new();
        let (refetch_tx, mut refetch_rx) = mpsc::channel::<()>(4);
        *self.handle.lock() = Some(PollHandle {
            cancel: cancel.clone(),
            refetch: refetch_tx,
        });

        let api = Arc::clone(&self.api);
        let roster = Arc::clone(&self.roster);
        let poll_center = Arc::clone(&self.center);
        let poll_radius = Arc::clone(&self.radius_km);
        let poll_interval = self.config.poll_interval;
        drop(tokio::spawn(async move {
            let mut interval = time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        poll_once(api.as_ref(), &roster, &poll_center, &poll_radius).await;
                    }
                    received = refetch_rx.recv() => {
                        if received.is_none() {
                            break;
                        }
                        poll_once(api.as_ref(), &roster, &poll_center, &poll_radius).await;
                    }
                    () = cancel.cancelled() => break,
                }
            }
        }));
    }

    /// Stop polling. The roster keeps its last contents.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.cancel.cancel();
        }
    }

    /// Change the roster radius and refetch immediately. Takes effect even
    /// while stopped.
    pub fn set_radius(&self, radius_km: f64) {
        *self.radius_km.lock() = radius_km;
        self.trigger_refetch();
    }

    /// Move the roster center and refetch immediately.
    pub fn set_center(&self, center: GeoPoint) {
        *self.center.lock() = Some(center);
        self.trigger_refetch();
    }

    /// Drop a roster entry whose scene just ended.
    pub fn scene_ended(&self, scene_id: &SceneId) {
        self.roster.write().retain(|s| &s.scene_id != scene_id);
    }

    /// Current roster snapshot.
    #[must_use]
    pub fn roster(&self) -> Vec<NearbyScene> {
        self.roster.read().clone()
    }

    fn trigger_refetch(&self) {
        if let Some(handle) = self.handle.lock().as_ref() {
            if handle.refetch.try_send(()).is_err() {
                debug!("refetch already queued");
            }
        }
    }
}

/// One fetch-and-replace cycle. Failures keep the previous roster.
async fn poll_once(
    api: &dyn SceneApi,
    roster: &RwLock<Vec<NearbyScene>>,
    center: &Mutex<Option<GeoPoint>>,
    radius_km: &Mutex<f64>,
) {
    let Some(center) = *center.lock() else {
        return;
    };
    let radius_km = *radius_km.lock();
    match api.nearby_scenes(center).await {
        Ok(rows) => {
            let fresh: Vec<NearbyScene> = rows
                .into_iter()
                .map(scenelink_api::NearbySceneDto::into_nearby)
                .filter(|s| distance_km(center, s.location) <= radius_km)
                .collect();
            debug!(count = fresh.len(), "roster replaced");
            *roster.write() = fresh;
        }
        Err(error) => {
            warn!(error = %error, "nearby poll failed; keeping previous roster");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
