//! The continuity cache: best-effort local persistence across launches.
//!
//! A single JSON file under `~/.scenelink/` remembering the last persona,
//! scene, and roster radius so the next launch can resume where the user
//! left off. Loss or corruption degrades to defaults with a warning —
//! hydration rebuilds real state from the server either way.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use scenelink_core::domain::Persona;
use scenelink_core::ids::SceneId;

use crate::errors::CacheError;

const DEFAULT_RADIUS_KM: f64 = 5.0;

/// What survives an app restart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContinuityCache {
    /// Last persona the user broadcast as.
    #[serde(default)]
    pub persona: Option<Persona>,
    /// Last scene ID, if a broadcast was live at shutdown.
    #[serde(default)]
    pub scene_id: Option<SceneId>,
    /// Whether that scene was still active.
    #[serde(default)]
    pub scene_active: bool,
    /// Last chosen roster radius.
    #[serde(default = "default_radius")]
    pub radius_km: f64,
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS_KM
}

impl Default for ContinuityCache {
    fn default() -> Self {
        Self {
            persona: None,
            scene_id: None,
            scene_active: false,
            radius_km: DEFAULT_RADIUS_KM,
        }
    }
}

/// Resolve the cache file path (`~/.scenelink/cache.json`).
pub fn cache_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".scenelink").join("cache.json")
}

/// Load the cache, falling back to defaults on any problem.
///
/// A missing file is normal (first launch); unreadable or corrupt content
/// is logged and discarded.
pub fn load_cache(path: &Path) -> ContinuityCache {
    if !path.exists() {
        debug!(?path, "no continuity cache, starting fresh");
        return ContinuityCache::default();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(error) => {
                warn!(?path, error = %error, "corrupt continuity cache, using defaults");
                ContinuityCache::default()
            }
        },
        Err(error) => {
            warn!(?path, error = %error, "unreadable continuity cache, using defaults");
            ContinuityCache::default()
        }
    }
}

/// Write the cache, creating the parent directory as needed.
pub fn save_cache(path: &Path, cache: &ContinuityCache) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(cache)?;
    std::fs::write(path, content)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
