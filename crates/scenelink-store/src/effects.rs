//! Side-effect descriptions returned by store mutations.

use chrono::{DateTime, Utc};

use scenelink_core::ids::RequestId;

/// Work the caller must perform after a store mutation.
///
/// The store itself never arms timers or issues network calls; it reports
/// what changed and the client loop acts on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEffect {
    /// Arm (or replace) the countdown timer for a session.
    ArmSession {
        /// Session key.
        request_id: RequestId,
        /// Deadline the timer should fire at.
        expires_at: DateTime<Utc>,
    },
    /// Disarm the countdown timer for a removed session.
    DisarmSession {
        /// Session key.
        request_id: RequestId,
    },
    /// The push stream referenced a session we do not know; re-fetch the
    /// authoritative session list.
    RefreshSessions,
}
