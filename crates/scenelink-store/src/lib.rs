//! # scenelink-store
//!
//! The reconciliation store: authoritative client-side state for chat
//! requests, active sessions, per-session messages, and unread markers.
//!
//! The store is a synchronous state machine with no I/O and no timers.
//! Callers feed it REST snapshots ([`Snapshot`]) and push events, and it
//! answers with [`StoreEffect`]s describing the timer and refetch work the
//! caller must do. That keeps every mutation on one logical writer and makes
//! the merge rules directly testable.
//!
//! Core guarantees:
//!
//! - applying the same event twice is a no-op
//! - terminal request statuses never change again
//! - an optimistic message echo is replaced in place by its confirmation,
//!   never duplicated
//! - hydration replaces collections wholesale; it never merges field-by-field

#![deny(unsafe_code)]

pub mod effects;
pub mod snapshot;
pub mod store;

pub use effects::StoreEffect;
pub use snapshot::Snapshot;
pub use store::ReconciliationStore;
