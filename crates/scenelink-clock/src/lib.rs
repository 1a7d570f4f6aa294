//! # scenelink-clock
//!
//! The expiry clock: one countdown timer per live entity (chat session or
//! the local scene), firing an `on_expire` callback exactly once when the
//! deadline passes.
//!
//! Timers tick on a fixed one-second cadence rather than sleeping straight
//! to the deadline so a "time remaining" view can stay in step with the
//! same clock. Ticks never mutate domain state — the callback feeds the
//! store's normal termination path, so local expiry and server-driven
//! expiry converge on identical handling.

#![deny(unsafe_code)]

pub mod clock;

pub use clock::ExpiryClock;
