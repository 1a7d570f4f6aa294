//! # scenelink-presence
//!
//! The presence poller: keeps a roster of nearby scenes by fetching a full
//! snapshot on a fixed interval and replacing the roster wholesale each
//! time. Push `scene.ended` notifications remove entries between polls;
//! additions wait for the next poll. A failed poll keeps the previous
//! roster — stale presence beats empty presence.

#![deny(unsafe_code)]

pub mod geo;
pub mod poller;

pub use geo::distance_km;
pub use poller::{PresenceConfig, PresencePoller};
