//! # scenelink-core
//!
//! Foundation types for the scenelink synchronization engine.
//!
//! This crate provides the shared vocabulary the other scenelink crates
//! depend on:
//!
//! - **Branded IDs**: `SceneId`, `PersonaId`, `RequestId`, `MessageId`,
//!   `Nonce` as newtypes for type safety
//! - **Domain model**: personas, chat requests, chat sessions, messages,
//!   scenes, and nearby-presence entries
//! - **Push events**: the `{type, data}` wire envelope and the typed
//!   [`events::PushEvent`] enum covering every server push

#![deny(unsafe_code)]

pub mod domain;
pub mod events;
pub mod ids;

pub use domain::{
    ChatMessage, ChatRequest, ChatSession, GeoPoint, MessagePreview, NearbyScene, Persona,
    RequestStatus, Scene,
};
pub use events::{Envelope, PushEvent};
pub use ids::{MessageId, Nonce, PersonaId, RequestId, SceneId};
