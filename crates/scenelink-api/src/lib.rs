//! # scenelink-api
//!
//! REST collaborator surface for the synchronization engine.
//!
//! [`SceneApi`] is the trait the rest of the workspace programs against;
//! [`HttpApi`] is the production `reqwest` implementation. Wire DTOs in
//! [`types`] mirror the server's snake_case JSON exactly and convert into
//! the `scenelink-core` domain model.

#![deny(unsafe_code)]

pub mod api;
pub mod errors;
pub mod http;
pub mod types;

pub use api::SceneApi;
pub use errors::{ApiError, Result};
pub use http::HttpApi;
pub use types::{
    AcceptResponse, ActiveSceneResponse, ChatMessageDto, ChatRequestDto, ChatSessionDto,
    NearbySceneDto, SceneDto,
};
