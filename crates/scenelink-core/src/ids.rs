//! Branded ID newtypes for type safety.
//!
//! Every entity in the scenelink system has a distinct ID type implemented as
//! a newtype wrapper around `String`. This prevents accidentally passing a
//! scene ID where a chat-request ID is expected — easy to do when every
//! cross-entity reference on the wire is a bare UUID string.
//!
//! Server-assigned IDs arrive as opaque strings and are wrapped verbatim.
//! Client-generated values (message nonces) use UUID v7 via
//! [`uuid::Uuid::now_v7`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a persona.
    PersonaId
}

branded_id! {
    /// Unique identifier for a scene (an active presence broadcast).
    ///
    /// The scene ID is the canonical correlation key: requests, messages,
    /// sessions, and presence entries all reference each other by scene ID.
    SceneId
}

branded_id! {
    /// Unique identifier for a chat request (and, once accepted, its session).
    RequestId
}

branded_id! {
    /// Server-assigned identifier for a chat message.
    MessageId
}

branded_id! {
    /// Client-generated idempotency nonce tagging an optimistic message send.
    Nonce
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
