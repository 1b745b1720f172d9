//! Type-safe identifier wrappers.
//!
//! Roblox universes and Discord channels are both addressed by numeric
//! snowflake-style identifiers that arrive as strings (from config, env vars
//! and JSON object keys). Wrapping them prevents a channel id from being
//! passed where a universe id is expected.

use serde::{Deserialize, Serialize};

/// Generates a string-backed newtype identifier with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier string.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is blank (empty or whitespace only).
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

define_id! {
    /// Identifier of a Roblox universe (the "game" that owns places).
    UniverseId
}

define_id! {
    /// Identifier of a Discord channel announcements are posted to.
    ChannelId
}

impl UniverseId {
    /// Whether the identifier is a plain decimal number, as the catalog
    /// API requires.
    pub fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

/// Identifier of a single place (sub-page) inside a universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(pub u64);

impl PlaceId {
    /// Return the inner numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for PlaceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PlaceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
