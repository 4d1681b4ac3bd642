//! Strongly-typed identifiers for flock entities
//!
//! Server, channel and user ids are the platform's 64-bit snowflakes wrapped
//! in newtypes so they cannot be mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

snowflake_id!(
    /// Identifier of a server (guild)
    ServerId,
    "server"
);

snowflake_id!(
    /// Identifier of a voice channel
    ChannelId,
    "channel"
);

snowflake_id!(
    /// Identifier of a platform account, human or bot
    UserId,
    "user"
);

/// Engine-local identity of a bird
///
/// Assigned from the bird's position in the credential list, so a bird is
/// identifiable before it has authenticated and learned its [`UserId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BirdId(usize);

impl BirdId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BirdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bird:{}", self.0)
    }
}
