//! Records reported by the voice directory service

use crate::ids::{ChannelId, ServerId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A server (guild) an identity belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: ServerId,
    pub name: String,
}

impl Guild {
    pub fn new(id: ServerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A voice channel, scoped to one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub server: ServerId,
    pub name: String,
}

impl VoiceChannel {
    pub fn new(id: ChannelId, server: ServerId, name: impl Into<String>) -> Self {
        Self {
            id,
            server,
            name: name.into(),
        }
    }
}

/// One account currently connected to a voice channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    pub user: UserId,
    pub is_bot: bool,
}

/// A user's voice state changed: joined, left, moved, or toggled something
/// (mute, deafen) while staying put.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateChange {
    pub server: ServerId,
    pub user: UserId,
    pub is_bot: bool,
    pub before: Option<ChannelId>,
    pub after: Option<ChannelId>,
    /// When the directory reported the change
    pub observed_at: DateTime<Utc>,
}

impl VoiceStateChange {
    pub fn new(
        server: ServerId,
        user: UserId,
        is_bot: bool,
        before: Option<ChannelId>,
        after: Option<ChannelId>,
    ) -> Self {
        Self {
            server,
            user,
            is_bot,
            before,
            after,
            observed_at: Utc::now(),
        }
    }

    /// Time since the directory reported the change, never negative
    pub fn age(&self) -> Duration {
        (Utc::now() - self.observed_at).max(Duration::zero())
    }

    /// Distinct channels touched by this change, `before` first.
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut channels = Vec::with_capacity(2);
        channels.extend(self.before);
        if let Some(after) = self.after {
            if !channels.contains(&after) {
                channels.push(after);
            }
        }
        channels
    }
}
