//! Contract of the external voice directory service
//!
//! Establishing a gateway connection, authenticating, and the raw join/leave
//! calls live behind these traits. The engine never reaches past them.

use async_trait::async_trait;
use flock_types::{
    ChannelId, Guild, RosterMember, ServerId, UserId, VoiceChannel, VoiceResult, VoiceStateChange,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A bot credential (token)
///
/// Debug output is redacted so credentials never reach the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// One identity's session with the voice directory
#[async_trait]
pub trait VoiceSession: Send + Sync {
    /// Log in and start the session. Readiness is reported separately
    /// through [`VoiceSession::is_ready`].
    async fn authenticate(&self, credential: &Credential) -> VoiceResult<()>;

    /// True once the session handshake has completed
    fn is_ready(&self) -> bool;

    /// Account id of this identity, known once ready
    fn current_user_id(&self) -> Option<UserId>;

    /// Servers this identity belongs to, as of now
    fn guilds(&self) -> Vec<Guild>;

    /// Account name of this identity, known once ready
    fn current_user_name(&self) -> Option<String>;

    /// The voice channel this identity is connected to in `server`, as the
    /// directory sees it. An identity holds at most one voice connection per
    /// server.
    fn connected_channel(&self, server: ServerId) -> Option<ChannelId>;

    /// Voice channels of a server
    async fn voice_channels(&self, server: ServerId) -> VoiceResult<Vec<VoiceChannel>>;

    /// Live roster of a voice channel
    async fn roster(&self, channel: ChannelId) -> VoiceResult<Vec<RosterMember>>;

    /// Connect to a voice channel
    async fn join_voice(&self, channel: ChannelId) -> VoiceResult<()>;

    /// Disconnect from a voice channel
    async fn leave_voice(&self, channel: ChannelId) -> VoiceResult<()>;
}

/// The voice directory service as a whole
pub trait VoiceDirectory: Send + Sync {
    /// Open a fresh, unauthenticated session
    fn open_session(&self) -> Arc<dyn VoiceSession>;

    /// Subscribe to voice-state changes across every server the directory
    /// can see. Each change is delivered once per subscriber.
    fn voice_events(&self) -> broadcast::Receiver<VoiceStateChange>;
}
