//! A bird: one automated voice identity
//!
//! `Bird` wraps a [`VoiceSession`] and is the only component that touches the
//! voice directory. It makes no decisions of its own.

use crate::session::{Credential, VoiceSession};
use flock_types::{
    BirdId, ChannelId, Guild, RosterMember, ServerId, UserId, VoiceChannel, VoiceResult,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub struct Bird {
    id: BirdId,
    /// Replaced by the account name once ready
    label: RwLock<String>,
    credential: Credential,
    session: Arc<dyn VoiceSession>,
    /// Latched on the first ready observation
    ready: AtomicBool,
}

impl Bird {
    pub fn new(
        id: BirdId,
        label: impl Into<String>,
        credential: Credential,
        session: Arc<dyn VoiceSession>,
    ) -> Self {
        Self {
            id,
            label: RwLock::new(label.into()),
            credential,
            session,
            ready: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> BirdId {
        self.id
    }

    /// Name used in log lines: the account name once ready, the
    /// construction label before that
    pub fn label(&self) -> String {
        self.label.read().clone()
    }

    /// Start authenticating. Returns once the attempt has been issued; it
    /// does not wait for readiness.
    pub async fn connect(&self) -> VoiceResult<()> {
        debug!(bird = %self.label(), "Authenticating");
        self.session.authenticate(&self.credential).await?;
        self.is_ready();
        Ok(())
    }

    /// True once the session handshake completed. Never reverts.
    pub fn is_ready(&self) -> bool {
        if self.ready.load(Ordering::Acquire) {
            return true;
        }
        if self.session.is_ready() {
            self.ready.store(true, Ordering::Release);
            self.adopt_account_name();
            return true;
        }
        false
    }

    fn adopt_account_name(&self) {
        let Some(name) = self.session.current_user_name() else {
            return;
        };
        let mut label = self.label.write();
        if *label != name {
            debug!(bird = %label.as_str(), account = %name, "Bird ready");
            *label = name;
        }
    }

    /// Snapshot of server membership
    pub fn servers(&self) -> Vec<Guild> {
        self.session.guilds()
    }

    pub fn is_member_of(&self, server: ServerId) -> bool {
        self.servers().iter().any(|guild| guild.id == server)
    }

    /// Where the directory sees this identity connected in `server`
    pub fn connected_channel(&self, server: ServerId) -> Option<ChannelId> {
        self.session.connected_channel(server)
    }

    /// Whether the directory sees this identity connected to `channel`
    pub fn is_in_channel(&self, channel: ChannelId) -> bool {
        self.servers()
            .iter()
            .any(|guild| self.session.connected_channel(guild.id) == Some(channel))
    }

    pub fn identity_equals(&self, user: UserId) -> bool {
        self.session.current_user_id() == Some(user)
    }

    pub async fn join(&self, channel: &VoiceChannel) -> VoiceResult<()> {
        self.session.join_voice(channel.id).await
    }

    pub async fn leave(&self, channel: &VoiceChannel) -> VoiceResult<()> {
        self.session.leave_voice(channel.id).await
    }

    pub async fn voice_channels(&self, server: ServerId) -> VoiceResult<Vec<VoiceChannel>> {
        self.session.voice_channels(server).await
    }

    pub async fn roster(&self, channel: ChannelId) -> VoiceResult<Vec<RosterMember>> {
        self.session.roster(channel).await
    }
}

impl fmt::Debug for Bird {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bird")
            .field("id", &self.id)
            .field("label", &*self.label.read())
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDirectory;
    use crate::session::VoiceDirectory;

    fn directory() -> Arc<InMemoryDirectory> {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_guild(ServerId::new(1), "Aviary");
        directory.add_guild(ServerId::new(2), "Roost");
        directory
            .add_voice_channel(ServerId::new(1), ChannelId::new(10), "Perch")
            .unwrap();
        directory
            .add_voice_channel(ServerId::new(2), ChannelId::new(20), "Nest")
            .unwrap();
        directory.register_bot("token-a", "sparrow", &[ServerId::new(1)]);
        directory.register_bot("token-b", "wren", &[ServerId::new(1), ServerId::new(2)]);
        directory
    }

    #[tokio::test]
    async fn test_readiness_latches() {
        let directory = directory();
        let bird = Bird::new(
            BirdId::new(0),
            "sparrow",
            Credential::new("token-a"),
            directory.open_session(),
        );

        assert!(!bird.is_ready());
        assert!(bird.servers().is_empty());

        bird.connect().await.unwrap();
        assert!(bird.is_ready());
        assert!(bird.is_member_of(ServerId::new(1)));
        assert!(!bird.is_member_of(ServerId::new(2)));
    }

    #[tokio::test]
    async fn test_bad_credential_is_reported() {
        let directory = directory();
        let bird = Bird::new(
            BirdId::new(0),
            "sparrow",
            Credential::new("wrong"),
            directory.open_session(),
        );

        assert!(bird.connect().await.is_err());
        assert!(!bird.is_ready());
    }

    #[tokio::test]
    async fn test_channel_presence_comes_from_directory() {
        let directory = directory();
        let bird = Bird::new(
            BirdId::new(0),
            "sparrow",
            Credential::new("token-a"),
            directory.open_session(),
        );
        bird.connect().await.unwrap();

        let perch = VoiceChannel::new(ChannelId::new(10), ServerId::new(1), "Perch");
        assert!(!bird.is_in_channel(perch.id));

        bird.join(&perch).await.unwrap();
        assert!(bird.is_in_channel(perch.id));

        let user = bird.session.current_user_id().unwrap();
        assert!(bird.identity_equals(user));
        assert!(!bird.identity_equals(UserId::new(u64::MAX)));

        bird.leave(&perch).await.unwrap();
        assert!(!bird.is_in_channel(perch.id));
    }

    #[tokio::test]
    async fn test_label_becomes_account_name_once_ready() {
        let directory = directory();
        let bird = Bird::new(
            BirdId::new(3),
            "bird-3",
            Credential::new("token-b"),
            directory.open_session(),
        );
        assert_eq!(bird.label(), "bird-3");

        bird.connect().await.unwrap();
        assert_eq!(bird.label(), "wren");
        assert!(format!("{:?}", bird).contains("wren"));
    }

    #[tokio::test]
    async fn test_presence_is_tracked_per_server() {
        let directory = directory();
        let bird = Bird::new(
            BirdId::new(0),
            "wren",
            Credential::new("token-b"),
            directory.open_session(),
        );
        bird.connect().await.unwrap();

        let perch = VoiceChannel::new(ChannelId::new(10), ServerId::new(1), "Perch");
        let nest = VoiceChannel::new(ChannelId::new(20), ServerId::new(2), "Nest");
        bird.join(&perch).await.unwrap();
        bird.join(&nest).await.unwrap();

        assert!(bird.is_in_channel(perch.id));
        assert!(bird.is_in_channel(nest.id));
        assert_eq!(bird.connected_channel(ServerId::new(1)), Some(perch.id));
        assert_eq!(bird.connected_channel(ServerId::new(2)), Some(nest.id));

        bird.leave(&nest).await.unwrap();
        assert!(bird.is_in_channel(perch.id));
        assert_eq!(bird.connected_channel(ServerId::new(2)), None);
    }
}
