//! In-memory voice directory for development and testing
//!
//! Models just enough of a chat platform for the flock to live in: guilds,
//! voice channels, bot and human accounts, one voice connection per account
//! and server, and a feed of voice-state changes.

use crate::session::{Credential, VoiceDirectory, VoiceSession};
use async_trait::async_trait;
use flock_types::{
    ChannelId, Guild, RosterMember, ServerId, UserId, VoiceChannel, VoiceError, VoiceResult,
    VoiceStateChange,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;
const FIRST_USER_ID: u64 = 1_000;

#[derive(Debug, Clone)]
struct Account {
    name: String,
    is_bot: bool,
    guilds: BTreeSet<ServerId>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    guilds: BTreeMap<ServerId, Guild>,
    channels: BTreeMap<ChannelId, VoiceChannel>,
    accounts: BTreeMap<UserId, Account>,
    tokens: HashMap<String, UserId>,
    presence: HashMap<(UserId, ServerId), ChannelId>,
    denied: HashSet<(UserId, ChannelId)>,
    next_user: u64,
}

impl DirectoryState {
    fn allocate_user(&mut self, name: &str, is_bot: bool, guilds: &[ServerId]) -> UserId {
        let user = UserId::new(FIRST_USER_ID + self.next_user);
        self.next_user += 1;
        self.accounts.insert(
            user,
            Account {
                name: name.to_string(),
                is_bot,
                guilds: guilds.iter().copied().collect(),
            },
        );
        user
    }

    fn is_bot(&self, user: UserId) -> bool {
        self.accounts.get(&user).is_some_and(|a| a.is_bot)
    }

    fn server_of(&self, channel: ChannelId) -> VoiceResult<ServerId> {
        self.channels
            .get(&channel)
            .map(|c| c.server)
            .ok_or(VoiceError::ChannelNotFound(channel))
    }

    fn change(
        &self,
        user: UserId,
        server: ServerId,
        before: Option<ChannelId>,
        after: Option<ChannelId>,
    ) -> VoiceStateChange {
        VoiceStateChange::new(server, user, self.is_bot(user), before, after)
    }

    fn occupants(&self, channel: ChannelId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .presence
            .iter()
            .filter(|(_, c)| **c == channel)
            .map(|((user, _), _)| *user)
            .collect();
        users.sort();
        users
    }
}

struct DirectoryInner {
    state: RwLock<DirectoryState>,
    events: broadcast::Sender<VoiceStateChange>,
}

impl DirectoryInner {
    fn publish(&self, changes: Vec<VoiceStateChange>) {
        for change in changes {
            // no subscribers is fine
            let _ = self.events.send(change);
        }
    }

    /// Connections in other servers are left alone; within the channel's
    /// server the account is moved.
    fn connect(&self, user: UserId, channel: ChannelId) -> VoiceResult<()> {
        let change = {
            let mut state = self.state.write();
            let server = state.server_of(channel)?;
            let account = state
                .accounts
                .get(&user)
                .ok_or_else(|| VoiceError::Gateway(format!("unknown account {user}")))?;
            if !account.guilds.contains(&server) {
                return Err(VoiceError::UnknownServer(server));
            }
            if state.denied.contains(&(user, channel)) {
                return Err(VoiceError::PermissionDenied(channel));
            }
            let before = state.presence.get(&(user, server)).copied();
            if before == Some(channel) {
                return Err(VoiceError::AlreadyConnected(channel));
            }
            state.presence.insert((user, server), channel);
            state.change(user, server, before, Some(channel))
        };
        self.publish(vec![change]);
        Ok(())
    }

    fn disconnect_from(&self, user: UserId, channel: ChannelId) -> VoiceResult<()> {
        let change = {
            let mut state = self.state.write();
            let server = state
                .server_of(channel)
                .map_err(|_| VoiceError::NotConnected(channel))?;
            if state.presence.get(&(user, server)) != Some(&channel) {
                return Err(VoiceError::NotConnected(channel));
            }
            state.presence.remove(&(user, server));
            state.change(user, server, Some(channel), None)
        };
        self.publish(vec![change]);
        Ok(())
    }
}

/// In-process voice directory
#[derive(Clone)]
pub struct InMemoryDirectory {
    inner: Arc<DirectoryInner>,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(DirectoryInner {
                state: RwLock::new(DirectoryState::default()),
                events,
            }),
        }
    }

    pub fn add_guild(&self, id: ServerId, name: impl Into<String>) {
        let mut state = self.inner.state.write();
        state.guilds.insert(id, Guild::new(id, name));
    }

    pub fn add_voice_channel(
        &self,
        server: ServerId,
        id: ChannelId,
        name: impl Into<String>,
    ) -> VoiceResult<()> {
        let mut state = self.inner.state.write();
        if !state.guilds.contains_key(&server) {
            return Err(VoiceError::UnknownServer(server));
        }
        state.channels.insert(id, VoiceChannel::new(id, server, name));
        Ok(())
    }

    /// Delete a channel, disconnecting everyone in it
    pub fn remove_channel(&self, channel: ChannelId) {
        let changes = {
            let mut state = self.inner.state.write();
            let Ok(server) = state.server_of(channel) else {
                return;
            };
            let occupants = state.occupants(channel);
            let changes: Vec<VoiceStateChange> = occupants
                .iter()
                .map(|user| state.change(*user, server, Some(channel), None))
                .collect();
            for user in occupants {
                state.presence.remove(&(user, server));
            }
            state.channels.remove(&channel);
            changes
        };
        self.inner.publish(changes);
    }

    /// Register a bot account reachable through `token`
    pub fn register_bot(&self, token: &str, name: &str, guilds: &[ServerId]) -> UserId {
        let mut state = self.inner.state.write();
        let user = state.allocate_user(name, true, guilds);
        state.tokens.insert(token.to_string(), user);
        user
    }

    /// Register a human account
    pub fn add_human(&self, name: &str, guilds: &[ServerId]) -> UserId {
        self.inner.state.write().allocate_user(name, false, guilds)
    }

    /// Refuse future joins of `user` into `channel`
    pub fn deny_join(&self, user: UserId, channel: ChannelId) {
        self.inner.state.write().denied.insert((user, channel));
    }

    /// Connect any account to a channel, moving it if connected elsewhere
    /// in the same server
    pub fn connect(&self, user: UserId, channel: ChannelId) -> VoiceResult<()> {
        self.inner.connect(user, channel)
    }

    /// Disconnect an account from whatever channel it is in on `server`
    pub fn disconnect(&self, user: UserId, server: ServerId) -> VoiceResult<Option<ChannelId>> {
        match self.presence(user, server) {
            Some(channel) => self.inner.disconnect_from(user, channel).map(|_| Some(channel)),
            None => Ok(None),
        }
    }

    /// Report a voice-state change that keeps the user in place on `server`,
    /// such as muting
    pub fn touch(&self, user: UserId, server: ServerId) -> VoiceResult<()> {
        let change = {
            let state = self.inner.state.read();
            let channel = state
                .presence
                .get(&(user, server))
                .copied()
                .ok_or_else(|| VoiceError::Gateway(format!("{user} is not in voice on {server}")))?;
            state.change(user, server, Some(channel), Some(channel))
        };
        self.inner.publish(vec![change]);
        Ok(())
    }

    /// The channel `user` is connected to on `server`
    pub fn presence(&self, user: UserId, server: ServerId) -> Option<ChannelId> {
        self.inner.state.read().presence.get(&(user, server)).copied()
    }

    pub fn occupants(&self, channel: ChannelId) -> Vec<UserId> {
        self.inner.state.read().occupants(channel)
    }

    pub fn humans(&self) -> Vec<UserId> {
        let state = self.inner.state.read();
        state
            .accounts
            .iter()
            .filter(|(_, account)| !account.is_bot)
            .map(|(user, _)| *user)
            .collect()
    }

    pub fn account_name(&self, user: UserId) -> Option<String> {
        let state = self.inner.state.read();
        state.accounts.get(&user).map(|a| a.name.clone())
    }

    /// Voice channels visible to `user`
    pub fn channels_for(&self, user: UserId) -> Vec<VoiceChannel> {
        let state = self.inner.state.read();
        let Some(account) = state.accounts.get(&user) else {
            return Vec::new();
        };
        state
            .channels
            .values()
            .filter(|c| account.guilds.contains(&c.server))
            .cloned()
            .collect()
    }
}

impl VoiceDirectory for InMemoryDirectory {
    fn open_session(&self) -> Arc<dyn VoiceSession> {
        Arc::new(MemorySession {
            inner: self.inner.clone(),
            user: RwLock::new(None),
        })
    }

    fn voice_events(&self) -> broadcast::Receiver<VoiceStateChange> {
        self.inner.events.subscribe()
    }
}

/// A session opened against an [`InMemoryDirectory`]
pub struct MemorySession {
    inner: Arc<DirectoryInner>,
    user: RwLock<Option<UserId>>,
}

impl MemorySession {
    fn user(&self) -> VoiceResult<UserId> {
        (*self.user.read()).ok_or(VoiceError::NotReady)
    }
}

#[async_trait]
impl VoiceSession for MemorySession {
    async fn authenticate(&self, credential: &Credential) -> VoiceResult<()> {
        let user = self
            .inner
            .state
            .read()
            .tokens
            .get(credential.expose())
            .copied()
            .ok_or_else(|| VoiceError::Authentication("unknown token".to_string()))?;
        *self.user.write() = Some(user);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.user.read().is_some()
    }

    fn current_user_id(&self) -> Option<UserId> {
        *self.user.read()
    }

    fn guilds(&self) -> Vec<Guild> {
        let Ok(user) = self.user() else {
            return Vec::new();
        };
        let state = self.inner.state.read();
        let Some(account) = state.accounts.get(&user) else {
            return Vec::new();
        };
        account
            .guilds
            .iter()
            .filter_map(|id| state.guilds.get(id).cloned())
            .collect()
    }

    fn current_user_name(&self) -> Option<String> {
        let user = self.user().ok()?;
        let state = self.inner.state.read();
        state.accounts.get(&user).map(|a| a.name.clone())
    }

    fn connected_channel(&self, server: ServerId) -> Option<ChannelId> {
        let user = self.user().ok()?;
        self.inner.state.read().presence.get(&(user, server)).copied()
    }

    async fn voice_channels(&self, server: ServerId) -> VoiceResult<Vec<VoiceChannel>> {
        let user = self.user()?;
        let state = self.inner.state.read();
        let member = state
            .accounts
            .get(&user)
            .is_some_and(|a| a.guilds.contains(&server));
        if !member || !state.guilds.contains_key(&server) {
            return Err(VoiceError::UnknownServer(server));
        }
        Ok(state
            .channels
            .values()
            .filter(|c| c.server == server)
            .cloned()
            .collect())
    }

    async fn roster(&self, channel: ChannelId) -> VoiceResult<Vec<RosterMember>> {
        self.user()?;
        let state = self.inner.state.read();
        if !state.channels.contains_key(&channel) {
            return Err(VoiceError::ChannelNotFound(channel));
        }
        Ok(state
            .occupants(channel)
            .into_iter()
            .map(|user| RosterMember {
                user,
                is_bot: state.is_bot(user),
            })
            .collect())
    }

    async fn join_voice(&self, channel: ChannelId) -> VoiceResult<()> {
        let user = self.user()?;
        self.inner.connect(user, channel)
    }

    async fn leave_voice(&self, channel: ChannelId) -> VoiceResult<()> {
        let user = self.user()?;
        self.inner.disconnect_from(user, channel)
    }
}
