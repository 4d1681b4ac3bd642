//! Flock Engine - owns every server state and every bird
//!
//! The engine is the single entry point for ticks and voice events. Nothing
//! past these entry points returns an error: failures inside a tick or an
//! event are logged where they happen and the flock carries on.

use crate::bird::Bird;
use crate::driver::FlockEvent;
use crate::random::RandomSource;
use crate::server_state::ServerState;
use flock_types::{
    ChannelId, FlockError, FlockPolicy, FlockResult, Guild, ServerId, VoiceStateChange,
};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct FlockEngine {
    /// In credential order
    birds: Vec<Arc<Bird>>,
    servers: BTreeMap<ServerId, ServerState>,
    policy: FlockPolicy,
    rng: Box<dyn RandomSource>,
}

impl FlockEngine {
    pub fn new(
        birds: Vec<Arc<Bird>>,
        policy: FlockPolicy,
        rng: Box<dyn RandomSource>,
    ) -> FlockResult<Self> {
        if birds.is_empty() {
            return Err(FlockError::NoCredentials);
        }
        policy.validate()?;

        Ok(Self {
            birds,
            servers: BTreeMap::new(),
            policy,
            rng,
        })
    }

    /// Start authentication for every bird concurrently.
    ///
    /// Returns the number of attempts the directory accepted. Readiness is
    /// not awaited here; see [`FlockEngine::await_ready`].
    pub async fn connect_all(&self) -> FlockResult<usize> {
        let attempts = join_all(
            self.birds
                .iter()
                .map(|bird| async move { (bird, bird.connect().await) }),
        )
        .await;

        let mut connected = 0;
        for (bird, result) in attempts {
            match result {
                Ok(()) => {
                    info!(bird = %bird.label(), "Bird connecting");
                    connected += 1;
                }
                Err(e) => warn!(bird = %bird.label(), error = %e, "Bird failed to connect"),
            }
        }

        if connected == 0 {
            return Err(FlockError::NoBirdConnected);
        }
        Ok(connected)
    }

    /// Poll until at least one bird is ready. Partial availability is enough
    /// to start.
    pub async fn await_ready(&self, poll: Duration, timeout: Option<Duration>) -> FlockResult<usize> {
        let wait = async {
            let mut interval = tokio::time::interval(poll);
            loop {
                interval.tick().await;
                let ready = self.ready_birds().count();
                if ready > 0 {
                    info!(ready, total = self.birds.len(), "Flock ready");
                    return ready;
                }
                debug!("Waiting for a bird to become ready");
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| FlockError::ReadyTimeout(limit)),
            None => Ok(wait.await),
        }
    }

    /// Build one server state per distinct server any ready bird belongs to,
    /// and take the initial occupancy snapshot. Servers already built are
    /// left alone. Returns the number of servers tracked.
    pub async fn build_server_states(&mut self) -> usize {
        let mut guilds: BTreeMap<ServerId, Guild> = BTreeMap::new();
        for bird in self.ready_birds() {
            for guild in bird.servers() {
                guilds.entry(guild.id).or_insert(guild);
            }
        }

        for (id, guild) in guilds {
            if self.servers.contains_key(&id) {
                continue;
            }
            let flock = owned_by(&self.birds, id);
            let Some(observer) = flock.iter().find(|bird| bird.is_ready()) else {
                continue;
            };
            let channels = match observer.voice_channels(id).await {
                Ok(channels) => channels,
                Err(e) => {
                    warn!(server = %id, error = %e, "Could not list voice channels");
                    continue;
                }
            };

            let mut state = ServerState::new(guild, channels, self.policy.clone());
            state.refresh_all(&flock).await;
            state.adopt_connected(&flock);
            info!(
                server = %id,
                name = %state.guild().name,
                channels = state.goals().count(),
                birds = flock.len(),
                "Server state built"
            );
            self.servers.insert(id, state);
        }

        self.servers.len()
    }

    /// Advance every server by `delay` time units.
    ///
    /// Decisions are drawn server by server from the one random source;
    /// the resulting moves then run concurrently across servers.
    pub async fn tick(&mut self, delay: u64) {
        let Self {
            birds, servers, rng, ..
        } = self;

        let mut moves = Vec::with_capacity(servers.len());
        for state in servers.values_mut() {
            let flock = owned_by(birds, state.id());
            let flights = state.plan(delay, rng.as_mut(), &flock);
            if !flights.is_empty() {
                moves.push(state.execute(flights));
            }
        }
        join_all(moves).await;
    }

    /// Refresh one channel's occupancy. Unknown servers and channels are
    /// ignored.
    pub async fn on_occupancy_changed(&mut self, server: ServerId, channel: ChannelId) {
        let flock = owned_by(&self.birds, server);
        if let Some(state) = self.servers.get_mut(&server) {
            state.record_occupancy_change(channel, &flock).await;
        }
    }

    /// A human disturbed `channel`. Unknown servers and channels are ignored.
    pub async fn on_perturbed(&mut self, server: ServerId, channel: ChannelId) {
        let flock = owned_by(&self.birds, server);
        if let Some(state) = self.servers.get_mut(&server) {
            state.perturb(channel, self.rng.as_mut(), &flock).await;
        }
    }

    /// Derive occupancy refreshes, and perturbations for human users, from a
    /// raw voice-state change.
    pub async fn on_voice_state_changed(&mut self, change: VoiceStateChange) {
        if !self.servers.contains_key(&change.server) {
            return;
        }

        let human = !change.is_bot && !self.birds.iter().any(|bird| bird.identity_equals(change.user));
        debug!(
            server = %change.server,
            user = %change.user,
            human,
            lag_ms = change.age().num_milliseconds(),
            "Voice state changed"
        );
        for channel in change.channels() {
            self.on_occupancy_changed(change.server, channel).await;
            if human {
                self.on_perturbed(change.server, channel).await;
            }
        }
    }

    pub async fn handle(&mut self, event: FlockEvent) {
        match event {
            FlockEvent::VoiceStateChanged(change) => self.on_voice_state_changed(change).await,
            FlockEvent::OccupancyChanged { server, channel } => {
                self.on_occupancy_changed(server, channel).await
            }
            FlockEvent::Perturbed { server, channel } => self.on_perturbed(server, channel).await,
        }
    }

    pub fn server(&self, id: ServerId) -> Option<&ServerState> {
        self.servers.get(&id)
    }

    pub fn servers(&self) -> impl Iterator<Item = &ServerState> {
        self.servers.values()
    }

    pub fn birds(&self) -> &[Arc<Bird>] {
        &self.birds
    }

    pub fn ready_birds(&self) -> impl Iterator<Item = &Arc<Bird>> {
        self.birds.iter().filter(|bird| bird.is_ready())
    }

    pub fn policy(&self) -> &FlockPolicy {
        &self.policy
    }
}

/// Birds belonging to `server`, recomputed on every call so membership
/// changes show up without bookkeeping
fn owned_by(birds: &[Arc<Bird>], server: ServerId) -> Vec<Arc<Bird>> {
    birds
        .iter()
        .filter(|bird| bird.is_member_of(server))
        .cloned()
        .collect()
}
