//! Server State - the per-server flocking state machine
//!
//! A server either has no target or targets one voice channel. Each tick the
//! state machine may adopt or drop a target (rarely, and only once the flock
//! has been still for a while), then samples every bird independently: a
//! sampled bird moves one step toward the target, or leaves when there is
//! none. Keeping the target draw apart from the per-bird draw makes birds
//! trickle in one by one instead of moving as a block.
//!
//! A tick is split into [`ServerState::plan`], which makes every random
//! decision, and [`ServerState::execute`], which performs the network calls.

use crate::bird::Bird;
use crate::channel_goal::ChannelGoal;
use crate::random::RandomSource;
use flock_types::{ChannelId, FlockPolicy, Guild, ServerId, VoiceChannel};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One bird movement decided during planning
#[derive(Debug, Clone)]
pub enum Flight {
    /// Leave a channel, with nowhere to go
    Depart { bird: Arc<Bird>, from: ChannelId },
    /// Join the target from outside any channel
    Arrive { bird: Arc<Bird>, to: ChannelId },
    /// Leave one channel, then join the target
    Relocate {
        bird: Arc<Bird>,
        from: ChannelId,
        to: ChannelId,
    },
}

pub struct ServerState {
    guild: Guild,
    goals: BTreeMap<ChannelId, ChannelGoal>,
    /// Always a key of `goals` when set
    target: Option<ChannelId>,
    ticks_since_last_move: u64,
    policy: FlockPolicy,
}

impl ServerState {
    pub fn new(guild: Guild, channels: Vec<VoiceChannel>, policy: FlockPolicy) -> Self {
        let goals = channels
            .into_iter()
            .map(|channel| (channel.id, ChannelGoal::new(channel)))
            .collect();

        Self {
            guild,
            goals,
            target: None,
            // no move has happened yet
            ticks_since_last_move: policy.cooldown_floor,
            policy,
        }
    }

    pub fn id(&self) -> ServerId {
        self.guild.id
    }

    pub fn guild(&self) -> &Guild {
        &self.guild
    }

    pub fn target(&self) -> Option<ChannelId> {
        self.target
    }

    pub fn ticks_since_last_move(&self) -> u64 {
        self.ticks_since_last_move
    }

    pub fn goal(&self, channel: ChannelId) -> Option<&ChannelGoal> {
        self.goals.get(&channel)
    }

    pub fn goals(&self) -> impl Iterator<Item = &ChannelGoal> {
        self.goals.values()
    }

    /// Whether `bird` is a member of this server
    pub fn owns_bird(&self, bird: &Bird) -> bool {
        bird.is_member_of(self.guild.id)
    }

    /// The channel `bird` is parked in, from local records only
    pub fn locate(&self, bird: &Bird) -> Option<ChannelId> {
        self.goals
            .values()
            .find(|goal| goal.is_occupied_by(bird))
            .map(ChannelGoal::id)
    }

    /// Total birds parked across all channels
    pub fn parked_count(&self) -> usize {
        self.goals.values().map(|goal| goal.parked().count()).sum()
    }

    /// Refresh occupancy of every channel
    pub async fn refresh_all(&mut self, flock: &[Arc<Bird>]) {
        let Some(observer) = observer(flock) else {
            debug!(server = %self.guild.id, "No ready bird to read rosters with");
            return;
        };
        for goal in self.goals.values_mut() {
            goal.refresh_occupancy(observer, flock).await;
        }
    }

    /// Refresh one channel's occupancy. Channels this server does not track
    /// (text channels, channels created after startup) are ignored.
    pub async fn record_occupancy_change(&mut self, channel: ChannelId, flock: &[Arc<Bird>]) {
        let Some(goal) = self.goals.get_mut(&channel) else {
            return;
        };
        let Some(observer) = observer(flock) else {
            debug!(server = %self.guild.id, "No ready bird to read rosters with");
            return;
        };
        goal.refresh_occupancy(observer, flock).await;
    }

    /// Park birds that the directory already sees connected, e.g. after a
    /// restart
    pub(crate) fn adopt_connected(&mut self, flock: &[Arc<Bird>]) {
        for bird in flock {
            if self.locate(bird).is_some() {
                continue;
            }
            let connected = bird.connected_channel(self.guild.id);
            if let Some(goal) = connected.and_then(|channel| self.goals.get_mut(&channel)) {
                goal.adopt(bird.id());
                info!(
                    bird = %bird.label(),
                    channel = %goal.id(),
                    "Bird already perched at startup"
                );
            }
        }
    }

    /// Make this tick's decisions.
    ///
    /// Draw order: the objective roll (only once the cooldown has elapsed),
    /// the channel pick when a target is adopted, then one movement roll per
    /// ready bird in flock order.
    pub fn plan(
        &mut self,
        delay: u64,
        rng: &mut dyn RandomSource,
        flock: &[Arc<Bird>],
    ) -> Vec<Flight> {
        self.ticks_since_last_move = self.ticks_since_last_move.saturating_add(delay);

        if self.ticks_since_last_move >= self.policy.cooldown_floor {
            self.reconsider_target(rng);
        }

        let mut flights = Vec::new();
        for bird in flock.iter().filter(|bird| bird.is_ready()) {
            if !rng.roll(self.policy.move_odds) {
                continue;
            }

            let bird = Arc::clone(bird);
            let flight = match (self.target, self.locate(&bird)) {
                (None, Some(from)) => Some(Flight::Depart { bird, from }),
                (Some(to), None) => Some(Flight::Arrive { bird, to }),
                (Some(to), Some(from)) if from != to => Some(Flight::Relocate { bird, from, to }),
                _ => None,
            };
            flights.extend(flight);
        }
        flights
    }

    fn reconsider_target(&mut self, rng: &mut dyn RandomSource) {
        if !rng.roll(self.policy.objective_odds) {
            return;
        }

        match self.target {
            None => {
                let occupied: Vec<&ChannelGoal> =
                    self.goals.values().filter(|goal| goal.is_occupied()).collect();
                if occupied.is_empty() {
                    debug!(server = %self.guild.id, "Nothing to flock toward");
                    return;
                }
                if let Some(goal) = occupied.get(rng.pick(occupied.len())) {
                    info!(
                        server = %self.guild.id,
                        channel = %goal.id(),
                        name = %goal.channel().name,
                        occupants = goal.occupant_count(),
                        "Flock target set"
                    );
                    self.target = Some(goal.id());
                }
            }
            Some(current) => {
                let deserted = self
                    .goals
                    .get(&current)
                    .map_or(true, |goal| !goal.is_occupied());
                if deserted {
                    info!(server = %self.guild.id, channel = %current, "Flock target deserted");
                    self.target = None;
                }
            }
        }
    }

    /// Perform planned flights in order. A failed flight is logged by the
    /// channel goal and does not stop the rest.
    pub async fn execute(&mut self, flights: Vec<Flight>) {
        for flight in flights {
            let moved = match flight {
                Flight::Depart { bird, from } => self.depart(&bird, from).await,
                Flight::Arrive { bird, to } => self.arrive(&bird, to).await,
                Flight::Relocate { bird, from, to } => {
                    let left = self.depart(&bird, from).await;
                    if left {
                        self.arrive(&bird, to).await;
                    }
                    left
                }
            };
            if moved {
                self.ticks_since_last_move = 0;
            }
        }
    }

    /// Plan and execute one tick
    pub async fn evaluate(&mut self, delay: u64, rng: &mut dyn RandomSource, flock: &[Arc<Bird>]) {
        let flights = self.plan(delay, rng, flock);
        self.execute(flights).await;
    }

    /// A human disturbed `channel`.
    ///
    /// If it is the target, the target may be dropped. Each bird parked
    /// there may be forced out immediately.
    pub async fn perturb(&mut self, channel: ChannelId, rng: &mut dyn RandomSource, flock: &[Arc<Bird>]) {
        let Some(goal) = self.goals.get(&channel) else {
            return;
        };
        let parked: Vec<Arc<Bird>> = flock
            .iter()
            .filter(|bird| goal.is_occupied_by(bird))
            .cloned()
            .collect();

        if self.target == Some(channel) && rng.roll(self.policy.target_scatter_odds) {
            info!(server = %self.guild.id, channel = %channel, "Flock startled off its target");
            self.target = None;
        }

        for bird in parked {
            if !rng.roll(self.policy.bird_scatter_odds) {
                continue;
            }
            if self.depart(&bird, channel).await {
                self.ticks_since_last_move = 0;
            }
        }
    }

    async fn depart(&mut self, bird: &Bird, from: ChannelId) -> bool {
        match self.goals.get_mut(&from) {
            Some(goal) if goal.is_occupied_by(bird) => goal.attempt_leave(bird).await,
            _ => false,
        }
    }

    async fn arrive(&mut self, bird: &Bird, to: ChannelId) -> bool {
        if let Some(current) = self.locate(bird) {
            debug!(bird = %bird.label(), channel = %current, "Bird already perched elsewhere");
            return false;
        }
        match self.goals.get_mut(&to) {
            Some(goal) => goal.attempt_join(bird).await,
            None => false,
        }
    }
}

fn observer(flock: &[Arc<Bird>]) -> Option<&Bird> {
    flock.iter().find(|bird| bird.is_ready()).map(Arc::as_ref)
}
