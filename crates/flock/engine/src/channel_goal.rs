//! Channel Goal - cached state of one voice channel
//!
//! Tracks how many humans occupy the channel and which birds the engine has
//! parked there. `parked` is the single source of truth for "where is this
//! bird": it changes only after the directory confirmed a join or leave.

use crate::bird::Bird;
use flock_types::{BirdId, ChannelId, VoiceChannel};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ChannelGoal {
    channel: VoiceChannel,
    /// Humans only
    occupant_count: usize,
    parked: BTreeSet<BirdId>,
}

impl ChannelGoal {
    pub fn new(channel: VoiceChannel) -> Self {
        Self {
            channel,
            occupant_count: 0,
            parked: BTreeSet::new(),
        }
    }

    pub fn channel(&self) -> &VoiceChannel {
        &self.channel
    }

    pub fn id(&self) -> ChannelId {
        self.channel.id
    }

    pub fn occupant_count(&self) -> usize {
        self.occupant_count
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant_count > 0
    }

    pub fn parked(&self) -> impl Iterator<Item = BirdId> + '_ {
        self.parked.iter().copied()
    }

    pub fn is_occupied_by(&self, bird: &Bird) -> bool {
        self.parked.contains(&bird.id())
    }

    /// Recount human occupants from the live roster, as seen by `observer`.
    ///
    /// Bots, and any account that is one of `flock`, are excluded. On a
    /// roster failure the previous count is kept.
    pub async fn refresh_occupancy(&mut self, observer: &Bird, flock: &[Arc<Bird>]) -> usize {
        match observer.roster(self.channel.id).await {
            Ok(roster) => {
                let humans = roster
                    .iter()
                    .filter(|member| !member.is_bot)
                    .filter(|member| !flock.iter().any(|b| b.identity_equals(member.user)))
                    .count();
                if humans != self.occupant_count {
                    debug!(
                        channel = %self.channel.id,
                        name = %self.channel.name,
                        from = self.occupant_count,
                        to = humans,
                        "Occupancy changed"
                    );
                }
                self.occupant_count = humans;
            }
            Err(e) => {
                warn!(
                    channel = %self.channel.id,
                    bird = %observer.label(),
                    error = %e,
                    "Failed to read channel roster"
                );
            }
        }
        self.occupant_count
    }

    /// Best-effort join. Records the bird as parked only on success; never
    /// retries.
    pub async fn attempt_join(&mut self, bird: &Bird) -> bool {
        match bird.join(&self.channel).await {
            Ok(()) => {
                self.parked.insert(bird.id());
                info!(
                    bird = %bird.label(),
                    channel = %self.channel.id,
                    name = %self.channel.name,
                    "Bird landed"
                );
                true
            }
            Err(e) => {
                warn!(
                    bird = %bird.label(),
                    channel = %self.channel.id,
                    error = %e,
                    "Bird failed to join channel"
                );
                false
            }
        }
    }

    /// Best-effort leave. Unparks the bird only on success; never retries.
    pub async fn attempt_leave(&mut self, bird: &Bird) -> bool {
        match bird.leave(&self.channel).await {
            Ok(()) => {
                self.parked.remove(&bird.id());
                info!(
                    bird = %bird.label(),
                    channel = %self.channel.id,
                    name = %self.channel.name,
                    "Bird took off"
                );
                true
            }
            Err(e) => {
                warn!(
                    bird = %bird.label(),
                    channel = %self.channel.id,
                    error = %e,
                    "Bird failed to leave channel"
                );
                false
            }
        }
    }

    /// Record a bird found already connected at startup
    pub(crate) fn adopt(&mut self, bird: BirdId) {
        self.parked.insert(bird);
    }
}
