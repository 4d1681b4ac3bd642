//! Playground: an in-process voice directory with simulated humans
//!
//! Stands in for a live chat platform so the flock has servers to join and
//! humans to follow.

use crate::config::PlaygroundConfig;
use crate::error::{DaemonError, DaemonResult};
use flock_engine::{Bird, Credential, InMemoryDirectory, VoiceDirectory};
use flock_types::{BirdId, ChannelId, Odds, ServerId, UserId, VoiceResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

const HUMAN_NAMES: &[&str] = &[
    "ada", "grace", "linus", "ken", "barbara", "dennis", "margaret", "alan",
];

const BIRD_NAMES: &[&str] = &[
    "sparrow", "finch", "wren", "robin", "swift", "starling", "heron", "kestrel",
];

/// Playground topology: every configured token becomes a bot account that is
/// a member of every playground server
pub struct Playground {
    directory: InMemoryDirectory,
    humans: Vec<UserId>,
    channels: Vec<(ServerId, Vec<ChannelId>)>,
}

impl Playground {
    pub fn build(config: &PlaygroundConfig, credentials: &[Credential]) -> DaemonResult<Self> {
        let directory = InMemoryDirectory::new();
        let servers: Vec<ServerId> = config.servers.iter().map(|server| server.id).collect();

        let mut channels = Vec::new();
        for server in &config.servers {
            directory.add_guild(server.id, server.name.clone());
            let mut ids = Vec::with_capacity(server.channels.len());
            for channel in &server.channels {
                directory
                    .add_voice_channel(server.id, channel.id, channel.name.clone())
                    .map_err(|e| DaemonError::Config(format!("Playground channel: {e}")))?;
                ids.push(channel.id);
            }
            if !ids.is_empty() {
                channels.push((server.id, ids));
            }
        }

        for (index, credential) in credentials.iter().enumerate() {
            directory.register_bot(credential.expose(), &unique_name(BIRD_NAMES, index), &servers);
        }

        let humans = (0..config.humans)
            .map(|index| directory.add_human(&unique_name(HUMAN_NAMES, index), &servers))
            .collect();

        tracing::info!(
            servers = servers.len(),
            channels = channels.iter().map(|(_, ids)| ids.len()).sum::<usize>(),
            birds = credentials.len(),
            humans = config.humans,
            "Playground built"
        );

        Ok(Self {
            directory,
            humans,
            channels,
        })
    }

    pub fn directory(&self) -> &InMemoryDirectory {
        &self.directory
    }

    pub fn humans(&self) -> &[UserId] {
        &self.humans
    }

    /// One bird per credential, each with its own session. Birds go by a
    /// positional label until their account name is known.
    pub fn birds(&self, credentials: Vec<Credential>) -> Vec<Arc<Bird>> {
        credentials
            .into_iter()
            .enumerate()
            .map(|(index, credential)| {
                Arc::new(Bird::new(
                    BirdId::new(index),
                    bird_label(index),
                    credential,
                    self.directory.open_session(),
                ))
            })
            .collect()
    }

    pub fn simulation(&self, config: &PlaygroundConfig, seed: Option<u64>) -> HumanSimulation {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        HumanSimulation {
            directory: self.directory.clone(),
            humans: self.humans.clone(),
            channels: self.channels.clone(),
            step_interval: Duration::from_millis(config.tick_interval_ms),
            move_odds: config.human_move_odds,
            rng,
        }
    }
}

fn bird_label(index: usize) -> String {
    format!("bird-{index}")
}

fn unique_name(names: &[&str], index: usize) -> String {
    let name = names[index % names.len()];
    match index / names.len() {
        0 => name.to_string(),
        round => format!("{name}-{round}"),
    }
}

/// Simulated humans wandering between voice channels, with one voice
/// connection per server
pub struct HumanSimulation {
    directory: InMemoryDirectory,
    humans: Vec<UserId>,
    channels: Vec<(ServerId, Vec<ChannelId>)>,
    step_interval: Duration,
    move_odds: Odds,
    rng: StdRng,
}

impl HumanSimulation {
    /// Step until `shutdown` turns true or its sender is dropped. Returns the
    /// number of moves made.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut ticker = interval(self.step_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut moves = 0;

        tracing::info!(humans = self.humans.len(), "Human simulation started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => moves += self.step(),
            }
        }

        tracing::info!(moves, "Human simulation stopped");
        moves
    }

    /// Give every human one chance to join, hop or leave. Returns the number
    /// of moves made.
    pub fn step(&mut self) -> usize {
        if self.channels.is_empty() || self.move_odds.validate("human_move_odds").is_err() {
            return 0;
        }

        let mut moves = 0;
        for index in 0..self.humans.len() {
            let human = self.humans[index];
            if !self
                .rng
                .gen_ratio(self.move_odds.numerator, self.move_odds.denominator)
            {
                continue;
            }

            match self.wander(human) {
                Ok(()) => moves += 1,
                Err(e) => tracing::warn!(human = %human, error = %e, "Simulated move failed"),
            }
        }
        moves
    }

    fn wander(&mut self, human: UserId) -> VoiceResult<()> {
        let Some((server, channels)) = self.channels.choose(&mut self.rng) else {
            return Ok(());
        };
        let server = *server;
        let current = self.directory.presence(human, server);
        let name = self.directory.account_name(human).unwrap_or_default();

        // one in three humans already in voice just leaves
        if current.is_some() && self.rng.gen_ratio(1, 3) {
            tracing::debug!(human = %name, server = %server, "Human left voice");
            return self.directory.disconnect(human, server).map(|_| ());
        }

        let choices: Vec<ChannelId> = channels
            .iter()
            .copied()
            .filter(|channel| Some(*channel) != current)
            .collect();
        match choices.choose(&mut self.rng) {
            Some(&channel) => {
                tracing::debug!(human = %name, channel = %channel, "Human moved");
                self.directory.connect(human, channel)
            }
            None => self.directory.disconnect(human, server).map(|_| ()),
        }
    }
}
