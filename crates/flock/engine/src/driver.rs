//! Driver - the fixed-cadence loop around a [`FlockEngine`]
//!
//! Voice events reach the engine through a [`FlockInbox`]; the driver is the
//! only task that touches the engine, so ticks and events never overlap.

use crate::engine::FlockEngine;
use flock_types::{ChannelId, ServerId, VoiceStateChange};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Work delivered to the engine between ticks
#[derive(Debug, Clone)]
pub enum FlockEvent {
    /// Raw change from the directory's voice event feed
    VoiceStateChanged(VoiceStateChange),
    OccupancyChanged { server: ServerId, channel: ChannelId },
    Perturbed { server: ServerId, channel: ChannelId },
}

/// Cloneable handle for posting events to the driver
#[derive(Debug, Clone)]
pub struct FlockInbox {
    tx: mpsc::Sender<FlockEvent>,
}

impl FlockInbox {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FlockEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Post an event. Returns false once the driver has gone away.
    pub async fn send(&self, event: FlockEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Pump a voice event feed into this inbox until either side closes
    pub fn forward(&self, mut feed: broadcast::Receiver<VoiceStateChange>) -> JoinHandle<()> {
        let inbox = self.clone();
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(change) => {
                        if !inbox.send(FlockEvent::VoiceStateChanged(change)).await {
                            debug!("Inbox closed, stopping voice event forwarding");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Voice event feed lagged; occupancy may be stale");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Voice event feed closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Driver settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Wall-clock time between ticks
    pub tick_interval: Duration,
    /// Delay passed to every tick
    pub tick_delay: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            tick_delay: 1,
        }
    }
}

pub struct FlockDriver {
    engine: FlockEngine,
    inbox: mpsc::Receiver<FlockEvent>,
    config: DriverConfig,
}

impl FlockDriver {
    pub fn new(engine: FlockEngine, inbox: mpsc::Receiver<FlockEvent>, config: DriverConfig) -> Self {
        Self {
            engine,
            inbox,
            config,
        }
    }

    /// Tick and handle events until `shutdown` turns true or its sender is
    /// dropped. A tick or event in progress always completes first.
    /// Returns the engine for inspection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> FlockEngine {
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inbox_open = true;
        let mut ticks: u64 = 0;

        info!(
            interval_ms = self.config.tick_interval.as_millis() as u64,
            servers = self.engine.servers().count(),
            "Flock driver started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break;
                    }
                }
                event = self.inbox.recv(), if inbox_open => match event {
                    Some(event) => self.engine.handle(event).await,
                    None => {
                        debug!("Inbox closed; ticking only");
                        inbox_open = false;
                    }
                },
                _ = ticker.tick() => {
                    self.engine.tick(self.config.tick_delay).await;
                    ticks += 1;
                }
            }
        }

        info!(ticks, "Flock driver stopped");
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bird::Bird;
    use crate::memory::InMemoryDirectory;
    use crate::random::ScriptedSource;
    use crate::session::{Credential, VoiceDirectory};
    use flock_types::{BirdId, FlockPolicy};
    use std::sync::Arc;

    const AVIARY: ServerId = ServerId::new(1);
    const PERCH: ChannelId = ChannelId::new(10);

    async fn engine(directory: &InMemoryDirectory) -> FlockEngine {
        directory.add_guild(AVIARY, "Aviary");
        directory.add_voice_channel(AVIARY, PERCH, "Perch").unwrap();
        directory.register_bot("sparrow", "sparrow", &[AVIARY]);
        let bird = Bird::new(
            BirdId::new(0),
            "sparrow",
            Credential::new("sparrow"),
            directory.open_session(),
        );
        let mut engine = FlockEngine::new(
            vec![Arc::new(bird)],
            FlockPolicy::default(),
            Box::new(ScriptedSource::new()),
        )
        .unwrap();
        engine.connect_all().await.unwrap();
        engine.build_server_states().await;
        engine
    }

    fn fast() -> DriverConfig {
        DriverConfig {
            tick_interval: Duration::from_millis(5),
            tick_delay: 1,
        }
    }

    #[tokio::test]
    async fn test_ticks_until_shutdown() {
        let directory = InMemoryDirectory::new();
        let engine = engine(&directory).await;
        let (_inbox, rx) = FlockInbox::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(FlockDriver::new(engine, rx, fast()).run(stop_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        let engine = handle.await.unwrap();

        let aviary = engine.server(AVIARY).unwrap();
        assert!(aviary.ticks_since_last_move() > engine.policy().cooldown_floor);
    }

    #[tokio::test]
    async fn test_already_shut_down() {
        let directory = InMemoryDirectory::new();
        let engine = engine(&directory).await;
        let (_inbox, rx) = FlockInbox::channel(8);
        let (_stop_tx, stop_rx) = watch::channel(true);

        let engine = FlockDriver::new(engine, rx, fast()).run(stop_rx).await;
        assert_eq!(
            engine.server(AVIARY).unwrap().ticks_since_last_move(),
            engine.policy().cooldown_floor
        );
    }

    #[tokio::test]
    async fn test_inbox_events_reach_engine() {
        let directory = InMemoryDirectory::new();
        let engine = engine(&directory).await;
        let (inbox, rx) = FlockInbox::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(FlockDriver::new(engine, rx, fast()).run(stop_rx));

        let human = directory.add_human("alice", &[AVIARY]);
        directory.connect(human, PERCH).unwrap();
        assert!(
            inbox
                .send(FlockEvent::OccupancyChanged {
                    server: AVIARY,
                    channel: PERCH,
                })
                .await
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        let engine = handle.await.unwrap();

        let perch = engine.server(AVIARY).unwrap().goal(PERCH).unwrap();
        assert_eq!(perch.occupant_count(), 1);
    }

    #[tokio::test]
    async fn test_forward_pumps_voice_events() {
        let directory = InMemoryDirectory::new();
        directory.add_guild(AVIARY, "Aviary");
        directory.add_voice_channel(AVIARY, PERCH, "Perch").unwrap();
        let human = directory.add_human("alice", &[AVIARY]);

        let (inbox, mut rx) = FlockInbox::channel(8);
        let forwarder = inbox.forward(directory.voice_events());
        directory.connect(human, PERCH).unwrap();

        match rx.recv().await {
            Some(FlockEvent::VoiceStateChanged(change)) => {
                assert_eq!(change.user, human);
                assert_eq!(change.after, Some(PERCH));
                assert!(!change.is_bot);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        drop(directory);
        forwarder.await.unwrap();
    }
}
