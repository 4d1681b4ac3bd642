//! End-to-end flocking scenarios against the in-memory directory

use flock_engine::{
    Bird, Credential, FlockEngine, FlockEvent, InMemoryDirectory, RandomSource, ScriptedSource,
    SeededSource, VoiceDirectory,
};
use flock_types::{BirdId, ChannelId, FlockPolicy, ServerId, UserId, VoiceStateChange};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;

const SERVER: ServerId = ServerId::new(1);
const A: ChannelId = ChannelId::new(10);
const B: ChannelId = ChannelId::new(11);
const ROOST: ServerId = ServerId::new(2);
const C: ChannelId = ChannelId::new(20);
const D: ChannelId = ChannelId::new(21);

/// A server with an empty channel and a crowded one
type Layout = (ServerId, ChannelId, ChannelId);

const ONE_SERVER: &[Layout] = &[(SERVER, A, B)];
const TWO_SERVERS: &[Layout] = &[(SERVER, A, B), (ROOST, C, D)];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("flock_engine=info")
        .with_test_writer()
        .try_init();
}

struct Aviary {
    layout: &'static [Layout],
    directory: InMemoryDirectory,
    humans: Vec<UserId>,
    events: broadcast::Receiver<VoiceStateChange>,
    engine: FlockEngine,
}

/// One server, channels A (empty) and B (`crowd` humans), `birds` birds
async fn aviary(birds: usize, crowd: usize, rng: Box<dyn RandomSource>) -> Aviary {
    flyway(ONE_SERVER, birds, crowd, rng).await
}

/// Every server in `layout` with its second channel holding `crowd` humans.
/// Birds and humans are members of every server.
async fn flyway(
    layout: &'static [Layout],
    birds: usize,
    crowd: usize,
    rng: Box<dyn RandomSource>,
) -> Aviary {
    init_tracing();
    let directory = InMemoryDirectory::new();
    let servers: Vec<ServerId> = layout.iter().map(|(server, _, _)| *server).collect();
    for &(server, empty, crowded) in layout {
        directory.add_guild(server, format!("server-{}", server.get()));
        directory.add_voice_channel(server, empty, "empty").unwrap();
        directory.add_voice_channel(server, crowded, "crowded").unwrap();
    }

    let mut humans = Vec::new();
    for index in 0..crowd {
        let human = directory.add_human(&format!("human-{index}"), &servers);
        for &(_, _, crowded) in layout {
            directory.connect(human, crowded).unwrap();
        }
        humans.push(human);
    }

    let flock = (0..birds)
        .map(|index| {
            let token = format!("token-{index}");
            directory.register_bot(&token, &format!("bird-{index}"), &servers);
            Arc::new(Bird::new(
                BirdId::new(index),
                format!("bird-{index}"),
                Credential::new(token),
                directory.open_session(),
            ))
        })
        .collect();

    let events = directory.voice_events();
    let mut engine = FlockEngine::new(flock, FlockPolicy::default(), rng).unwrap();
    engine.connect_all().await.unwrap();
    engine.build_server_states().await;

    Aviary {
        layout,
        directory,
        humans,
        events,
        engine,
    }
}

impl Aviary {
    async fn drain_events(&mut self) {
        while let Ok(change) = self.events.try_recv() {
            self.engine.handle(FlockEvent::VoiceStateChanged(change)).await;
        }
    }

    fn human_count(&self, channel: ChannelId) -> usize {
        let humans: BTreeSet<UserId> = self.humans.iter().copied().collect();
        self.directory
            .occupants(channel)
            .into_iter()
            .filter(|user| humans.contains(user))
            .count()
    }

    /// Move one human within one server: join the empty channel, join the
    /// crowded one, or leave voice
    fn wander(&self, human: usize, step: u8) {
        let user = self.humans[human % self.humans.len()];
        let (server, empty, crowded) = self.layout[usize::from(step / 3) % self.layout.len()];
        let _ = match step % 3 {
            0 => self.directory.connect(user, empty),
            1 => self.directory.connect(user, crowded),
            _ => self.directory.disconnect(user, server).map(|_| ()),
        };
    }

    /// Per server: each bird is parked in at most one channel, exactly where
    /// the directory sees it, and occupancy counts only humans.
    fn check_records(&self) -> Result<(), TestCaseError> {
        for &(server, empty, crowded) in self.layout {
            let state = self.engine.server(server).unwrap();
            for bird in self.engine.birds() {
                let parked_in = state.goals().filter(|goal| goal.is_occupied_by(bird)).count();
                prop_assert!(parked_in <= 1);
                prop_assert_eq!(state.locate(bird), bird.connected_channel(server));
            }
            for channel in [empty, crowded] {
                prop_assert_eq!(
                    state.goal(channel).unwrap().occupant_count(),
                    self.human_count(channel)
                );
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_target_then_join() {
    // tick 1: objective hit, pick B (the only occupied channel), bird stays
    // tick 2: objective miss, bird moves
    let rng = ScriptedSource::new()
        .with_rolls([true, false, false, true])
        .with_picks([0]);
    let mut aviary = aviary(1, 3, Box::new(rng)).await;

    aviary.engine.tick(1).await;
    let state = aviary.engine.server(SERVER).unwrap();
    assert_eq!(state.target(), Some(B));
    assert_eq!(state.parked_count(), 0);

    aviary.engine.tick(1).await;
    let state = aviary.engine.server(SERVER).unwrap();
    let bird = &aviary.engine.birds()[0];
    assert_eq!(state.locate(bird), Some(B));
    assert!(bird.is_in_channel(B));
}

#[tokio::test]
async fn test_flock_eventually_gathers() {
    let mut aviary = aviary(3, 2, Box::new(SeededSource::new(42))).await;

    let mut ticks = 0;
    while aviary.engine.server(SERVER).unwrap().parked_count() == 0 {
        assert!(ticks < 5_000, "no bird ever joined the occupied channel");
        aviary.engine.tick(1).await;
        aviary.drain_events().await;
        ticks += 1;
    }

    let state = aviary.engine.server(SERVER).unwrap();
    assert_eq!(state.target(), Some(B));
    assert!(state.goal(B).unwrap().parked().count() > 0);
    assert_eq!(state.goal(A).unwrap().parked().count(), 0);
    // birds are never counted as occupants
    assert_eq!(state.goal(B).unwrap().occupant_count(), 2);
}

#[tokio::test]
async fn test_unknown_channel_event_changes_nothing() {
    let mut aviary = aviary(2, 3, Box::new(SeededSource::new(7))).await;
    for _ in 0..50 {
        aviary.engine.tick(1).await;
    }
    let snapshot = |engine: &FlockEngine| {
        let state = engine.server(SERVER).unwrap();
        (
            state.target(),
            state.ticks_since_last_move(),
            state
                .goals()
                .map(|goal| (goal.occupant_count(), goal.parked().collect::<Vec<_>>()))
                .collect::<Vec<_>>(),
        )
    };
    let before = snapshot(&aviary.engine);

    for event in [
        FlockEvent::OccupancyChanged {
            server: SERVER,
            channel: ChannelId::new(404),
        },
        FlockEvent::Perturbed {
            server: SERVER,
            channel: ChannelId::new(404),
        },
        FlockEvent::OccupancyChanged {
            server: ServerId::new(404),
            channel: B,
        },
    ] {
        aviary.engine.handle(event).await;
    }

    assert_eq!(snapshot(&aviary.engine), before);
}

#[tokio::test]
async fn test_human_arrival_refreshes_occupancy() {
    // objective hit + pick B, both birds move
    let rng = ScriptedSource::new()
        .with_rolls([true, true, true])
        .with_picks([0]);
    let mut aviary = aviary(2, 1, Box::new(rng)).await;
    aviary.engine.tick(1).await;
    aviary.drain_events().await;
    assert_eq!(aviary.engine.server(SERVER).unwrap().parked_count(), 2);

    // scripted fallback is `false`: nothing scatters on this arrival
    let newcomer = aviary.directory.add_human("newcomer", &[SERVER]);
    aviary.humans.push(newcomer);
    aviary.directory.connect(newcomer, B).unwrap();
    aviary.drain_events().await;

    let state = aviary.engine.server(SERVER).unwrap();
    assert_eq!(state.goal(B).unwrap().occupant_count(), 2);
    assert_eq!(state.parked_count(), 2);
    assert_eq!(state.target(), Some(B));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However birds and humans move, local records agree with the directory
    #[test]
    fn flock_records_match_directory(
        seed in any::<u64>(),
        moves in prop::collection::vec((0usize..4, any::<u8>()), 0..40),
        ticks in 1usize..120,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let mut aviary = aviary(3, 4, Box::new(SeededSource::new(seed))).await;
            let mut moves = moves.into_iter();

            for _ in 0..ticks {
                aviary.engine.tick(1).await;
                if let Some((human, step)) = moves.next() {
                    aviary.wander(human, step);
                }
                aviary.drain_events().await;
                aviary.check_records()?;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Birds that belong to two servers hold one channel in each, and each
    /// server's records agree with the directory after every tick
    #[test]
    fn flock_records_match_directory_across_servers(
        seed in any::<u64>(),
        moves in prop::collection::vec((0usize..4, any::<u8>()), 0..60),
        ticks in 1usize..150,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let mut aviary = flyway(TWO_SERVERS, 3, 2, Box::new(SeededSource::new(seed))).await;
            let mut moves = moves.into_iter();

            for _ in 0..ticks {
                aviary.engine.tick(1).await;
                if let Some((human, step)) = moves.next() {
                    aviary.wander(human, step);
                }
                aviary.drain_events().await;
                aviary.check_records()?;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[tokio::test]
async fn test_birds_flock_in_both_servers_at_once() {
    let mut aviary = flyway(TWO_SERVERS, 2, 1, Box::new(SeededSource::new(5))).await;

    let mut ticks = 0;
    while TWO_SERVERS
        .iter()
        .any(|(server, _, _)| aviary.engine.server(*server).unwrap().parked_count() == 0)
    {
        assert!(ticks < 10_000, "a server never gathered a bird");
        aviary.engine.tick(1).await;
        aviary.drain_events().await;
        ticks += 1;
    }

    for &(server, _, crowded) in TWO_SERVERS {
        let state = aviary.engine.server(server).unwrap();
        for bird in aviary.engine.birds() {
            assert_eq!(state.locate(bird), bird.connected_channel(server));
        }
        assert!(state.goal(crowded).unwrap().parked().count() > 0);
    }
}
