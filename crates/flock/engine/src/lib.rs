//! # Flock Engine
//!
//! Coordinates a flock of voice-chat identities ("birds") across servers.
//! Each server runs a small state machine: it occasionally adopts a voice
//! channel that has human occupants as its target, birds drift toward the
//! target one at a time, and a human disturbing a channel scatters the birds
//! parked there.
//!
//! # Architecture
//!
//! - [`Bird`]: one identity; the only thing that talks to the voice
//!   directory, through a [`VoiceSession`]
//! - [`ChannelGoal`]: cached human occupancy of one channel plus the birds
//!   parked in it
//! - [`ServerState`]: the per-server target decision and tick policy
//! - [`FlockEngine`]: owns every server and bird; ticks and event routing
//! - [`FlockDriver`]: fixed-cadence loop that interleaves ticks with inbox
//!   events until shutdown
//! - [`InMemoryDirectory`]: an in-process voice directory for tests and the
//!   playground
//!
//! # Key Invariants
//!
//! 1. A bird is parked in at most one channel per server
//! 2. Occupancy counts humans only; bots and birds never count
//! 3. A bird is recorded as parked strictly after its join succeeded, and
//!    unrecorded strictly after its leave succeeded
//! 4. Nothing inside a tick or an event handler propagates an error
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use flock_engine::{Bird, Credential, FlockEngine, InMemoryDirectory, SeededSource, VoiceDirectory};
//! use flock_types::{BirdId, ChannelId, FlockPolicy, ServerId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = Arc::new(InMemoryDirectory::new());
//! directory.add_guild(ServerId::new(1), "Aviary");
//! directory.add_voice_channel(ServerId::new(1), ChannelId::new(10), "Perch")?;
//! directory.register_bot("token-a", "sparrow", &[ServerId::new(1)]);
//!
//! let credential = Credential::new("token-a");
//! let bird = Bird::new(BirdId::new(0), "sparrow", credential, directory.open_session());
//!
//! let mut engine = FlockEngine::new(
//!     vec![Arc::new(bird)],
//!     FlockPolicy::default(),
//!     Box::new(SeededSource::new(7)),
//! )?;
//! engine.connect_all().await?;
//! engine.build_server_states().await;
//! engine.tick(1).await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod bird;
pub mod channel_goal;
pub mod driver;
pub mod engine;
pub mod memory;
pub mod random;
pub mod server_state;
pub mod session;

pub use bird::Bird;
pub use channel_goal::ChannelGoal;
pub use driver::{DriverConfig, FlockDriver, FlockEvent, FlockInbox};
pub use engine::FlockEngine;
pub use memory::{InMemoryDirectory, MemorySession};
pub use random::{RandomSource, ScriptedSource, SeededSource};
pub use server_state::{Flight, ServerState};
pub use session::{Credential, VoiceDirectory, VoiceSession};
