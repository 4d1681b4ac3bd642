//! Flock Types - Core types for the flock coordination engine
//!
//! A flock is a set of automated chat identities ("birds") that drift between
//! the voice channels of one or more servers. This crate holds everything the
//! engine and its collaborators exchange, with no runtime attached:
//!
//! - **Identifiers**: snowflake newtypes for servers, channels and users, plus
//!   the engine-local [`BirdId`]
//! - **Directory records**: what the voice directory service reports about
//!   guilds, channels, rosters and voice-state changes
//! - **Policy**: the odds and cooldown that shape flocking behaviour
//! - **Errors**: the voice-operation and engine error taxonomy

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod directory;
pub mod error;
pub mod ids;
pub mod policy;

pub use directory::{Guild, RosterMember, VoiceChannel, VoiceStateChange};
pub use error::{FlockError, FlockResult, VoiceError, VoiceResult};
pub use ids::{BirdId, ChannelId, ServerId, UserId};
pub use policy::{FlockPolicy, Odds};
