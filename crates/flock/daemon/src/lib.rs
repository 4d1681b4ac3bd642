//! Birds daemon library
//!
//! This module provides the pieces `birdsd` is assembled from:
//! - Configuration loading
//! - Credentials file parsing
//! - The playground voice directory and its simulated humans
//! - Server lifecycle: connect, wait for readiness, drive until shutdown

pub mod config;
pub mod credentials;
pub mod error;
pub mod playground;
pub mod server;

pub use config::DaemonConfig;
pub use credentials::load_credentials;
pub use error::{DaemonError, DaemonResult};
pub use playground::{HumanSimulation, Playground};
pub use server::Server;
