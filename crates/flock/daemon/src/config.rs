//! Configuration for flock-daemon

use flock_engine::DriverConfig;
use flock_types::{ChannelId, FlockPolicy, Odds, ServerId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path of the credentials file
    #[serde(default = "default_credentials_path")]
    pub credentials: PathBuf,

    /// Tick cadence and startup waits
    #[serde(default)]
    pub driver: DriverSettings,

    /// Flocking odds and cooldown
    #[serde(default)]
    pub policy: FlockPolicy,

    /// In-process voice directory topology and simulated humans
    #[serde(default)]
    pub playground: PlaygroundConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Fixed seed for the flock's random source; entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            credentials: default_credentials_path(),
            driver: DriverSettings::default(),
            policy: FlockPolicy::default(),
            playground: PlaygroundConfig::default(),
            logging: LoggingConfig::default(),
            seed: None,
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Milliseconds between ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Delay units passed to each tick
    #[serde(default = "default_tick_delay")]
    pub tick_delay: u64,

    /// Milliseconds between readiness polls
    #[serde(default = "default_ready_poll")]
    pub ready_poll_ms: u64,

    /// Give up waiting for readiness after this many seconds; wait forever
    /// when unset
    #[serde(default)]
    pub ready_timeout_secs: Option<u64>,

    /// Buffered voice events before the forwarder waits
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            tick_delay: default_tick_delay(),
            ready_poll_ms: default_ready_poll(),
            ready_timeout_secs: None,
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

impl DriverSettings {
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            tick_delay: self.tick_delay,
        }
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_secs.map(Duration::from_secs)
    }
}

/// Playground topology
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundConfig {
    /// Servers every bird is a member of
    #[serde(default = "default_servers")]
    pub servers: Vec<PlaygroundServer>,

    /// Number of simulated humans
    #[serde(default = "default_humans")]
    pub humans: usize,

    /// Milliseconds between simulated human steps
    #[serde(default = "default_human_interval")]
    pub tick_interval_ms: u64,

    /// Chance that a given human moves on a step
    #[serde(default = "default_human_move_odds")]
    pub human_move_odds: Odds,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            humans: default_humans(),
            tick_interval_ms: default_human_interval(),
            human_move_odds: default_human_move_odds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundServer {
    pub id: ServerId,
    pub name: String,
    #[serde(default)]
    pub channels: Vec<PlaygroundChannel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundChannel {
    pub id: ChannelId,
    pub name: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_tick_delay() -> u64 {
    1
}

fn default_ready_poll() -> u64 {
    250
}

fn default_inbox_capacity() -> usize {
    256
}

fn default_servers() -> Vec<PlaygroundServer> {
    let channel = |id, name: &str| PlaygroundChannel {
        id: ChannelId::new(id),
        name: name.to_string(),
    };
    vec![PlaygroundServer {
        id: ServerId::new(1),
        name: "Aviary".to_string(),
        channels: vec![
            channel(101, "Lounge"),
            channel(102, "Gaming"),
            channel(103, "Music"),
        ],
    }]
}

fn default_humans() -> usize {
    6
}

fn default_human_interval() -> u64 {
    1000
}

fn default_human_move_odds() -> Odds {
    Odds::one_in(15)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the file if given, then `BIRDS_`
    /// environment variables (`BIRDS_DRIVER__TICK_INTERVAL_MS=500`)
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BIRDS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<(), String> {
        self.policy.validate().map_err(|e| e.to_string())?;
        self.playground
            .human_move_odds
            .validate("human_move_odds")
            .map_err(|e| e.to_string())?;

        if self.driver.tick_interval_ms == 0 {
            return Err("driver.tick_interval_ms must be positive".to_string());
        }
        if self.driver.ready_poll_ms == 0 {
            return Err("driver.ready_poll_ms must be positive".to_string());
        }
        if self.driver.inbox_capacity == 0 {
            return Err("driver.inbox_capacity must be positive".to_string());
        }
        if self.playground.tick_interval_ms == 0 {
            return Err("playground.tick_interval_ms must be positive".to_string());
        }
        if self.playground.servers.is_empty() {
            return Err("playground needs at least one server".to_string());
        }
        Ok(())
    }
}
