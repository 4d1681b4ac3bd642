//! Daemon lifecycle: connect the flock, wait for it, drive it until shutdown

use crate::config::DaemonConfig;
use crate::credentials::load_credentials;
use crate::error::{DaemonError, DaemonResult};
use crate::playground::Playground;
use flock_engine::{
    FlockDriver, FlockEngine, FlockInbox, RandomSource, SeededSource, VoiceDirectory,
};
use tokio::sync::watch;

/// Birds daemon server
pub struct Server {
    config: DaemonConfig,
    playground: Playground,
    engine: FlockEngine,
}

impl Server {
    /// Load credentials and assemble the flock. Nothing connects yet.
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate().map_err(DaemonError::Config)?;

        let credentials = load_credentials(&config.credentials)?;
        tracing::info!(
            path = %config.credentials.display(),
            birds = credentials.len(),
            "Credentials loaded"
        );

        let playground = Playground::build(&config.playground, &credentials)?;
        let birds = playground.birds(credentials);

        let rng: Box<dyn RandomSource> = match config.seed {
            Some(seed) => {
                tracing::info!(seed, "Using seeded random source");
                Box::new(SeededSource::new(seed))
            }
            None => Box::new(SeededSource::from_entropy()),
        };
        let engine = FlockEngine::new(birds, config.policy.clone(), rng)?;

        Ok(Self {
            config,
            playground,
            engine,
        })
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });

        self.run_until(shutdown_rx).await.map(|_| ())
    }

    /// Run until `shutdown` turns true, returning the engine's final state
    pub async fn run_until(self, mut shutdown: watch::Receiver<bool>) -> DaemonResult<FlockEngine> {
        let Self {
            config,
            playground,
            mut engine,
        } = self;

        let connected = engine.connect_all().await?;
        tracing::info!(connected, total = engine.birds().len(), "Flock connecting");

        let ready = tokio::select! {
            biased;

            _ = shutdown_requested(&mut shutdown) => None,
            result = engine.await_ready(config.driver.ready_poll(), config.driver.ready_timeout()) => {
                Some(result)
            }
        };
        match ready {
            Some(result) => {
                result?;
            }
            None => {
                tracing::info!("Shutdown requested before the flock was ready");
                return Ok(engine);
            }
        }

        // subscribe before the snapshot so no change slips between the two
        let feed = playground.directory().voice_events();
        let servers = engine.build_server_states().await;
        if servers == 0 {
            tracing::warn!("Ready birds belong to no servers; the flock will idle");
        }

        let (inbox, inbox_rx) = FlockInbox::channel(config.driver.inbox_capacity);
        let forwarder = inbox.forward(feed);
        let simulation = tokio::spawn(
            playground
                .simulation(&config.playground, config.seed)
                .run(shutdown.clone()),
        );

        let driver = FlockDriver::new(engine, inbox_rx, config.driver.driver_config());
        let engine = driver.run(shutdown).await;

        forwarder.abort();
        match simulation.await {
            Ok(moves) => tracing::debug!(moves, "Human simulation joined"),
            Err(e) => tracing::warn!(error = %e, "Human simulation task failed"),
        }

        for state in engine.servers() {
            tracing::info!(
                server = %state.id(),
                name = %state.guild().name,
                target = ?state.target(),
                parked = state.parked_count(),
                "Final flock position"
            );
        }
        tracing::info!("Birds daemon shutting down");

        Ok(engine)
    }
}

/// Resolves once `shutdown` is true or its sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
