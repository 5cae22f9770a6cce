//! # pulselinkd — pulselink daemon
//!
//! Composition root that wires a radio backend into the integration core and
//! logs every reading until interrupted.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Initialize `tracing` with the configured filter
//! - Construct the selected radio backend (btleplug or simulated)
//! - Construct the coordinator, acquire the radio and start scanning
//! - Auto-connect to the first matching oximeter and rescan when it is lost
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;
mod daemon;
mod grants;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use pulselink_adapter_ble::BtleplugFactory;
use pulselink_adapter_virtual::SimulatedFactory;
use pulselink_app::ports::RadioFactory;
use pulselink_app::services::coordinator::Coordinator;

use crate::config::{Backend, Config};
use crate::daemon::Daemon;
use crate::grants::DeclaredCapabilities;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    tracing::info!(
        backend = ?config.backend,
        platform = ?config.platform,
        granted = ?config.granted,
        "pulselinkd starting"
    );

    match config.backend {
        Backend::Ble => run(BtleplugFactory::new(config.ble.clone()), &config).await,
        Backend::Simulated => {
            run(SimulatedFactory::new(config.simulator.clone()), &config).await
        }
    }
}

async fn run<F: RadioFactory>(factory: F, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = Coordinator::new(
        factory,
        config.platform,
        DeclaredCapabilities::new(config.granted.clone()),
        config.link.clone(),
    );
    let mut daemon = Daemon::new(coordinator, config.target.classification());
    let mut events = daemon.coordinator().subscribe();
    let guard = daemon.start().await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                tracing::info!(device_id = ?daemon.active(), "shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Err(err) = daemon.handle(event).await {
                        tracing::warn!(error = %err, "failed to handle link event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event consumer lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    daemon.shutdown(guard).await;
    Ok(())
}
