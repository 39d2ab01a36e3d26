//! armada-scheduler
//!
//! Process shell around the scheduler engine: load configuration and the
//! service specification, wire up stores and the driver, run the serial
//! engine, and turn its exit decision into a process exit code.
//!
//! The cluster manager transport is out of scope here; the binary wires the
//! logging driver so the engine can be exercised end to end in dry runs.

use std::sync::Arc;

use anyhow::{Context, Result};
use armada_spec::ServiceSpecification;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use armada_scheduler::config::Config;
use armada_scheduler::driver::LoggingDriver;
use armada_scheduler::engine::{event_channel, Engine};
use armada_scheduler::state::{
    ConfigStore, InMemoryConfigStore, InMemoryStateStore, StateStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting armada scheduler");

    let spec = load_spec(&config)?;
    info!(service = %spec.name, pods = spec.pods.len(), "Specification loaded");

    let state_store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let config_store: Arc<dyn ConfigStore> = Arc::new(InMemoryConfigStore::new());
    let driver = Arc::new(LoggingDriver);

    let (events, rx) = event_channel();
    let engine = Engine::new(config, spec, state_store, config_store, driver);

    // With no transport wired in, registration is simulated so dry runs
    // exercise initialization.
    events.registered(armada_id::FrameworkId::parse(format!(
        "dryrun-{}",
        ulid::Ulid::new()
    ))?);
    // Closing the queue lets the engine drain it and exit cleanly once the
    // dry run has nothing further to feed it.
    drop(events);

    let code = engine.run(rx).await;
    if code != armada_scheduler::error::SchedulerErrorCode::Normal {
        error!(code = code.code(), "Scheduler exiting on fatal error");
    }
    std::process::exit(code.code());
}

fn load_spec(config: &Config) -> Result<ServiceSpecification> {
    let path = config
        .spec_path
        .as_deref()
        .context("ARMADA_SPEC_PATH is required")?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read specification at {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid specification in {path}"))
}
