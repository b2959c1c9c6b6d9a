//! line-server: a minimal line-oriented TCP command server
//!
//! Every client gets its own thread and a `>>` prompt. Commands:
//! - `EX`: stop the service
//! - `DIR`: placeholder listing
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod error;
mod protocols;
mod runtime;

use config::Config;
use error::StartupError;
use runtime::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().map_err(StartupError::from)?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_thread_ids(true)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        poll_interval_us = config.options.poll_interval.as_micros() as u64,
        halt_on_connection_error = config.options.halt_on_connection_error,
        "Starting line-server"
    );

    let addr = config.bind_addr()?;
    let server =
        Server::bind(addr, config.options).map_err(|source| StartupError::Bind { addr, source })?;

    info!(addr = %server.local_addr(), "Server listening");

    server.run();
    Ok(())
}
