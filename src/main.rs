//! vcalc-server: a single-client vector calculation server
//!
//! Clients authenticate with a salted SHA-1 challenge and then send
//! batches of `f32` vectors; the server answers each vector with the
//! product of its elements (negative infinity on overflow).
//!
//! Features:
//! - One client at a time, no concurrent sessions
//! - Login/salt/hash handshake against a flat user database
//! - Little-endian binary framing with strict bounds
//! - Idle shutdown after a configurable period without connections
//! - Configuration via CLI arguments or TOML file

mod config;
mod credentials;
mod protocol;
mod reducer;
mod runtime;
mod session;

#[cfg(test)]
mod testutil;

use config::{Config, ConfigError};
use credentials::UserDb;
use runtime::Shutdown;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config)?;

    info!(
        listen = %config.listen,
        users = %config.users.display(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        io_timeout_secs = config.io_timeout.as_secs(),
        "Starting vcalc-server"
    );

    let users = UserDb::load(&config.users)?;

    let shutdown = Shutdown::new();
    shutdown.install_signal_handlers()?;

    let reason = runtime::run(&config, users, shutdown)?;
    info!(?reason, "Shutdown complete");
    Ok(())
}

/// Local wall-clock timestamps for log lines.
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

fn init_logging(config: &Config) -> Result<(), ConfigError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime);

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ConfigError::LogFile(path.clone(), e))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => builder.init(),
    }

    Ok(())
}
