//! Networking runtime for the calculation service.
//!
//! One thread of control serves one client at a time:
//! - `Service`: listening socket, bounded readiness poll, idle shutdown
//! - `Shutdown`: cancellation flag set by termination signals
//! - `RecvBuffer`: bounded single-read buffer for unframed messages

mod buffer;
mod event_loop;
mod shutdown;

pub(crate) use buffer::RecvBuffer;
pub use event_loop::{Service, ServiceConfig, ServiceError, StopReason};
pub use shutdown::Shutdown;

use crate::config::Config;
use crate::credentials::CredentialStore;

/// Run the service until it goes idle or is asked to stop.
pub fn run<C: CredentialStore>(
    config: &Config,
    store: C,
    shutdown: Shutdown,
) -> Result<StopReason, ServiceError> {
    let service_config = ServiceConfig {
        listen: config.listen,
        idle_timeout: config.idle_timeout,
        io_timeout: config.io_timeout,
        poll_interval: config.poll_interval,
    };

    Service::new(service_config, store, shutdown).run()
}
