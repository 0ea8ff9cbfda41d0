//! Sequential accept/dispatch loop.
//!
//! Readiness-based model: mio polls the listening socket with a bounded
//! timeout so the loop can notice the idle threshold and shutdown requests.
//! Accepted connections are switched to blocking mode with read/write
//! timeouts and handled to completion before the next accept.

use crate::credentials::CredentialStore;
use crate::runtime::Shutdown;
use crate::session::{Session, SessionStatus};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(0);

/// Pending connection queue length.
const LISTEN_BACKLOG: i32 = 10;

/// Settings for the service loop.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen: SocketAddr,
    /// Stop after this long without a connection.
    pub idle_timeout: Duration,
    /// Read/write timeout applied to each client socket.
    pub io_timeout: Duration,
    /// Upper bound on one readiness wait.
    pub poll_interval: Duration,
}

/// Lifecycle of the service loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Initializing,
    Listening,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No connection arrived within the idle threshold.
    Idle,
    /// Shutdown was requested.
    Signal,
}

/// Fatal service errors. Per-connection failures never end up here.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to bind to {addr}: {source}")]
    BindFailed { addr: SocketAddr, source: io::Error },

    #[error("failed to set up poller: {0}")]
    PollSetup(#[source] io::Error),

    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),
}

struct Listening {
    listener: TcpListener,
    poll: Poll,
    events: Events,
}

/// Single-client-at-a-time TCP service.
pub struct Service<C> {
    config: ServiceConfig,
    store: C,
    shutdown: Shutdown,
    state: ServiceState,
    listening: Option<Listening>,
}

impl<C: CredentialStore> Service<C> {
    pub fn new(config: ServiceConfig, store: C, shutdown: Shutdown) -> Self {
        Self {
            config,
            store,
            shutdown,
            state: ServiceState::Stopped,
            listening: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Bind the listening socket and register it with the poller.
    ///
    /// Returns the bound address, which differs from the configured one
    /// when port 0 was requested.
    pub fn start(&mut self) -> Result<SocketAddr, ServiceError> {
        if let Some(listening) = &self.listening {
            return listening.listener.local_addr().map_err(|source| {
                ServiceError::BindFailed {
                    addr: self.config.listen,
                    source,
                }
            });
        }

        debug!(state = ?self.state, addr = %self.config.listen, "Starting service");
        self.state = ServiceState::Initializing;

        match self.bind() {
            Ok((listening, addr)) => {
                self.listening = Some(listening);
                self.state = ServiceState::Listening;
                info!(
                    addr = %addr,
                    idle_timeout_secs = self.config.idle_timeout.as_secs(),
                    "Server listening"
                );
                Ok(addr)
            }
            Err(e) => {
                self.state = ServiceState::Stopped;
                Err(e)
            }
        }
    }

    fn bind(&self) -> Result<(Listening, SocketAddr), ServiceError> {
        let addr = self.config.listen;
        let mut listener = create_listener(addr)
            .map_err(|source| ServiceError::BindFailed { addr, source })?;
        let local = listener
            .local_addr()
            .map_err(|source| ServiceError::BindFailed { addr, source })?;

        let poll = Poll::new().map_err(ServiceError::PollSetup)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(ServiceError::PollSetup)?;

        Ok((
            Listening {
                listener,
                poll,
                events: Events::with_capacity(8),
            },
            local,
        ))
    }

    /// Serve clients until the idle threshold passes or shutdown is
    /// requested. The listening socket is released before returning.
    pub fn run(&mut self) -> Result<StopReason, ServiceError> {
        self.start()?;
        let result = self.serve();

        if let Some(mut listening) = self.listening.take() {
            if let Err(e) = listening.poll.registry().deregister(&mut listening.listener) {
                debug!(error = %e, "Failed to deregister listener");
            }
        }
        self.state = ServiceState::Stopped;

        match &result {
            Ok(reason) => info!(?reason, "Server stopped"),
            Err(e) => error!(error = %e, "Server failed"),
        }
        result
    }

    fn serve(&mut self) -> Result<StopReason, ServiceError> {
        let Some(mut listening) = self.listening.take() else {
            return Err(ServiceError::PollSetup(io::Error::new(
                io::ErrorKind::NotConnected,
                "service not started",
            )));
        };

        let result = self.poll_loop(&mut listening);
        self.listening = Some(listening);
        result
    }

    fn poll_loop(&self, listening: &mut Listening) -> Result<StopReason, ServiceError> {
        let mut last_activity = Instant::now();

        loop {
            if self.shutdown.is_requested() {
                return Ok(StopReason::Signal);
            }

            match listening
                .poll
                .poll(&mut listening.events, Some(self.config.poll_interval))
            {
                Ok(()) => {}
                // A signal arrived; the flag is checked at the top
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ServiceError::Poll(e)),
            }

            if listening.events.is_empty() {
                let idle = last_activity.elapsed();
                if idle >= self.config.idle_timeout {
                    info!(idle_secs = idle.as_secs(), "Idle threshold reached");
                    return Ok(StopReason::Idle);
                }
                continue;
            }

            let readable = listening
                .events
                .iter()
                .any(|event| event.token() == LISTENER_TOKEN);
            if !readable {
                continue;
            }

            if drain(&self.shutdown, || self.accept_one(&listening.listener)) > 0 {
                last_activity = Instant::now();
            }
        }
    }

    /// Accept and fully handle one connection.
    fn accept_one(&self, listener: &TcpListener) -> Accept {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Accept::Drained,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Accept::Failed,
            // Aborted handshakes and the like leave the rest of the queue intact
            Err(e) => {
                error!(error = %e, "Failed to accept client connection");
                return Accept::Failed;
            }
        };

        info!(peer = %peer, "Client connected");

        let stream = TcpStream::from(stream);
        if let Err(e) = self.prepare_stream(&stream) {
            warn!(peer = %peer, error = %e, "Failed to configure client socket");
            return Accept::Handled;
        }

        let report = Session::new(stream, peer).run(&self.store);

        match &report.status {
            SessionStatus::Completed => info!(
                peer = %report.peer,
                login = report.login.as_deref().unwrap_or(""),
                results = report.results_sent,
                "Client session completed"
            ),
            SessionStatus::Rejected => info!(
                peer = %report.peer,
                login = report.login.as_deref().unwrap_or(""),
                "Client rejected"
            ),
            SessionStatus::Aborted(e) => warn!(
                peer = %report.peer,
                authenticated = report.authenticated,
                results = report.results_sent,
                error = %e,
                "Client session aborted"
            ),
        }

        debug!(peer = %report.peer, "Client disconnected");
        Accept::Handled
    }

    fn prepare_stream(&self, stream: &TcpStream) -> io::Result<()> {
        // Accepted sockets may inherit the listener's non-blocking flag
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.config.io_timeout))?;
        stream.set_write_timeout(Some(self.config.io_timeout))?;
        Ok(())
    }
}

/// Result of one accept attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accept {
    /// A client was served, successfully or not.
    Handled,
    /// `accept` failed for this entry; others may still be queued.
    Failed,
    /// No connection is pending.
    Drained,
}

/// Accept until the queue is empty or shutdown is requested, returning the
/// number of clients handled.
///
/// Readiness is edge-triggered, so a failed accept must not end the drain:
/// clients still queued behind it would get no further event.
fn drain(shutdown: &Shutdown, mut accept: impl FnMut() -> Accept) -> usize {
    let mut handled = 0;
    loop {
        match accept() {
            Accept::Drained => return handled,
            Accept::Handled => handled += 1,
            Accept::Failed => {}
        }
        if shutdown.is_requested() {
            return handled;
        }
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(TcpListener::from_std(socket.into()))
}
