//! Connection handler: runs one client session from login to last result.
//!
//! Every per-connection failure is contained here. The caller gets a
//! [`SessionReport`] describing what happened and never an error, so a
//! misbehaving client cannot take down the service loop.

use crate::credentials::CredentialStore;
use crate::protocol::handshake::Salt;
use crate::protocol::{FrameCodec, FrameError, Handshake, HandshakeError, HandshakeOutcome};
use crate::reducer::reduce;
use std::io::{Read, Write};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failures that end a session early.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionStatus {
    /// Every declared vector was answered.
    Completed,
    /// The handshake ended with `ERR`.
    Rejected,
    /// A protocol violation or transport failure stopped the exchange.
    Aborted(SessionError),
}

/// Summary handed back to the service loop.
#[derive(Debug)]
pub struct SessionReport {
    pub peer: SocketAddr,
    pub login: Option<String>,
    pub authenticated: bool,
    /// Results sent before the session ended.
    pub results_sent: u32,
    pub status: SessionStatus,
}

/// Per-connection state. Owns the stream for the lifetime of the session.
pub struct Session<S> {
    stream: S,
    peer: SocketAddr,
    login: Option<String>,
    salt: Option<Salt>,
    authenticated: bool,
    results_sent: u32,
}

impl<S: Read + Write> Session<S> {
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            login: None,
            salt: None,
            authenticated: false,
            results_sent: 0,
        }
    }

    /// Run the session to its end and report the outcome.
    ///
    /// The stream is dropped when this returns, closing the connection.
    pub fn run<C: CredentialStore + ?Sized>(mut self, store: &C) -> SessionReport {
        let status = match self.exchange(store) {
            Ok(status) => status,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Session aborted");
                SessionStatus::Aborted(e)
            }
        };

        debug!(
            peer = %self.peer,
            salt = ?self.salt,
            results = self.results_sent,
            "Session finished"
        );

        SessionReport {
            peer: self.peer,
            login: self.login,
            authenticated: self.authenticated,
            results_sent: self.results_sent,
            status,
        }
    }

    fn exchange<C: CredentialStore + ?Sized>(
        &mut self,
        store: &C,
    ) -> Result<SessionStatus, SessionError> {
        let outcome = Handshake::new(store).run(&mut self.stream)?;

        self.login = Some(outcome.login().to_string());
        self.salt = outcome.salt().cloned();

        self.authenticated = outcome.is_authenticated();

        if let HandshakeOutcome::Rejected { reason, .. } = &outcome {
            info!(peer = %self.peer, login = outcome.login(), ?reason, "Authentication rejected");
            return Ok(SessionStatus::Rejected);
        }

        let mut codec = FrameCodec::new();
        let count = codec.read_batch_count(&mut self.stream)?;
        info!(peer = %self.peer, vectors = count, "Receiving vectors");

        for index in 1..=count {
            let len = codec.read_vector_length(&mut self.stream)?;
            let values = codec.read_elements(&mut self.stream, len)?;

            let result = reduce(&values);
            codec.write_result(&mut self.stream, result)?;
            self.results_sent += 1;

            debug!(vector = index, len, result, "Sent result");
        }

        info!(peer = %self.peer, vectors = count, "All results sent");
        Ok(SessionStatus::Completed)
    }
}
