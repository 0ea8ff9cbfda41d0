//! Salted SHA-1 challenge/response authentication.

use crate::credentials::CredentialStore;
use crate::runtime::RecvBuffer;
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::{Digest, Sha1};
use std::fmt;
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Largest login accepted in a single read.
pub const LOGIN_CAPACITY: usize = 255;

/// Largest hash response accepted in a single read (40 hex characters).
pub const HASH_CAPACITY: usize = 40;

/// Number of random bytes in a salt.
pub const SALT_BYTES: usize = 8;

/// Length of the hex-encoded salt sent on the wire.
pub const SALT_LEN: usize = SALT_BYTES * 2;

pub const REPLY_OK: &[u8] = b"OK";
pub const REPLY_ERR: &[u8] = b"ERR";

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingLogin,
    CheckingUser,
    SaltSent,
    AwaitingResponse,
    Authenticated,
    Rejected,
}

impl HandshakeState {
    /// Whether the handshake has reached a final state.
    #[cfg(test)]
    pub fn is_complete(self) -> bool {
        matches!(self, HandshakeState::Authenticated | HandshakeState::Rejected)
    }
}

/// Why a login was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownLogin,
    HashMismatch,
}

/// Result of a handshake that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Authenticated {
        login: String,
        salt: Salt,
    },
    Rejected {
        login: String,
        salt: Option<Salt>,
        reason: RejectReason,
    },
}

impl HandshakeOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, HandshakeOutcome::Authenticated { .. })
    }

    pub fn login(&self) -> &str {
        match self {
            HandshakeOutcome::Authenticated { login, .. }
            | HandshakeOutcome::Rejected { login, .. } => login,
        }
    }

    pub fn salt(&self) -> Option<&Salt> {
        match self {
            HandshakeOutcome::Authenticated { salt, .. } => Some(salt),
            HandshakeOutcome::Rejected { salt, .. } => salt.as_ref(),
        }
    }
}

/// Handshake failures that abort the session without a verdict.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("failed to receive {what}: {source}")]
    Receive {
        what: &'static str,
        source: io::Error,
    },

    #[error("failed to send {what}: {source}")]
    Send {
        what: &'static str,
        source: io::Error,
    },

    #[error("handshake already completed ({0:?})")]
    AlreadyCompleted(HandshakeState),
}

/// Challenge salt: 8 random bytes as 16 uppercase hex characters.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    /// Generate a fresh salt from the operating system RNG.
    pub fn random() -> Self {
        let mut raw = [0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut raw);
        Self::from_raw(raw)
    }

    /// Hex-encode raw salt bytes.
    pub fn from_raw(raw: [u8; SALT_BYTES]) -> Self {
        let mut text = [0u8; SALT_LEN];
        text.copy_from_slice(hex::encode_upper(raw).as_bytes());
        Self(text)
    }

    /// Parse an existing salt text. Returns `None` unless it is exactly 16
    /// uppercase hex characters.
    #[cfg(test)]
    pub fn from_hex(text: &str) -> Option<Self> {
        let bytes: [u8; SALT_LEN] = text.as_bytes().try_into().ok()?;
        bytes
            .iter()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(b))
            .then_some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Constructed from ASCII hex digits only
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({})", self.as_str())
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected client response: `UPPER(HEX(SHA1(salt ++ secret)))`.
pub fn expected_response(salt: &Salt, secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// Authentication state machine for one session.
///
/// Drives the exchange from receiving the login to sending the verdict.
/// It never closes the connection; that is left to the session.
pub struct Handshake<'a, C: ?Sized> {
    store: &'a C,
    state: HandshakeState,
    salt: Option<Salt>,
}

impl<'a, C: CredentialStore + ?Sized> Handshake<'a, C> {
    pub fn new(store: &'a C) -> Self {
        Self {
            store,
            state: HandshakeState::AwaitingLogin,
            salt: None,
        }
    }

    /// Use a fixed salt instead of a random one.
    #[cfg(test)]
    pub fn with_salt(mut self, salt: Salt) -> Self {
        self.salt = Some(salt);
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the exchange over `stream`.
    ///
    /// Returns the verdict once `OK` or `ERR` has been sent. I/O failures
    /// abort with an error and leave the state where it failed.
    pub fn run<S: Read + Write + ?Sized>(
        &mut self,
        stream: &mut S,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        if self.state != HandshakeState::AwaitingLogin {
            return Err(HandshakeError::AlreadyCompleted(self.state));
        }

        let mut buf = RecvBuffer::new(LOGIN_CAPACITY);
        let raw_login = buf
            .recv_once(stream)
            .map_err(|source| HandshakeError::Receive {
                what: "login",
                source,
            })?;
        let login = String::from_utf8_lossy(raw_login).into_owned();
        // Invalid UTF-8 never names a stored login
        let known = std::str::from_utf8(raw_login).is_ok() && self.store.exists(&login);
        debug!(login = %login, "Received login");

        self.state = HandshakeState::CheckingUser;
        info!(login = %login, "Authentication attempt");

        let secret = match self.store.secret_of(&login) {
            Some(secret) if known => secret,
            _ => {
                warn!(login = %login, "User not found");
                self.state = HandshakeState::Rejected;
                send(stream, REPLY_ERR, "authentication result")?;
                return Ok(HandshakeOutcome::Rejected {
                    login,
                    salt: None,
                    reason: RejectReason::UnknownLogin,
                });
            }
        };

        let salt = self.salt.take().unwrap_or_else(Salt::random);
        send(stream, salt.as_bytes(), "salt")?;
        self.state = HandshakeState::SaltSent;
        debug!(salt = %salt, "Sent salt");

        self.state = HandshakeState::AwaitingResponse;
        let mut buf = RecvBuffer::new(HASH_CAPACITY);
        let response = buf
            .recv_once(stream)
            .map_err(|source| HandshakeError::Receive {
                what: "hash response",
                source,
            })?;

        let expected = expected_response(&salt, secret);
        let authenticated = response == expected.as_bytes();

        if authenticated {
            self.state = HandshakeState::Authenticated;
            info!(login = %login, "User authenticated");
            send(stream, REPLY_OK, "authentication result")?;
            Ok(HandshakeOutcome::Authenticated { login, salt })
        } else {
            self.state = HandshakeState::Rejected;
            warn!(login = %login, "Authentication failed");
            debug!(
                expected = %expected,
                received = %String::from_utf8_lossy(response),
                "Hash mismatch"
            );
            send(stream, REPLY_ERR, "authentication result")?;
            Ok(HandshakeOutcome::Rejected {
                login,
                salt: Some(salt),
                reason: RejectReason::HashMismatch,
            })
        }
    }
}

fn send<S: Write + ?Sized>(
    stream: &mut S,
    data: &[u8],
    what: &'static str,
) -> Result<(), HandshakeError> {
    stream
        .write_all(data)
        .and_then(|()| stream.flush())
        .map_err(|source| HandshakeError::Send { what, source })
}
