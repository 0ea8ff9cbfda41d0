//! Wire protocol for the vector calculation service.
//!
//! A session has two phases over one TCP connection:
//!
//! ## Authentication
//!
//! ```text
//! client -> server   <login>                 raw bytes, one read, <= 255 bytes
//! server -> client   <salt>                  16 uppercase hex characters
//! client -> server   <hash>                  UPPER(HEX(SHA1(salt ++ secret)))
//! server -> client   OK | ERR
//! ```
//!
//! An unknown login is answered with `ERR` straight away and no salt.
//!
//! ## Calculation
//!
//! All integers and floats are little-endian.
//!
//! ```text
//! client -> server   u32 batch count         1..=100
//! repeat batch count times:
//!   client -> server u32 vector length       1..=1000
//!   client -> server f32 * vector length
//!   server -> client f32 product             -inf on overflow
//! ```
//!
//! Each result is sent before the next vector length is read.

pub mod frame;
pub mod handshake;

pub use frame::{FrameCodec, FrameError};
pub use handshake::{Handshake, HandshakeError, HandshakeOutcome};
