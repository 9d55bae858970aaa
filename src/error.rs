//! Error type shared by every protocol layer
//!
//! Decode and dispatch errors only ever cause the current frame to be dropped.
//! `ProtocolViolation` and `ConnectionReset` end a TCP connection and make the
//! host answer with a reset segment.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Truncated or malformed bytes
    #[error("decode error: {0}")]
    Decode(&'static str),

    /// Header or full-message checksum did not sum to zero
    #[error("checksum error ({computed:#06x})")]
    Checksum { computed: u16 },

    /// Unknown hardware, protocol or transport type, or a type not implemented
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Packet is not addressed to the local identity
    #[error("not addressed to us")]
    AddressMismatch,

    /// The ARP cache has no free slot
    #[error("no free space in ARP translation table")]
    Capacity,

    /// TCP flag or acknowledgment combination invalid for the current state
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("connection reset by peer: {0}")]
    ConnectionReset(&'static str),

    #[error("device error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}
