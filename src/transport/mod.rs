//! Transport layer protocols implementation
//!
//! This module contains the passive-open TCP implementation:
//! - tcp: segment codec and pseudo-header checksum
//! - state: the connection state machine
//! - connection: one thread per connection, application streams
//! - host: connection directory and output multiplexer

pub mod connection;
pub mod host;
pub mod state;
pub mod tcp;

use crate::error::Error;

// Re-export commonly used items
pub use connection::{ConnectionKey, TcpListener, TcpStream};
pub use host::{Multiplexer, TcpHost};
pub use state::{TcpState, Tcb};
pub use tcp::{TcpHeader, TcpSegment};

/// What a connection hands to the output multiplexer
#[derive(Debug)]
pub enum OutputEvent {
    Segment {
        key: ConnectionKey,
        segment: state::Outbound,
    },
    /// The connection reached CLOSED and must leave the directory
    Closed {
        key: ConnectionKey,
        error: Option<Error>,
        send_next: u32,
    },
    Shutdown,
}
