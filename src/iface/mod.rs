//! Network interface abstraction layer
//!
//! This module ties the protocol layers to a device:
//! - device: the device boundary and the serialized write path
//! - interface: frame dispatch and the read loop
//! - ipv4: datagram handling and transport dispatch

pub mod device;
pub mod interface;
mod ipv4;

pub use device::{Device, Identity, Link};
pub use interface::NetworkInterface;

/// What a protocol handler did with the message it was given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The message was rewritten in place into a reply to send back
    Reply,
    /// Nothing to send back synchronously
    Consumed,
}
