//! A minimal userspace TCP/IP stack on top of a TAP device
//!
//! This library provides:
//! - Ethernet framing and ARP with a bounded translation cache
//! - IPv4 processing and ICMP echo replies
//! - Passive-open TCP with per-connection threads and a shared output path
//! - A read loop driving any frame-oriented device

pub mod config;
pub mod error;
pub mod iface;
pub mod link;
pub mod network;
pub mod transport;

// Re-export commonly used types
pub use config::StackConfig;
pub use error::{Error, Result};
pub use iface::{Device, Identity, NetworkInterface};
pub use link::arp_cache::ArpCache;
pub use link::ethernet::EthernetFrame;
pub use network::icmp::{IcmpMessage, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};
pub use network::ipv4::{Ipv4Datagram, Ipv4Header};
pub use transport::{ConnectionKey, TcpHost, TcpListener, TcpState, TcpStream};
