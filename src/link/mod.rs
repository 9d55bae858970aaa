//! Link layer: Ethernet framing and address resolution
//!
//! - Ethernet: frame encode/decode with minimum-size padding
//! - ARP: request handling and the translation table

pub mod arp;
pub mod arp_cache;
pub mod ethernet;

pub use arp::ArpPacket;
pub use arp_cache::{ArpCache, ArpEntry};
pub use ethernet::{ethertype, EthernetFrame};
