//! Stack configuration
//!
//! Every field has a default, so an empty TOML file (or no file at all) yields a
//! usable host on `10.1.0.1`.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::iface::device::Identity;
use crate::link::arp_cache::DEFAULT_CAPACITY;

const DEFAULT_HARDWARE_ADDRESS: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const DEFAULT_PROTOCOL_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 1, 0, 1);
const DEFAULT_RECEIVE_WINDOW: u16 = 64240;
const DEFAULT_QUEUE_LEN: usize = 64;
const DEFAULT_MAX_CONNECTIONS: usize = 256;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Link address the host answers ARP requests with
    pub hardware_address: [u8; 6],
    /// The single protocol address this host terminates traffic for
    pub protocol_address: Ipv4Addr,
    /// Receive window advertised on every outbound segment
    pub receive_window: u16,
    /// Segments buffered per connection before inbound drops start
    pub inbound_queue: usize,
    /// Chunks buffered toward the application before a connection blocks
    pub application_queue: usize,
    pub arp_capacity: usize,
    /// Live connections, half-open ones included; further SYNs are dropped
    pub max_connections: usize,
    /// Ports opened for passive connections at start-up
    pub listen: Vec<u16>,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            hardware_address: DEFAULT_HARDWARE_ADDRESS,
            protocol_address: DEFAULT_PROTOCOL_ADDRESS,
            receive_window: DEFAULT_RECEIVE_WINDOW,
            inbound_queue: DEFAULT_QUEUE_LEN,
            application_queue: DEFAULT_QUEUE_LEN,
            arp_capacity: DEFAULT_CAPACITY,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            listen: Vec::new(),
        }
    }
}

impl StackConfig {
    /// Load the configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The static local identity handed to every protocol handler
    pub fn identity(&self) -> Identity {
        Identity {
            hardware_address: self.hardware_address,
            protocol_address: self.protocol_address.octets(),
        }
    }
}
