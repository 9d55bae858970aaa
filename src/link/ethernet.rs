//! Ethernet II framing
//!
//! No frame check sequence: TAP devices hand over frames without it.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const MIN_PAYLOAD_LEN: usize = 46;
pub const MAX_PAYLOAD_LEN: usize = 1500;
pub const MIN_FRAME_LEN: usize = ETHERNET_HEADER_LEN + MIN_PAYLOAD_LEN;
pub const MAX_FRAME_LEN: usize = ETHERNET_HEADER_LEN + MAX_PAYLOAD_LEN;

/// EtherType constants
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub dst_addr: [u8; 6],
    pub src_addr: [u8; 6],
    pub ethertype: u16,
    pub payload: Vec<u8>,
}

impl EthernetFrame {
    pub fn new(dst_addr: [u8; 6], src_addr: [u8; 6], ethertype: u16, payload: Vec<u8>) -> Self {
        EthernetFrame {
            dst_addr,
            src_addr,
            ethertype,
            payload,
        }
    }

    /// Parse a frame; everything after the header is kept verbatim
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < ETHERNET_HEADER_LEN {
            return Err(Error::Decode("ethernet frame is too short"));
        }

        let mut dst_addr = [0u8; 6];
        let mut src_addr = [0u8; 6];
        dst_addr.copy_from_slice(&data[0..6]);
        src_addr.copy_from_slice(&data[6..12]);

        Ok(EthernetFrame {
            dst_addr,
            src_addr,
            ethertype: BigEndian::read_u16(&data[12..14]),
            payload: data[ETHERNET_HEADER_LEN..].to_vec(),
        })
    }

    /// Serialize the frame, zero-padding it up to `MIN_FRAME_LEN`
    ///
    /// Oversized payloads are not truncated.
    pub fn encode(&self) -> Vec<u8> {
        let len = ETHERNET_HEADER_LEN + self.payload.len();
        let mut bytes = vec![0u8; len.max(MIN_FRAME_LEN)];
        bytes[0..6].copy_from_slice(&self.dst_addr);
        bytes[6..12].copy_from_slice(&self.src_addr);
        BigEndian::write_u16(&mut bytes[12..14], self.ethertype);
        bytes[ETHERNET_HEADER_LEN..len].copy_from_slice(&self.payload);
        bytes
    }
}
