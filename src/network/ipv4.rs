//! IPv4 protocol implementation
//!
//! This module provides IPv4 datagram decoding, validation and encoding.
//! Options are skipped on decode and never emitted; fragmentation is not
//! supported.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::network::checksum;

pub const IPV4_HEADER_LEN: usize = 20;
const IPV4_VERSION: u8 = 4;
const DEFAULT_IHL: u8 = 5; // 5 * 4 = 20 bytes (standard header length)
pub const DEFAULT_TTL: u8 = 64;

/// IPv4 protocol constants
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
}

/// IPv4 flags constants
pub mod flags {
    pub const DONT_FRAGMENT: u16 = 0x4000;
}

/// IPv4 packet header structure
///
/// Represents the fixed 20-byte IPv4 header as defined in RFC 791
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8, // Internet Header Length, in 32-bit words
    pub tos: u8, // Type of Service
    pub total_len: u16,
    pub id: u16,
    pub flags_frag_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
}

impl Ipv4Header {
    /// Create a header without options for a payload of `payload_len` bytes
    ///
    /// The checksum is left zero; `Ipv4Datagram::encode` fills it in.
    pub fn new_simple(
        protocol: u8,
        src_addr: [u8; 4],
        dst_addr: [u8; 4],
        payload_len: u16,
    ) -> Self {
        Ipv4Header {
            version: IPV4_VERSION,
            ihl: DEFAULT_IHL,
            tos: 0,
            total_len: IPV4_HEADER_LEN as u16 + payload_len,
            id: 0,
            flags_frag_offset: flags::DONT_FRAGMENT,
            ttl: DEFAULT_TTL,
            protocol,
            checksum: 0,
            src_addr,
            dst_addr,
        }
    }

    /// Read the fixed header fields without validating them
    ///
    /// Callers must supply at least `IPV4_HEADER_LEN` bytes.
    fn read(data: &[u8]) -> Self {
        Ipv4Header {
            version: data[0] >> 4,
            ihl: data[0] & 0x0F,
            tos: data[1],
            total_len: BigEndian::read_u16(&data[2..4]),
            id: BigEndian::read_u16(&data[4..6]),
            flags_frag_offset: BigEndian::read_u16(&data[6..8]),
            ttl: data[8],
            protocol: data[9],
            checksum: BigEndian::read_u16(&data[10..12]),
            src_addr: [data[12], data[13], data[14], data[15]],
            dst_addr: [data[16], data[17], data[18], data[19]],
        }
    }

    /// Convert IPv4 header to bytes
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut bytes = [0u8; IPV4_HEADER_LEN];
        bytes[0] = (self.version << 4) | (self.ihl & 0x0F);
        bytes[1] = self.tos;
        BigEndian::write_u16(&mut bytes[2..4], self.total_len);
        BigEndian::write_u16(&mut bytes[4..6], self.id);
        BigEndian::write_u16(&mut bytes[6..8], self.flags_frag_offset);
        bytes[8] = self.ttl;
        bytes[9] = self.protocol;
        BigEndian::write_u16(&mut bytes[10..12], self.checksum);
        bytes[12..16].copy_from_slice(&self.src_addr);
        bytes[16..20].copy_from_slice(&self.dst_addr);
        bytes
    }

    /// Get the header length in bytes
    pub fn header_len(&self) -> usize {
        (self.ihl as usize) * 4
    }
}

/// A decoded IPv4 datagram: header plus the `[header_len, total_len)` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Datagram {
    pub header: Ipv4Header,
    pub payload: Vec<u8>,
}

impl Ipv4Datagram {
    /// Decode and validate a datagram
    ///
    /// Bytes beyond the total-length field (link padding) are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < IPV4_HEADER_LEN {
            return Err(Error::Decode("ip packet is too short"));
        }
        let header = Ipv4Header::read(data);
        if header.version != IPV4_VERSION {
            return Err(Error::Decode("not ipv4 packet"));
        }
        let header_len = header.header_len();
        if header_len < IPV4_HEADER_LEN {
            return Err(Error::Decode("ip header length below minimum"));
        }
        if data.len() < header_len {
            return Err(Error::Decode("need at least header length's data"));
        }
        let sum = checksum(&data[..header_len]);
        if sum != 0 {
            return Err(Error::Checksum { computed: sum });
        }
        let total_len = header.total_len as usize;
        if data.len() < total_len {
            return Err(Error::Decode("ip packet length error"));
        }
        if total_len < header_len {
            return Err(Error::Decode("total length shorter than header"));
        }
        if header.ttl == 0 {
            return Err(Error::Decode("TTL=0"));
        }

        Ok(Ipv4Datagram {
            payload: data[header_len..total_len].to_vec(),
            header,
        })
    }

    /// Encode as a datagram without options
    ///
    /// Rewrites the header length, total length and checksum fields to match
    /// the current payload.
    pub fn encode(&mut self) -> Vec<u8> {
        self.header.ihl = DEFAULT_IHL;
        self.header.total_len = (IPV4_HEADER_LEN + self.payload.len()) as u16;
        self.header.checksum = 0;
        self.header.checksum = checksum(&self.header.to_bytes());

        let mut packet = Vec::with_capacity(self.header.total_len as usize);
        packet.extend_from_slice(&self.header.to_bytes());
        packet.extend_from_slice(&self.payload);
        packet
    }

    /// Turn this datagram around so it travels back to its sender
    pub fn swap_addresses(&mut self) {
        std::mem::swap(&mut self.header.src_addr, &mut self.header.dst_addr);
        self.header.ttl = DEFAULT_TTL;
    }
}
