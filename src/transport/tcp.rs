//! TCP (Transmission Control Protocol) segment codec
//!
//! This module provides TCP header parsing and serialization together with the
//! pseudo-header checksum. Options are skipped on decode and never emitted.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::network::checksum;
use crate::network::ipv4::protocol;

pub const TCP_HEADER_LEN: usize = 20;
const PSEUDO_HEADER_LEN: usize = 12;
const DEFAULT_DATA_OFFSET: u16 = 5; // 5 * 4 = 20 bytes, no options

/// TCP control bits, as found in the low byte of `data_offset_and_flags`
pub mod flags {
    pub const FIN: u16 = 0x0001;
    pub const SYN: u16 = 0x0002;
    pub const RST: u16 = 0x0004;
    pub const PSH: u16 = 0x0008;
    pub const ACK: u16 = 0x0010;
    pub const URG: u16 = 0x0020;
    pub const MASK: u16 = 0x00FF;
}

/// TCP packet header structure
///
/// Represents the standard 20-byte TCP header as defined in RFC 793
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_number: u32,
    pub ack_number: u32,
    pub data_offset_and_flags: u16, // Data offset (4 bits) + Reserved (4 bits) + Flags (8 bits)
    pub window_size: u16,
    pub checksum: u16,
    pub urgent_ptr: u16,
}

impl TcpHeader {
    /// Parse TCP header from byte slice
    ///
    /// Returns None if the data is too short to contain a TCP header
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < TCP_HEADER_LEN {
            return None;
        }

        Some(TcpHeader {
            src_port: BigEndian::read_u16(&data[0..2]),
            dst_port: BigEndian::read_u16(&data[2..4]),
            seq_number: BigEndian::read_u32(&data[4..8]),
            ack_number: BigEndian::read_u32(&data[8..12]),
            data_offset_and_flags: BigEndian::read_u16(&data[12..14]),
            window_size: BigEndian::read_u16(&data[14..16]),
            checksum: BigEndian::read_u16(&data[16..18]),
            urgent_ptr: BigEndian::read_u16(&data[18..20]),
        })
    }

    /// Convert TCP header to bytes
    pub fn to_bytes(&self) -> [u8; TCP_HEADER_LEN] {
        let mut bytes = [0u8; TCP_HEADER_LEN];
        BigEndian::write_u16(&mut bytes[0..2], self.src_port);
        BigEndian::write_u16(&mut bytes[2..4], self.dst_port);
        BigEndian::write_u32(&mut bytes[4..8], self.seq_number);
        BigEndian::write_u32(&mut bytes[8..12], self.ack_number);
        BigEndian::write_u16(&mut bytes[12..14], self.data_offset_and_flags);
        BigEndian::write_u16(&mut bytes[14..16], self.window_size);
        BigEndian::write_u16(&mut bytes[16..18], self.checksum);
        BigEndian::write_u16(&mut bytes[18..20], self.urgent_ptr);
        bytes
    }

    pub fn flags(&self) -> u16 {
        self.data_offset_and_flags & flags::MASK
    }

    pub fn has(&self, flag: u16) -> bool {
        self.data_offset_and_flags & flag != 0
    }

    pub fn is_syn(&self) -> bool {
        self.has(flags::SYN)
    }

    pub fn is_ack(&self) -> bool {
        self.has(flags::ACK)
    }

    pub fn is_fin(&self) -> bool {
        self.has(flags::FIN)
    }

    pub fn is_rst(&self) -> bool {
        self.has(flags::RST)
    }

    /// Get the data offset (header length) in bytes
    pub fn data_offset(&self) -> usize {
        ((self.data_offset_and_flags >> 12) as usize) * 4
    }

    /// Replace the control bits, keeping the data offset
    pub fn set_flags(&mut self, bits: u16) {
        self.data_offset_and_flags = (self.data_offset_and_flags & !flags::MASK) | (bits & flags::MASK);
    }
}

/// A TCP header together with its payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TcpSegment {
    pub header: TcpHeader,
    pub payload: Vec<u8>,
}

impl TcpSegment {
    /// Build an option-less segment
    pub fn new(src_port: u16, dst_port: u16, seq_number: u32, ack_number: u32, bits: u16) -> Self {
        TcpSegment {
            header: TcpHeader {
                src_port,
                dst_port,
                seq_number,
                ack_number,
                data_offset_and_flags: (DEFAULT_DATA_OFFSET << 12) | (bits & flags::MASK),
                ..TcpHeader::default()
            },
            payload: Vec::new(),
        }
    }

    /// Decode the segment carried in an IPv4 payload and verify its checksum
    ///
    /// `data` must be exactly the `[header_len, total_len)` slice of the
    /// datagram, so its length is the TCP length of the pseudo-header.
    pub fn decode(src_addr: [u8; 4], dst_addr: [u8; 4], data: &[u8]) -> Result<Self> {
        let header =
            TcpHeader::from_bytes(data).ok_or(Error::Decode("tcp segment is too short"))?;
        let offset = header.data_offset();
        if offset < TCP_HEADER_LEN || offset > data.len() {
            return Err(Error::Decode("tcp data offset out of range"));
        }
        let sum = pseudo_checksum(src_addr, dst_addr, data);
        if sum != 0 {
            return Err(Error::Checksum { computed: sum });
        }

        Ok(TcpSegment {
            header,
            payload: data[offset..].to_vec(),
        })
    }

    /// Serialize header and payload, computing the checksum for the given
    /// addresses
    pub fn encode(&mut self, src_addr: [u8; 4], dst_addr: [u8; 4]) -> Vec<u8> {
        self.header.data_offset_and_flags =
            (DEFAULT_DATA_OFFSET << 12) | (self.header.data_offset_and_flags & flags::MASK);
        self.header.checksum = 0;

        let mut bytes = Vec::with_capacity(TCP_HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.payload);

        self.header.checksum = pseudo_checksum(src_addr, dst_addr, &bytes);
        BigEndian::write_u16(&mut bytes[16..18], self.header.checksum);
        bytes
    }

    /// Number of sequence numbers this segment occupies
    pub fn seq_len(&self) -> u32 {
        let mut len = self.payload.len() as u32;
        if self.header.is_syn() {
            len += 1;
        }
        if self.header.is_fin() {
            len += 1;
        }
        len
    }
}

/// Checksum over the IPv4 pseudo-header followed by `segment`
pub fn pseudo_checksum(src_addr: [u8; 4], dst_addr: [u8; 4], segment: &[u8]) -> u16 {
    let mut buf = Vec::with_capacity(PSEUDO_HEADER_LEN + segment.len());
    buf.extend_from_slice(&src_addr);
    buf.extend_from_slice(&dst_addr);
    buf.push(0);
    buf.push(protocol::TCP);
    buf.extend_from_slice(&(segment.len() as u16).to_be_bytes());
    buf.extend_from_slice(segment);
    checksum(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: [u8; 4] = [10, 1, 0, 2];
    const DST: [u8; 4] = [10, 1, 0, 1];

    #[test]
    fn test_encode_decode() {
        let mut segment = TcpSegment::new(40000, 1337, 0xDEAD_BEEF, 7, flags::ACK | flags::PSH);
        segment.header.window_size = 512;
        segment.header.urgent_ptr = 3;
        segment.payload = b"hello".to_vec();
        let bytes = segment.encode(SRC, DST);
        assert_eq!(bytes.len(), 25);
        assert_eq!(bytes[12], 0x50);
        assert_eq!(bytes[13], 0x18);

        let decoded = TcpSegment::decode(SRC, DST, &bytes).unwrap();
        assert_eq!(decoded, segment);
        assert_eq!(decoded.header.data_offset(), 20);
        assert!(decoded.header.is_ack());
        assert!(!decoded.header.is_syn());
        assert_eq!(pseudo_checksum(SRC, DST, &bytes), 0);
    }

    #[test]
    fn test_checksum_covers_addresses() {
        let bytes = TcpSegment::new(1, 2, 3, 4, flags::SYN).encode(SRC, DST);
        assert!(matches!(
            TcpSegment::decode(SRC, [10, 1, 0, 3], &bytes),
            Err(Error::Checksum { .. })
        ));
    }

    #[test]
    fn test_corrupt_payload() {
        let mut segment = TcpSegment::new(1, 2, 3, 4, flags::ACK);
        segment.payload = b"abc".to_vec();
        let mut bytes = segment.encode(SRC, DST);
        bytes[21] ^= 0x20;
        assert!(matches!(
            TcpSegment::decode(SRC, DST, &bytes),
            Err(Error::Checksum { .. })
        ));
    }

    #[test]
    fn test_reject_malformed() {
        let bytes = TcpSegment::new(1, 2, 3, 4, flags::SYN).encode(SRC, DST);
        assert!(matches!(
            TcpSegment::decode(SRC, DST, &bytes[..19]),
            Err(Error::Decode(_))
        ));

        let mut bad_offset = bytes.clone();
        bad_offset[12] = 0x60; // 24 bytes of header in a 20-byte segment
        assert!(matches!(
            TcpSegment::decode(SRC, DST, &bad_offset),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_set_flags_keeps_offset() {
        let mut header = TcpSegment::new(1, 2, 3, 4, flags::SYN).header;
        header.set_flags(flags::SYN | flags::ACK);
        assert_eq!(header.data_offset(), 20);
        assert_eq!(header.flags(), flags::SYN | flags::ACK);
    }

    #[test]
    fn test_seq_len() {
        let mut segment = TcpSegment::new(1, 2, 3, 4, flags::SYN);
        assert_eq!(segment.seq_len(), 1);
        segment.header.set_flags(flags::FIN | flags::ACK);
        segment.payload = vec![0; 10];
        assert_eq!(segment.seq_len(), 11);
    }
}
