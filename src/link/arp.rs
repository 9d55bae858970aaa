//! ARP (Address Resolution Protocol) for Ethernet/IPv4
//!
//! Every well-formed message refreshes the translation table with its sender.
//! Requests for the local protocol address are answered in place.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::iface::device::Identity;
use crate::iface::Outcome;
use crate::link::arp_cache::ArpCache;
use crate::link::ethernet::{ethertype, EthernetFrame};

pub const ARP_PACKET_LEN: usize = 28;

pub const HARDWARE_TYPE_ETHERNET: u16 = 0x0001;

/// ARP operation codes
pub mod operation {
    pub const REQUEST: u16 = 1;
    pub const REPLY: u16 = 2;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub hardware_len: u8,
    pub protocol_len: u8,
    pub operation: u16,
    pub sender_hardware_addr: [u8; 6],
    pub sender_protocol_addr: [u8; 4],
    pub target_hardware_addr: [u8; 6],
    pub target_protocol_addr: [u8; 4],
}

impl ArpPacket {
    /// Parse the fixed 28-byte Ethernet/IPv4 layout; trailing padding is ignored
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < ARP_PACKET_LEN {
            return Err(Error::Decode("arp packet is too short"));
        }

        let mut packet = ArpPacket {
            hardware_type: BigEndian::read_u16(&data[0..2]),
            protocol_type: BigEndian::read_u16(&data[2..4]),
            hardware_len: data[4],
            protocol_len: data[5],
            operation: BigEndian::read_u16(&data[6..8]),
            sender_hardware_addr: [0; 6],
            sender_protocol_addr: [0; 4],
            target_hardware_addr: [0; 6],
            target_protocol_addr: [0; 4],
        };
        packet.sender_hardware_addr.copy_from_slice(&data[8..14]);
        packet.sender_protocol_addr.copy_from_slice(&data[14..18]);
        packet.target_hardware_addr.copy_from_slice(&data[18..24]);
        packet.target_protocol_addr.copy_from_slice(&data[24..28]);
        Ok(packet)
    }

    pub fn to_bytes(&self) -> [u8; ARP_PACKET_LEN] {
        let mut bytes = [0u8; ARP_PACKET_LEN];
        BigEndian::write_u16(&mut bytes[0..2], self.hardware_type);
        BigEndian::write_u16(&mut bytes[2..4], self.protocol_type);
        bytes[4] = self.hardware_len;
        bytes[5] = self.protocol_len;
        BigEndian::write_u16(&mut bytes[6..8], self.operation);
        bytes[8..14].copy_from_slice(&self.sender_hardware_addr);
        bytes[14..18].copy_from_slice(&self.sender_protocol_addr);
        bytes[18..24].copy_from_slice(&self.target_hardware_addr);
        bytes[24..28].copy_from_slice(&self.target_protocol_addr);
        bytes
    }

    /// Turn a request into the reply announcing `identity`
    fn into_reply(mut self, identity: &Identity) -> Self {
        self.target_hardware_addr = self.sender_hardware_addr;
        self.target_protocol_addr = self.sender_protocol_addr;
        self.sender_hardware_addr = identity.hardware_address;
        self.sender_protocol_addr = identity.protocol_address;
        self.operation = operation::REPLY;
        self
    }
}

/// Handle the ARP message carried by `frame`
///
/// On `Outcome::Reply` the frame payload holds the reply and its destination
/// is the requester.
pub fn handle(frame: &mut EthernetFrame, identity: &Identity, cache: &ArpCache) -> Result<Outcome> {
    let packet = ArpPacket::decode(&frame.payload)?;
    log::trace!(
        "arp op={} sender {:?}/{:?} target {:?}/{:?}",
        packet.operation,
        packet.sender_hardware_addr,
        packet.sender_protocol_addr,
        packet.target_hardware_addr,
        packet.target_protocol_addr
    );

    if packet.hardware_type != HARDWARE_TYPE_ETHERNET {
        return Err(Error::Unsupported("arp hardware type"));
    }
    if packet.protocol_type != ethertype::IPV4 {
        return Err(Error::Unsupported("arp protocol type"));
    }

    let merged = cache.update(packet.sender_protocol_addr, packet.sender_hardware_addr);
    if !merged {
        cache.insert(packet.sender_protocol_addr, packet.sender_hardware_addr)?;
    }

    if packet.target_protocol_addr != identity.protocol_address {
        return Err(Error::AddressMismatch);
    }

    match packet.operation {
        operation::REQUEST => {
            let reply = packet.into_reply(identity);
            frame.dst_addr = reply.target_hardware_addr;
            frame.payload = reply.to_bytes().to_vec();
            Ok(Outcome::Reply)
        }
        _ => Ok(Outcome::Consumed),
    }
}
