use crate::error::{Error, Result};
use crate::iface::interface::NetworkInterface;
use crate::iface::Outcome;
use crate::link::ethernet::EthernetFrame;
use crate::network::icmp;
use crate::network::ipv4::{protocol, Ipv4Datagram};

impl NetworkInterface {
    /// Handle the datagram carried by `frame`
    ///
    /// On `Outcome::Reply` the frame holds the answer, addressed back along
    /// the path the datagram arrived on.
    pub(crate) fn process_ipv4(&self, frame: &mut EthernetFrame) -> Result<Outcome> {
        let mut datagram = Ipv4Datagram::decode(&frame.payload)?;
        let header = &datagram.header;
        log::trace!(
            "ip {:?} -> {:?} proto {} len {}",
            header.src_addr,
            header.dst_addr,
            header.protocol,
            header.total_len
        );

        if header.dst_addr != self.identity.protocol_address {
            return Err(Error::AddressMismatch);
        }

        // Dispatch based on protocol
        let outcome = match datagram.header.protocol {
            protocol::ICMP => icmp::handle(&mut datagram)?,
            protocol::TCP => self.tcp.handle(&datagram, frame.src_addr)?,
            _ => return Err(Error::Unsupported("ip protocol")),
        };

        if outcome == Outcome::Reply {
            datagram.swap_addresses();
            frame.payload = datagram.encode();
            frame.dst_addr = frame.src_addr;
        }
        Ok(outcome)
    }
}
