//! ICMP (Internet Control Message Protocol) implementation
//!
//! Only echo is implemented: requests are answered in place, replies are
//! consumed without an answer.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::iface::Outcome;
use crate::network::checksum;
use crate::network::ipv4::Ipv4Datagram;

/// ICMP header length in bytes (type, code, checksum)
const ICMP_HEADER_LEN: usize = 4;
const ECHO_HEADER_LEN: usize = 4;

/// ICMP message types
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;

/// An ICMP message: the 4-byte header plus its type-specific body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpMessage {
    pub msg_type: u8,
    pub msg_code: u8,
    pub checksum: u16,
    pub payload: Vec<u8>,
}

impl IcmpMessage {
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < ICMP_HEADER_LEN {
            return Err(Error::Decode("icmp message is too short"));
        }

        Ok(IcmpMessage {
            msg_type: data[0],
            msg_code: data[1],
            checksum: BigEndian::read_u16(&data[2..4]),
            payload: data[ICMP_HEADER_LEN..].to_vec(),
        })
    }

    /// Serialize the message, recomputing the checksum over the whole of it
    pub fn encode(&mut self) -> Vec<u8> {
        let mut bytes = vec![0u8; ICMP_HEADER_LEN + self.payload.len()];
        bytes[0] = self.msg_type;
        bytes[1] = self.msg_code;
        bytes[ICMP_HEADER_LEN..].copy_from_slice(&self.payload);
        self.checksum = checksum(&bytes);
        BigEndian::write_u16(&mut bytes[2..4], self.checksum);
        bytes
    }

    pub fn is_echo_request(&self) -> bool {
        self.msg_type == ICMP_TYPE_ECHO_REQUEST
    }

    pub fn is_echo_reply(&self) -> bool {
        self.msg_type == ICMP_TYPE_ECHO_REPLY
    }

    /// Rewrite an echo request into its reply
    pub fn handle(&mut self) -> Result<Outcome> {
        if self.is_echo_reply() {
            return Ok(Outcome::Consumed);
        }
        if !self.is_echo_request() {
            return Err(Error::Unsupported("icmp message type"));
        }

        let echo = EchoBody::decode(&self.payload)?;
        log::debug!("icmp echo request id={} seq={}", echo.identifier, echo.sequence);
        self.msg_type = ICMP_TYPE_ECHO_REPLY;
        self.msg_code = 0;
        self.payload = echo.encode();
        Ok(Outcome::Reply)
    }
}

/// Body of an echo request or reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoBody {
    pub identifier: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl EchoBody {
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < ECHO_HEADER_LEN {
            return Err(Error::Decode("echo body is too short"));
        }

        Ok(EchoBody {
            identifier: BigEndian::read_u16(&data[0..2]),
            sequence: BigEndian::read_u16(&data[2..4]),
            payload: data[ECHO_HEADER_LEN..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; ECHO_HEADER_LEN + self.payload.len()];
        BigEndian::write_u16(&mut bytes[0..2], self.identifier);
        BigEndian::write_u16(&mut bytes[2..4], self.sequence);
        bytes[ECHO_HEADER_LEN..].copy_from_slice(&self.payload);
        bytes
    }
}

/// Answer the ICMP message carried by `datagram`
///
/// On `Reply` the datagram payload holds the encoded answer; the caller still
/// turns the datagram around.
pub fn handle(datagram: &mut Ipv4Datagram) -> Result<Outcome> {
    let mut message = IcmpMessage::decode(&datagram.payload)?;
    let outcome = message.handle()?;
    if outcome == Outcome::Reply {
        datagram.payload = message.encode();
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> IcmpMessage {
        let body = EchoBody {
            identifier,
            sequence,
            payload: payload.to_vec(),
        };
        IcmpMessage {
            msg_type: ICMP_TYPE_ECHO_REQUEST,
            msg_code: 0,
            checksum: 0,
            payload: body.encode(),
        }
    }

    #[test]
    fn test_echo_request_reply() {
        let bytes = echo_request(7, 1, b"abc").encode();
        assert_eq!(checksum(&bytes), 0);

        let mut message = IcmpMessage::decode(&bytes).unwrap();
        assert!(message.is_echo_request());
        assert_eq!(message.handle().unwrap(), Outcome::Reply);

        let reply = message.encode();
        assert_eq!(checksum(&reply), 0);

        let decoded = IcmpMessage::decode(&reply).unwrap();
        assert!(decoded.is_echo_reply());
        assert_eq!(decoded.msg_code, 0);
        let echo = EchoBody::decode(&decoded.payload).unwrap();
        assert_eq!(echo.identifier, 7);
        assert_eq!(echo.sequence, 1);
        assert_eq!(echo.payload, b"abc");
    }

    #[test]
    fn test_echo_reply_is_consumed() {
        let mut message = echo_request(1, 1, b"");
        message.msg_type = ICMP_TYPE_ECHO_REPLY;
        assert_eq!(message.handle().unwrap(), Outcome::Consumed);
    }

    #[test]
    fn test_unsupported_type() {
        let mut message = echo_request(1, 1, b"");
        message.msg_type = 3; // destination unreachable
        assert!(matches!(message.handle(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_short_messages() {
        assert!(matches!(IcmpMessage::decode(&[8, 0, 0]), Err(Error::Decode(_))));

        let mut message = IcmpMessage::decode(&[8, 0, 0, 0, 0, 1]).unwrap();
        assert!(matches!(message.handle(), Err(Error::Decode(_))));
    }
}
