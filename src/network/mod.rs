//! Network layer protocols implementation
//!
//! This module contains implementations for network layer protocols:
//! - IPv4: Internet Protocol version 4
//! - ICMP: Internet Control Message Protocol (echo only)

pub mod icmp;
pub mod ipv4;

// Re-export commonly used items
pub use icmp::{EchoBody, IcmpMessage, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};
pub use ipv4::{protocol, Ipv4Datagram, Ipv4Header};

/// Calculate the Internet checksum starting from `initial`
///
/// Sums big-endian 16-bit words, folding the carry back in after every
/// addition. An odd trailing byte is the high byte of a final word.
/// Returns the one's complement of the folded sum.
pub fn checksum16(data: &[u8], initial: u16) -> u16 {
    let mut sum = initial as u32;

    for chunk in data.chunks(2) {
        let word = match *chunk {
            [hi, lo] => u16::from_be_bytes([hi, lo]),
            [hi] => u16::from_be_bytes([hi, 0]),
            _ => 0,
        };
        sum += word as u32;
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Calculate the Internet checksum of `data`
///
/// Used for IPv4 headers and ICMP messages. Summing a structure whose checksum
/// field is already populated yields zero when it is intact.
pub fn checksum(data: &[u8]) -> u16 {
    checksum16(data, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc1071_example() {
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&data), !0xddf2);
    }

    #[test]
    fn test_odd_length_pads_low_byte() {
        assert_eq!(checksum(&[0x12]), !0x1200);
        assert_eq!(checksum(&[0x12, 0x34, 0x56]), !(0x1234u16 + 0x5600));
    }

    #[test]
    fn test_carry_is_folded() {
        // 0xffff + 0x0001 = 0x1_0000, folds to 0x0001
        assert_eq!(checksum(&[0xff, 0xff, 0x00, 0x01]), !0x0001);
    }

    #[test]
    fn test_written_checksum_sums_to_zero() {
        let mut buf = vec![0x45, 0x00, 0x00, 0x1c, 0xbe, 0xef, 0x00, 0x00, 0x40, 0x01];
        buf.extend_from_slice(&[0, 0, 10, 1, 0, 2, 10, 1, 0, 1, 0x7f]);
        let sum = checksum(&buf);
        buf[10..12].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(checksum(&buf), 0);
    }

    #[test]
    fn test_initial_value_is_added() {
        let data = [0x10, 0x00];
        assert_eq!(checksum16(&data, 0x0200), !0x1200);
    }
}
