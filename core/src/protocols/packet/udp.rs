//! UDP datagram header.

use crate::protocols::packet::PacketParseError;

use anyhow::{bail, Result};
use byteorder::{ByteOrder, NetworkEndian};

/// UDP assigned protocol number.
pub const UDP_PROTOCOL: u8 = 17;

const HDR_SIZE: usize = 8;

/// A UDP header.
#[derive(Debug, Clone, Copy)]
pub struct Udp {
    /// Sending port.
    pub src_port: u16,
    /// Receiving port.
    pub dst_port: u16,
    /// Length of header plus payload in bytes, as carried on the wire.
    pub length: u16,
    /// Checksum (not verified).
    pub checksum: u16,
}

impl Udp {
    /// Parses the header from `data` and returns it with the residual
    /// payload span.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < HDR_SIZE {
            bail!(PacketParseError::Truncated);
        }
        let header = Udp {
            src_port: NetworkEndian::read_u16(&data[0..2]),
            dst_port: NetworkEndian::read_u16(&data[2..4]),
            length: NetworkEndian::read_u16(&data[4..6]),
            checksum: NetworkEndian::read_u16(&data[6..8]),
        };
        Ok((header, &data[HDR_SIZE..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_udp_parse() {
        let mut data = vec![0u8; 12];
        NetworkEndian::write_u16(&mut data[0..2], 53124);
        NetworkEndian::write_u16(&mut data[2..4], 53);
        NetworkEndian::write_u16(&mut data[4..6], 12);
        data[8..].copy_from_slice(b"abcd");
        let (udp, payload) = Udp::parse(&data).unwrap();
        assert_eq!(udp.src_port, 53124);
        assert_eq!(udp.dst_port, 53);
        assert_eq!(payload, b"abcd");
    }

    #[test]
    fn core_udp_too_short() {
        assert!(Udp::parse(&[0u8; 7]).is_err());
    }
}
