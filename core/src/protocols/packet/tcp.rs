//! TCP segment header.

use crate::protocols::packet::PacketParseError;

use anyhow::{bail, Result};
use byteorder::{ByteOrder, NetworkEndian};

/// TCP assigned protocol number.
pub const TCP_PROTOCOL: u8 = 6;

// TCP flags.
pub const CWR: u8 = 0b1000_0000;
pub const ECE: u8 = 0b0100_0000;
pub const URG: u8 = 0b0010_0000;
pub const ACK: u8 = 0b0001_0000;
pub const PSH: u8 = 0b0000_1000;
pub const RST: u8 = 0b0000_0100;
pub const SYN: u8 = 0b0000_0010;
pub const FIN: u8 = 0b0000_0001;

const MIN_HDR_SIZE: usize = 20;

/// A TCP header.
///
/// Options are accounted for through the data offset but not parsed.
#[derive(Debug, Clone, Copy)]
pub struct Tcp {
    /// Sending port.
    pub src_port: u16,
    /// Receiving port.
    pub dst_port: u16,
    /// Sequence number.
    pub seq_no: u32,
    /// Acknowledgment number.
    pub ack_no: u32,
    /// Header length in 32-bit words.
    pub data_offset: u8,
    /// Flag bits.
    pub flags: u8,
    /// Receive window.
    pub window: u16,
}

impl Tcp {
    /// Header length in bytes.
    #[inline]
    pub fn header_len(&self) -> usize {
        usize::from(self.data_offset) << 2
    }

    #[inline]
    pub fn syn(&self) -> bool {
        self.flags & SYN != 0
    }

    #[inline]
    pub fn fin(&self) -> bool {
        self.flags & FIN != 0
    }

    #[inline]
    pub fn rst(&self) -> bool {
        self.flags & RST != 0
    }

    /// Parses the header from `data` and returns it with the residual
    /// payload span.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < MIN_HDR_SIZE {
            bail!(PacketParseError::Truncated);
        }
        let header = Tcp {
            src_port: NetworkEndian::read_u16(&data[0..2]),
            dst_port: NetworkEndian::read_u16(&data[2..4]),
            seq_no: NetworkEndian::read_u32(&data[4..8]),
            ack_no: NetworkEndian::read_u32(&data[8..12]),
            data_offset: data[12] >> 4,
            flags: data[13],
            window: NetworkEndian::read_u16(&data[14..16]),
        };
        let header_len = header.header_len();
        if header.data_offset < 5 || data.len() < header_len {
            bail!(PacketParseError::BadHeaderLength);
        }
        Ok((header, &data[header_len..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_segment(payload: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; 20 + payload.len()];
        NetworkEndian::write_u16(&mut data[0..2], 12345);
        NetworkEndian::write_u16(&mut data[2..4], 80);
        NetworkEndian::write_u32(&mut data[4..8], 1000);
        data[12] = 0x50;
        data[13] = PSH | ACK;
        data[20..].copy_from_slice(payload);
        data
    }

    #[test]
    fn core_tcp_parse() {
        let data = sample_segment(b"hello");
        let (tcp, payload) = Tcp::parse(&data).unwrap();
        assert_eq!(tcp.src_port, 12345);
        assert_eq!(tcp.dst_port, 80);
        assert_eq!(tcp.seq_no, 1000);
        assert_eq!(tcp.header_len(), 20);
        assert!(tcp.flags & PSH != 0);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn core_tcp_rejects_bad_data_offset() {
        let mut data = sample_segment(b"");
        data[12] = 0x40;
        assert!(Tcp::parse(&data).is_err());
    }

    #[test]
    fn core_tcp_honors_options_length() {
        let mut data = vec![0u8; 28];
        data[12] = 0x60; // 24-byte header
        data[24..].copy_from_slice(b"data");
        let (tcp, payload) = Tcp::parse(&data).unwrap();
        assert_eq!(tcp.header_len(), 24);
        assert_eq!(payload, b"data");
    }
}
