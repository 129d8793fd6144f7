//! IPv4 packet header.

use crate::protocols::packet::PacketParseError;

use std::net::Ipv4Addr;

use anyhow::{bail, Result};
use byteorder::{ByteOrder, NetworkEndian};

const MIN_HDR_SIZE: usize = 20;

/// An IPv4 header.
///
/// Options are accounted for through the IHL but not parsed. Fragmented
/// packets are not reassembled; each fragment decodes on its own.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4 {
    /// IP version (always 4 after a successful parse).
    pub version: u8,
    /// Header length in 32-bit words.
    pub ihl: u8,
    /// Total length of header plus data in bytes, as carried on the wire.
    pub total_length: u16,
    /// Time to live.
    pub time_to_live: u8,
    /// Encapsulated protocol identifier.
    pub protocol: u8,
    /// Sender address.
    pub src_addr: Ipv4Addr,
    /// Receiver address.
    pub dst_addr: Ipv4Addr,
}

impl Ipv4 {
    /// Header length in bytes.
    #[inline]
    pub fn header_len(&self) -> usize {
        usize::from(self.ihl) << 2
    }

    /// Parses the header from `data` and returns it with the residual
    /// payload span.
    ///
    /// A total-length field larger than the span is clamped to the span so a
    /// truncated capture still decodes; a total-length smaller than the
    /// header is rejected.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < MIN_HDR_SIZE {
            bail!(PacketParseError::Truncated);
        }
        let version = data[0] >> 4;
        if version != 4 {
            bail!(PacketParseError::BadVersion);
        }
        let ihl = data[0] & 0x0f;
        let header = Ipv4 {
            version,
            ihl,
            total_length: NetworkEndian::read_u16(&data[2..4]),
            time_to_live: data[8],
            protocol: data[9],
            src_addr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst_addr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        };
        let header_len = header.header_len();
        if ihl < 5 || data.len() < header_len {
            bail!(PacketParseError::BadHeaderLength);
        }
        let total = match header.total_length as usize {
            0 => data.len(),
            n => n.min(data.len()),
        };
        if total < header_len {
            bail!(PacketParseError::BadHeaderLength);
        }
        Ok((header, &data[header_len..total]))
    }
}
