//! Ethernet frame header.

use crate::protocols::packet::PacketParseError;

use anyhow::{bail, Result};
use byteorder::{ByteOrder, NetworkEndian};
use pnet::datalink::MacAddr;

/// EtherType for IPv4. The pipeline only admits this one.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

const HDR_SIZE: usize = 14;

/// An Ethernet frame header.
///
/// VLAN tags are not parsed; a tagged frame decodes with the TPID as its
/// EtherType and is skipped by the IPv4-only admission check.
#[derive(Debug, Clone, Copy)]
pub struct Ethernet {
    /// Destination MAC address.
    pub dst: MacAddr,
    /// Source MAC address.
    pub src: MacAddr,
    /// Encapsulated protocol identifier.
    pub ether_type: u16,
}

impl Ethernet {
    /// Parses the header from `data` and returns it with the residual
    /// payload span.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < HDR_SIZE {
            bail!(PacketParseError::Truncated);
        }
        let header = Ethernet {
            dst: MacAddr::new(data[0], data[1], data[2], data[3], data[4], data[5]),
            src: MacAddr::new(data[6], data[7], data[8], data[9], data[10], data[11]),
            ether_type: NetworkEndian::read_u16(&data[12..14]),
        };
        Ok((header, &data[HDR_SIZE..]))
    }
}
