//! Types for parsing packet-level network protocols.
//!
//! Each decoder is a stateless function over a byte span: it reads the fixed
//! header, validates lengths, and hands back the header struct together with
//! the residual payload span. A frame that fails to decode is skipped by the
//! pipeline and counted; decode failure is never fatal.

pub mod ethernet;
pub mod ipv4;
pub mod tcp;
pub mod udp;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketParseError {
    #[error("span too short for header")]
    Truncated,

    #[error("unsupported IP version")]
    BadVersion,

    #[error("header length field out of range")]
    BadHeaderLength,
}
