//! Deterministic traffic simulator.
//!
//! Emits synthetic ethernet/IPv4 frames on a fixed interval, alternating a
//! benign payload with one that trips the stock rule set. The frame builders
//! are public: integration tests use them to assemble exact wire bytes.

use super::{Frame, FrameCallback, LinkType};
use crate::protocols::packet::tcp::{ACK, PSH};

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use byteorder::{ByteOrder, NetworkEndian};

const ETH_HDR: usize = 14;
const IP_HDR: usize = 20;
const TCP_HDR: usize = 20;
const UDP_HDR: usize = 8;

/// Assembles an IPv4+TCP packet starting at the network layer.
pub fn build_tcp_packet(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    seq: u32,
    payload: &[u8],
) -> Vec<u8> {
    let total = IP_HDR + TCP_HDR + payload.len();
    let mut packet = vec![0u8; total];

    packet[0] = 0x45;
    NetworkEndian::write_u16(&mut packet[2..4], total as u16);
    packet[6] = 0x40; // don't fragment
    packet[8] = 64; // ttl
    packet[9] = 6; // TCP
    packet[12..16].copy_from_slice(&src.octets());
    packet[16..20].copy_from_slice(&dst.octets());

    let tcp = &mut packet[IP_HDR..];
    NetworkEndian::write_u16(&mut tcp[0..2], src_port);
    NetworkEndian::write_u16(&mut tcp[2..4], dst_port);
    NetworkEndian::write_u32(&mut tcp[4..8], seq);
    tcp[12] = 0x50; // data offset 5 words
    tcp[13] = PSH | ACK;
    NetworkEndian::write_u16(&mut tcp[14..16], 0x0100);
    tcp[TCP_HDR..].copy_from_slice(payload);
    packet
}

/// Assembles an IPv4+UDP packet starting at the network layer.
pub fn build_udp_packet(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let total = IP_HDR + UDP_HDR + payload.len();
    let mut packet = vec![0u8; total];

    packet[0] = 0x45;
    NetworkEndian::write_u16(&mut packet[2..4], total as u16);
    packet[8] = 64;
    packet[9] = 17; // UDP
    packet[12..16].copy_from_slice(&src.octets());
    packet[16..20].copy_from_slice(&dst.octets());

    let udp = &mut packet[IP_HDR..];
    NetworkEndian::write_u16(&mut udp[0..2], src_port);
    NetworkEndian::write_u16(&mut udp[2..4], dst_port);
    NetworkEndian::write_u16(&mut udp[4..6], (UDP_HDR + payload.len()) as u16);
    udp[UDP_HDR..].copy_from_slice(payload);
    packet
}

/// Wraps a network-layer packet in an ethernet header carrying IPv4.
pub fn wrap_ethernet(packet: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; ETH_HDR + packet.len()];
    frame[..6].fill(0xaa);
    frame[6..12].fill(0xbb);
    frame[12] = 0x08;
    frame[13] = 0x00;
    frame[ETH_HDR..].copy_from_slice(packet);
    frame
}

/// Assembles a complete ethernet+IPv4+TCP frame.
pub fn build_tcp_frame(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    seq: u32,
    payload: &[u8],
) -> Vec<u8> {
    wrap_ethernet(&build_tcp_packet(src, src_port, dst, dst_port, seq, payload))
}

/// Assembles a complete ethernet+IPv4+UDP frame.
pub fn build_udp_frame(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    wrap_ethernet(&build_udp_packet(src, src_port, dst, dst_port, payload))
}

/// Assembles a DNS query payload with a single question (`qtype`, class IN).
pub fn build_dns_query(name: &str, qtype: u16) -> Vec<u8> {
    let mut payload = vec![0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    for label in name.split('.') {
        payload.push(label.len() as u8);
        payload.extend_from_slice(label.as_bytes());
    }
    payload.push(0);
    let mut tail = [0u8; 4];
    NetworkEndian::write_u16(&mut tail[0..2], qtype);
    NetworkEndian::write_u16(&mut tail[2..4], 1);
    payload.extend_from_slice(&tail);
    payload
}

/// The deterministic simulator source.
pub struct SimSource {
    interval: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimSource {
    pub fn new(interval: Duration) -> Self {
        SimSource {
            interval,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub(crate) fn start(&mut self, mut callback: FrameCallback) -> Result<()> {
        self.stop();
        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("capture-sim".to_owned())
            .spawn(move || {
                let src = Ipv4Addr::new(192, 168, 1, 10);
                let dst = Ipv4Addr::new(93, 184, 216, 34);
                let mut seq = 1u32;
                let mut toggle = false;
                while running.load(Ordering::Acquire) {
                    toggle = !toggle;
                    let payload: &[u8] = if toggle { b"testpattern" } else { b"hello" };
                    let bytes = build_tcp_frame(src, 12345, dst, 80, seq, payload);
                    seq = seq.wrapping_add(payload.len() as u32);
                    callback(Frame::new(bytes, LinkType::Ethernet));
                    thread::sleep(interval);
                }
            })
            .expect("spawn simulator thread");
        self.handle = Some(handle);
        Ok(())
    }

    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimSource {
    fn drop(&mut self) {
        self.stop();
    }
}
