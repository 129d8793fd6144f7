//! Live link-layer capture via libpcap.
//!
//! Enabled by the `live` feature. The capture handle stays on its own
//! thread; open failures are reported synchronously from `start` so an
//! unusable interface surfaces as an initialization error.

use super::{Frame, FrameCallback, LinkType};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use pcap::{Capture, Device};

const SNAPLEN: i32 = 65_535;
/// Read timeout so the loop can observe the stop flag.
const READ_TIMEOUT_MS: i32 = 100;

/// Live capture source.
pub struct LiveSource {
    interface: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LiveSource {
    /// `interface` may be empty, in which case the default device is used.
    pub fn new(interface: impl Into<String>) -> Self {
        LiveSource {
            interface: interface.into(),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    fn device_name(&self) -> Result<String> {
        if !self.interface.is_empty() {
            return Ok(self.interface.clone());
        }
        let device = Device::lookup().context("no capture device available")?;
        Ok(device.name)
    }

    pub(crate) fn start(&mut self, mut callback: FrameCallback) -> Result<()> {
        self.stop();
        let device = self.device_name()?;
        log::info!("live capture on {}", device);
        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);

        // The pcap handle is opened on the capture thread; the open result
        // is reported back before `start` returns.
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let handle = thread::Builder::new()
            .name("capture-live".to_owned())
            .spawn(move || {
                let capture = Capture::from_device(device.as_str())
                    .and_then(|c| c.promisc(true).snaplen(SNAPLEN).timeout(READ_TIMEOUT_MS).open());
                let mut capture = match capture {
                    Ok(capture) => {
                        let _ = ready_tx.send(Ok(()));
                        capture
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!("cannot open {}: {}", device, e)));
                        return;
                    }
                };
                while running.load(Ordering::Acquire) {
                    match capture.next() {
                        Ok(packet) => {
                            callback(Frame::new(packet.data.to_vec(), LinkType::Ethernet));
                        }
                        Err(pcap::Error::TimeoutExpired) => continue,
                        Err(e) => {
                            log::error!("live capture stopped: {}", e);
                            break;
                        }
                    }
                }
            })
            .expect("spawn live capture thread");

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow!("live capture thread exited during startup"))
            }
        }
    }

    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        self.stop();
    }
}
