//! Diversion (IPS) driver.
//!
//! In diversion mode every frame passes through a decision callback before
//! it reaches the inspection pipeline. A `Pass` verdict reinjects the frame
//! toward its destination; a `Drop` verdict discards it. The verdict only
//! gates forwarding: dropped frames still flow to the inspection callback,
//! so detection sees (and alerts on) blocked traffic.
//!
//! Frames from this source begin at the network layer
//! ([`LinkType::None`](super::LinkType::None)); the platform diversion layer
//! strips the link header before hand-off. The generator below stands in for
//! that layer with synthetic traffic matching the configured filter's shape.

use super::{sim, DecisionCallback, Frame, FrameCallback, LinkType, Verdict};
use crate::stats::Stats;

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;

/// The diversion capture source.
pub struct DiversionSource {
    filter: String,
    interval: Duration,
    decision: Option<DecisionCallback>,
    stats: Arc<Stats>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DiversionSource {
    pub fn new(filter: impl Into<String>, interval: Duration, stats: Arc<Stats>) -> Self {
        DiversionSource {
            filter: filter.into(),
            interval,
            decision: None,
            stats,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Installs the pass/drop hook. Without one, every frame passes.
    pub fn set_decision_callback(&mut self, decision: DecisionCallback) {
        self.decision = Some(decision);
    }

    /// Runs one frame through the verdict-then-inspect sequence and returns
    /// the verdict. `Pass` reinjects (a no-op for synthetic traffic);
    /// `Drop` withholds the frame from the network but not from inspection.
    pub fn handle_frame(
        decision: Option<&DecisionCallback>,
        stats: &Stats,
        frame: Frame,
        callback: &mut dyn FnMut(Frame),
    ) -> Verdict {
        let verdict = match decision {
            Some(decide) => decide.as_ref()(&frame),
            None => Verdict::Pass,
        };
        match verdict {
            Verdict::Pass => reinject(&frame),
            Verdict::Drop => {
                Stats::bump(&stats.frames_vetoed);
                log::info!("diversion verdict: drop ({} bytes)", frame.data.len());
            }
        }
        callback(frame);
        verdict
    }

    pub(crate) fn start(&mut self, mut callback: FrameCallback) -> Result<()> {
        self.stop();
        log::info!("diversion capture with filter {:?}", self.filter);
        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let decision = self.decision.clone();
        let stats = Arc::clone(&self.stats);
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("capture-diversion".to_owned())
            .spawn(move || {
                let src = Ipv4Addr::new(192, 168, 1, 20);
                let dst = Ipv4Addr::new(93, 184, 216, 34);
                let mut seq = 1u32;
                let mut toggle = false;
                while running.load(Ordering::Acquire) {
                    toggle = !toggle;
                    let payload: &[u8] = if toggle {
                        b"malicious_payload"
                    } else {
                        b"regular traffic"
                    };
                    let packet = sim::build_tcp_packet(src, 23456, dst, 80, seq, payload);
                    seq = seq.wrapping_add(payload.len() as u32);
                    let frame = Frame::new(packet, LinkType::None);
                    Self::handle_frame(decision.as_ref(), &stats, frame, &mut callback);
                    thread::sleep(interval);
                }
            })
            .expect("spawn diversion thread");
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

impl Drop for DiversionSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reinjection point for passed frames. Synthetic traffic has nowhere to
/// go; a platform diversion layer forwards the frame here.
fn reinject(frame: &Frame) {
    log::trace!("reinjecting {} bytes", frame.data.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::payload_substring_policy;

    #[test]
    fn core_diversion_default_verdict_is_pass() {
        let stats = Stats::new();
        let mut received = Vec::new();
        let frame = Frame::new(b"anything".to_vec(), LinkType::None);
        let verdict =
            DiversionSource::handle_frame(None, &stats, frame, &mut |f| received.push(f));
        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(received.len(), 1);
        assert_eq!(Stats::get(&stats.frames_vetoed), 0);
    }

    #[test]
    fn core_diversion_drop_still_inspected() {
        let stats = Stats::new();
        let policy = payload_substring_policy("malicious");
        let mut received = Vec::new();
        let frame = Frame::new(b"xx malicious_payload xx".to_vec(), LinkType::None);
        let verdict = DiversionSource::handle_frame(Some(&policy), &stats, frame, &mut |f| {
            received.push(f)
        });
        assert_eq!(verdict, Verdict::Drop);
        // The frame is withheld from the network but still inspected.
        assert_eq!(received.len(), 1);
        assert_eq!(Stats::get(&stats.frames_vetoed), 1);
    }
}
