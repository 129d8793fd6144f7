//! Capture sources.
//!
//! A source owns a thread and invokes the frame callback once per captured
//! frame, transferring ownership of the frame bytes. Three variants exist:
//! a deterministic simulator, a live link-layer capture (behind the `live`
//! feature), and a diversion driver that additionally enforces per-frame
//! pass/drop verdicts (IPS mode). The variants are a tagged enum dispatched
//! by match, not a trait-object hierarchy.

pub mod diversion;
#[cfg(feature = "live")]
pub mod live;
pub mod sim;

use self::diversion::DiversionSource;
#[cfg(feature = "live")]
use self::live::LiveSource;
use self::sim::SimSource;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

/// Layer at which a frame's bytes begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Frame starts at the network layer (diversion capture).
    None,
    /// Frame starts at the link layer.
    Ethernet,
}

/// One captured unit, handed from a capture source to the pipeline.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic capture timestamp.
    pub ts: Instant,
    /// Owned frame bytes. Ownership transfers with the frame; spans derived
    /// from it inside the worker must not outlive it.
    pub data: Vec<u8>,
    /// Layer tag the pipeline dispatches on.
    pub link: LinkType,
}

impl Frame {
    pub fn new(data: Vec<u8>, link: LinkType) -> Self {
        Frame {
            ts: Instant::now(),
            data,
            link,
        }
    }
}

/// Per-frame sink invoked by a capture source. Called from the source's
/// thread, one frame at a time.
pub type FrameCallback = Box<dyn FnMut(Frame) + Send>;

/// Pass/drop verdict returned by the diversion decision callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Drop,
}

/// Decision hook consulted by the diversion driver before reinjection.
pub type DecisionCallback = Arc<dyn Fn(&Frame) -> Verdict + Send + Sync>;

/// Builds a decision callback that drops any frame whose bytes contain
/// `needle` and passes everything else.
pub fn payload_substring_policy(needle: impl Into<Vec<u8>>) -> DecisionCallback {
    let needle = needle.into();
    Arc::new(move |frame: &Frame| {
        if !needle.is_empty() && frame.data.windows(needle.len()).any(|w| w == needle) {
            Verdict::Drop
        } else {
            Verdict::Pass
        }
    })
}

/// A capture source variant.
pub enum CaptureSource {
    Simulation(SimSource),
    #[cfg(feature = "live")]
    Live(LiveSource),
    Diversion(DiversionSource),
}

impl CaptureSource {
    /// Starts the source's capture thread; frames flow into `callback`
    /// until [`stop`](CaptureSource::stop).
    pub fn start(&mut self, callback: FrameCallback) -> Result<()> {
        match self {
            CaptureSource::Simulation(source) => source.start(callback),
            #[cfg(feature = "live")]
            CaptureSource::Live(source) => source.start(callback),
            CaptureSource::Diversion(source) => source.start(callback),
        }
    }

    /// Stops the capture thread and joins it.
    pub fn stop(&mut self) {
        match self {
            CaptureSource::Simulation(source) => source.stop(),
            #[cfg(feature = "live")]
            CaptureSource::Live(source) => source.stop(),
            CaptureSource::Diversion(source) => source.stop(),
        }
    }

    /// Installs the IPS decision callback. Only meaningful for the
    /// diversion variant; other variants ignore it with a warning.
    pub fn set_decision_callback(&mut self, decision: DecisionCallback) {
        match self {
            CaptureSource::Diversion(source) => source.set_decision_callback(decision),
            _ => log::warn!("decision callback ignored outside diversion mode"),
        }
    }
}
