//! A network intrusion detection and prevention engine.
//!
//! The crate implements the full inspection pipeline for IPv4 traffic:
//! capture hand-off over a wait-free ring, a link → network → transport
//! decode chain, per-flow state with bounded LRU eviction, TCP segment
//! reassembly, and multi-pattern signature detection (Bloom prefilter plus
//! Aho–Corasick) over reassembled application payload. Alerts are emitted as
//! EVE-style JSON lines; in diversion (IPS) mode a per-frame pass/drop
//! verdict is enforced before reinjection.
//!
//! A minimal application wires a configuration to the runtime:
//!
//! ```no_run
//! use sentinel_core::config::default_config;
//! use sentinel_core::Runtime;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = default_config();
//!     let runtime = Runtime::new(config)?;
//!     runtime.run()
//! }
//! ```
//!
//! The capture sources (simulator, live, diversion) are tagged variants of
//! [`capture::CaptureSource`]; the pipeline dispatches on the variant and on
//! each frame's [`capture::LinkType`]. All mutable inspection state is owned
//! by the single worker thread; the only cross-thread structures are the
//! frame ring, the alert queue, and the atomic counters.

pub mod capture;
pub mod config;
pub mod detect;
pub mod flowtable;
pub mod output;
pub mod protocols;
pub mod runtime;
pub mod stats;
pub mod utils;

pub use self::capture::{Frame, LinkType, Verdict};
pub use self::detect::{Engine, Rule};
pub use self::flowtable::{FlowKey, FlowTable};
pub use self::output::Alert;
pub use self::runtime::{Inspector, Runtime};
pub use self::stats::Stats;
