//! Configuration options.
//!
//! The engine reads a TOML configuration file defining the capture mode,
//! queue and table sizes, rule files, and statistics output. The path is
//! typically a command line argument of the embedding application.
//!
//! ```toml
//! capture_mode = "simulation"
//! ring_buffer_size = 1024
//! flow_table_size = 8192
//! rule_files = ["configs/sample.rules"]
//! enable_stats = true
//! stats_interval_seconds = 5
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Loads a configuration file from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let config: RuntimeConfig = toml::from_str(&config_str)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    config.validate();
    Ok(config)
}

/// The default configuration: simulation capture, stock sizes, stats on.
/// For demonstration purposes, not tuned for performance.
pub fn default_config() -> RuntimeConfig {
    RuntimeConfig::default()
}

/// Which producer feeds the pipeline.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Deterministic synthetic traffic generator.
    Simulation,
    /// Live link-layer capture (requires the `live` feature).
    Live,
    /// Diversion driver: per-frame pass/drop verdicts are enforced before
    /// reinjection (IPS mode).
    Diversion,
}

/// Runtime configuration options.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    /// Capture source variant. Defaults to `simulation`.
    #[serde(default = "default_capture_mode")]
    pub capture_mode: CaptureMode,

    /// Adapter-specific interface identifier (live capture).
    #[serde(default)]
    pub interface_name: String,

    /// Filter expression handed to the diversion adapter.
    #[serde(default = "default_diversion_filter")]
    pub diversion_filter: String,

    /// Capacity of the capture-to-worker ring. Defaults to `1024`.
    #[serde(default = "default_ring_buffer_size")]
    pub ring_buffer_size: usize,

    /// Maximum number of concurrently tracked flows. Defaults to `8192`.
    #[serde(default = "default_flow_table_size")]
    pub flow_table_size: usize,

    /// Reserved; the current pipeline runs exactly one worker.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Rule files to load, in order. Empty means the stock rule set.
    #[serde(default)]
    pub rule_files: Vec<String>,

    /// Whether to run the statistics sampler. Defaults to `true`.
    #[serde(default = "default_enable_stats")]
    pub enable_stats: bool,

    /// Sampler period in seconds. Defaults to `5`.
    #[serde(default = "default_stats_interval_seconds")]
    pub stats_interval_seconds: u64,

    /// Append alerts to this file instead of stdout.
    #[serde(default)]
    pub alert_file: Option<String>,
}

impl RuntimeConfig {
    fn validate(&self) {
        if self.worker_threads > 1 {
            log::warn!(
                "worker_threads = {} is reserved; running a single worker",
                self.worker_threads
            );
        }
    }
}

fn default_capture_mode() -> CaptureMode {
    CaptureMode::Simulation
}

fn default_diversion_filter() -> String {
    "true".to_owned()
}

fn default_ring_buffer_size() -> usize {
    1024
}

fn default_flow_table_size() -> usize {
    8192
}

fn default_worker_threads() -> usize {
    1
}

fn default_enable_stats() -> bool {
    true
}

fn default_stats_interval_seconds() -> u64 {
    5
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            capture_mode: default_capture_mode(),
            interface_name: String::new(),
            diversion_filter: default_diversion_filter(),
            ring_buffer_size: default_ring_buffer_size(),
            flow_table_size: default_flow_table_size(),
            worker_threads: default_worker_threads(),
            rule_files: vec![],
            enable_stats: default_enable_stats(),
            stats_interval_seconds: default_stats_interval_seconds(),
            alert_file: None,
        }
    }
}
