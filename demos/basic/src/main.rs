use sentinel_core::capture::payload_substring_policy;
use sentinel_core::config::{default_config, load_config, CaptureMode};
use sentinel_core::Runtime;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
struct Args {
    /// Path to the TOML configuration file; defaults run the simulator.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[clap(long)]
    duration: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => default_config(),
    };
    let diversion = config.capture_mode == CaptureMode::Diversion;

    let mut runtime = Runtime::new(config)?;
    if diversion {
        // Stock IPS policy: refuse to reinject frames carrying "malicious".
        runtime.set_decision_callback(payload_substring_policy("malicious"));
    }

    if let Some(seconds) = args.duration {
        let shutdown = runtime.shutdown_flag();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(seconds));
            shutdown.store(true, Ordering::Release);
        });
    }

    runtime.run()
}
