//! Pipeline counters and the periodic sampler.
//!
//! Counters are plain atomics shared by reference across the capture,
//! worker, and sink threads; the sampler logs absolute values and deltas on
//! a fixed tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::tick;

/// Shared pipeline counters.
#[derive(Debug, Default)]
pub struct Stats {
    /// Frames the worker dequeued and decoded (or tried to).
    pub packets_processed: AtomicU64,
    /// Alerts produced by the detection engine.
    pub alerts_generated: AtomicU64,
    /// Frames dropped because the ring stayed full through shutdown.
    pub frames_dropped: AtomicU64,
    /// Frames that failed the decode chain.
    pub decode_failures: AtomicU64,
    /// Frames the diversion policy refused to reinject.
    pub frames_vetoed: AtomicU64,
    /// DNS questions observed.
    pub dns_queries: AtomicU64,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Stats::default())
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Logs final totals at shutdown.
    pub fn final_report(&self, rules_loaded: usize) {
        log::info!(
            "final: packets {} alerts {} dropped {} decode failures {} vetoed {} dns {} rules {}",
            Self::get(&self.packets_processed),
            Self::get(&self.alerts_generated),
            Self::get(&self.frames_dropped),
            Self::get(&self.decode_failures),
            Self::get(&self.frames_vetoed),
            Self::get(&self.dns_queries),
            rules_loaded,
        );
    }
}

/// Spawns the sampler thread: every `interval` it logs counter totals and
/// per-interval deltas. Exits promptly when `stop` is set.
pub fn spawn_sampler(
    stats: Arc<Stats>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("stats-sampler".to_owned())
        .spawn(move || {
            let ticker = tick(interval);
            let mut last_packets = 0u64;
            let mut last_alerts = 0u64;
            loop {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                if ticker.recv_timeout(Duration::from_millis(200)).is_err() {
                    continue;
                }
                let packets = Stats::get(&stats.packets_processed);
                let alerts = Stats::get(&stats.alerts_generated);
                log::info!(
                    "stats: packets {} (+{}) alerts {} (+{}) dropped {} decode failures {}",
                    packets,
                    packets - last_packets,
                    alerts,
                    alerts - last_alerts,
                    Stats::get(&stats.frames_dropped),
                    Stats::get(&stats.decode_failures),
                );
                last_packets = packets;
                last_alerts = alerts;
            }
        })
        .expect("spawn stats sampler thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_stats_counters() {
        let stats = Stats::new();
        Stats::bump(&stats.packets_processed);
        Stats::bump(&stats.packets_processed);
        Stats::bump(&stats.alerts_generated);
        assert_eq!(Stats::get(&stats.packets_processed), 2);
        assert_eq!(Stats::get(&stats.alerts_generated), 1);
        assert_eq!(Stats::get(&stats.frames_dropped), 0);
    }

    #[test]
    fn core_stats_sampler_stops() {
        let stats = Stats::new();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_sampler(stats, Duration::from_secs(60), Arc::clone(&stop));
        stop.store(true, Ordering::Release);
        handle.join().unwrap();
    }
}
