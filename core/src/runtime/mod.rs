//! Pipeline runtime.
//!
//! Wires the capture source to the worker through the SPSC ring, runs the
//! worker's decode → flow → reassembly → detect sequence, and funnels alerts
//! to the sink writer. One capture thread, one worker, one sink, plus the
//! optional stats sampler; shutdown is a single flag followed by an ordered
//! drain (capture first, then the ring, then the alert queue).

use crate::capture::{
    diversion::DiversionSource, sim::SimSource, CaptureSource, DecisionCallback, Frame,
    FrameCallback, LinkType,
};
use crate::config::{CaptureMode, RuntimeConfig};
use crate::detect::{rules, Engine, RuleMatch};
use crate::flowtable::reassembly::{TcpStream, SEGMENT_TIMEOUT};
use crate::flowtable::{FlowKey, FlowTable};
use crate::output::{self, Alert, AlertWriter};
use crate::protocols::packet::ethernet::{Ethernet, ETHERTYPE_IPV4};
use crate::protocols::packet::ipv4::Ipv4;
use crate::protocols::packet::tcp::{Tcp, TCP_PROTOCOL};
use crate::protocols::packet::udp::{Udp, UDP_PROTOCOL};
use crate::protocols::stream::{dns, http};
use crate::stats::{self, Stats};
use crate::utils::mpsc;
use crate::utils::spsc;
use crate::utils::timer::TimerHeap;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

/// Interval between synthetic frames from the built-in generators.
const SYNTH_FRAME_INTERVAL: Duration = Duration::from_millis(10);
/// Worker idle sleep when the ring is empty.
const WORKER_IDLE_SLEEP: Duration = Duration::from_millis(1);
/// Producer backoff while the ring is full.
const PUSH_BACKOFF: Duration = Duration::from_micros(100);

/// Worker-owned inspection state: the decode chain, flow table, reassembly,
/// detection engine, and alert producer. No synchronization; exactly one
/// thread drives it.
pub struct Inspector {
    flows: FlowTable,
    engine: Engine,
    alerts: mpsc::Sender<Alert>,
    stats: Arc<Stats>,
    sweeps: TimerHeap<FlowKey>,
}

impl Inspector {
    pub fn new(
        engine: Engine,
        flow_capacity: usize,
        alerts: mpsc::Sender<Alert>,
        stats: Arc<Stats>,
    ) -> Self {
        Inspector {
            flows: FlowTable::with_capacity(flow_capacity),
            engine,
            alerts,
            stats,
            sweeps: TimerHeap::new(),
        }
    }

    /// Runs one frame through decode → flow update → reassembly → detection.
    /// Malformed frames are counted and skipped; a frame that decodes but
    /// matches nothing is the nominal case.
    pub fn process_frame(&mut self, frame: &Frame) {
        Stats::bump(&self.stats.packets_processed);
        let data = frame.data.as_slice();

        let l3 = match frame.link {
            LinkType::Ethernet => {
                let (eth, l3) = match Ethernet::parse(data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        log::debug!("link decode failed: {}", e);
                        Stats::bump(&self.stats.decode_failures);
                        return;
                    }
                };
                if eth.ether_type != ETHERTYPE_IPV4 {
                    log::trace!("skipping ethertype {:#06x}", eth.ether_type);
                    return;
                }
                l3
            }
            LinkType::None => data,
        };

        let (ip, l4) = match Ipv4::parse(l3) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("ipv4 decode failed: {}", e);
                Stats::bump(&self.stats.decode_failures);
                return;
            }
        };

        let mut key = FlowKey {
            src_ip: ip.src_addr,
            dst_ip: ip.dst_addr,
            src_port: 0,
            dst_port: 0,
            proto: ip.protocol,
        };

        match ip.protocol {
            TCP_PROTOCOL => {
                let (tcp, payload) = match Tcp::parse(l4) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        log::debug!("tcp decode failed: {}", e);
                        Stats::bump(&self.stats.decode_failures);
                        return;
                    }
                };
                key.src_port = tcp.src_port;
                key.dst_port = tcp.dst_port;
                self.process_tcp(key, &tcp, payload, frame);
            }
            UDP_PROTOCOL => {
                let (udp, payload) = match Udp::parse(l4) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        log::debug!("udp decode failed: {}", e);
                        Stats::bump(&self.stats.decode_failures);
                        return;
                    }
                };
                key.src_port = udp.src_port;
                key.dst_port = udp.dst_port;
                let flow = self.flows.touch(key, frame.ts);
                flow.bytes += frame.data.len() as u64;

                if udp.src_port == 53 || udp.dst_port == 53 {
                    self.observe_dns(payload, &key);
                }
                self.scan_datagram(payload, &key);
            }
            _ => {
                let flow = self.flows.touch(key, frame.ts);
                flow.bytes += frame.data.len() as u64;
                self.scan_datagram(l4, &key);
            }
        }
    }

    fn process_tcp(&mut self, key: FlowKey, tcp: &Tcp, payload: &[u8], frame: &Frame) {
        let now = frame.ts;
        let flow = self.flows.touch(key, now);
        flow.bytes += frame.data.len() as u64;

        let stream = flow.tcp.get_or_insert_with(TcpStream::new);
        // A SYN occupies one sequence number; data starts after it.
        let seq = if tcp.syn() {
            tcp.seq_no.wrapping_add(1)
        } else {
            tcp.seq_no
        };
        stream.set_initial_seq(seq);
        stream.add_segment(seq, payload, now);

        if http::looks_like_http(payload) {
            match http::parse_request(payload) {
                Some(req) => log::info!("http {} {} ({})", req.method, req.uri, key),
                None => log::debug!("payload resembles http but did not parse"),
            }
        }

        if stream.pending_segments() > 0 && !stream.sweep_armed() {
            stream.set_sweep_armed(true);
            self.sweeps.push(now + SEGMENT_TIMEOUT, key);
        }

        if stream.has_new_data() {
            // The whole emitted buffer is rescanned so matches straddling
            // segment boundaries fire; only matches ending past the scanned
            // prefix are new occurrences.
            let scanned_before = stream.scanned_len();
            let hits = self.engine.scan(stream.emitted(), Some(&key));
            for hit in &hits {
                if hit.end() > scanned_before {
                    emit_alert(&self.alerts, &self.stats, hit, &key);
                }
            }
            stream.mark_consumed();
        }
    }

    /// Scans a complete datagram payload; every hit is a fresh occurrence.
    fn scan_datagram(&mut self, payload: &[u8], key: &FlowKey) {
        let hits = self.engine.scan(payload, Some(key));
        for hit in &hits {
            emit_alert(&self.alerts, &self.stats, hit, key);
        }
    }

    fn observe_dns(&mut self, payload: &[u8], key: &FlowKey) {
        match dns::parse_questions(payload) {
            Some(questions) => {
                for q in &questions {
                    Stats::bump(&self.stats.dns_queries);
                    log::info!("dns query {} (type {}) on {}", q.name, q.qtype, key);
                }
            }
            None => log::debug!("non-dns payload on port 53 ({})", key),
        }
    }

    /// Fires due idle-segment sweeps. A stream with pending segments keeps
    /// its deadline armed until the holes fill or the segments expire.
    pub fn run_sweeps(&mut self, now: Instant) {
        while let Some(key) = self.sweeps.pop_expired(now) {
            if let Some(flow) = self.flows.get_mut(&key) {
                if let Some(stream) = flow.tcp.as_mut() {
                    stream.sweep_pending(now);
                    if stream.pending_segments() > 0 {
                        self.sweeps.push(now + SEGMENT_TIMEOUT, key);
                    } else {
                        stream.set_sweep_armed(false);
                    }
                }
            }
        }
    }

    /// The flow table, for reporting and tests.
    pub fn flows(&self) -> &FlowTable {
        &self.flows
    }
}

fn emit_alert(alerts: &mpsc::Sender<Alert>, stats: &Stats, hit: &RuleMatch<'_>, key: &FlowKey) {
    Stats::bump(&stats.alerts_generated);
    log::debug!(
        "rule {} at offset {}, context {:?}",
        hit.rule.id,
        hit.position,
        String::from_utf8_lossy(&hit.context)
    );
    alerts.push(Alert::new(hit.rule, key));
}

fn worker_loop(
    mut inspector: Inspector,
    mut ring: spsc::RingConsumer<Frame>,
    drain: Arc<AtomicBool>,
) -> Inspector {
    loop {
        match ring.try_pop() {
            Some(frame) => inspector.process_frame(&frame),
            None => {
                if drain.load(Ordering::Acquire) {
                    break;
                }
                inspector.run_sweeps(Instant::now());
                thread::sleep(WORKER_IDLE_SLEEP);
            }
        }
    }
    inspector
}

/// The inspection pipeline runtime.
///
/// Construction loads rules and opens the configured capture source (both
/// are initialization failures surfaced to the operator);
/// [`run`](Runtime::run) starts the threads and blocks until shutdown.
pub struct Runtime {
    config: RuntimeConfig,
    source: CaptureSource,
    engine: Option<Engine>,
    stats: Arc<Stats>,
    done: Arc<AtomicBool>,
    rules_loaded: usize,
}

impl Runtime {
    /// Creates a runtime from `config`.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let stats = Stats::new();
        let loaded = if config.rule_files.is_empty() {
            log::info!("no rule files configured, using stock rules");
            rules::default_rules()
        } else {
            rules::load_rule_files(&config.rule_files)?
        };
        let rules_loaded = loaded.len();
        let mut engine = Engine::new();
        for rule in loaded {
            engine.add_rule(rule);
        }
        engine.build();
        log::info!("detection engine ready with {} rules", rules_loaded);

        let source = match config.capture_mode {
            CaptureMode::Simulation => {
                CaptureSource::Simulation(SimSource::new(SYNTH_FRAME_INTERVAL))
            }
            CaptureMode::Live => {
                #[cfg(feature = "live")]
                {
                    CaptureSource::Live(crate::capture::live::LiveSource::new(
                        config.interface_name.clone(),
                    ))
                }
                #[cfg(not(feature = "live"))]
                {
                    anyhow::bail!("capture_mode = \"live\" requires the `live` feature")
                }
            }
            CaptureMode::Diversion => CaptureSource::Diversion(DiversionSource::new(
                config.diversion_filter.clone(),
                SYNTH_FRAME_INTERVAL,
                Arc::clone(&stats),
            )),
        };

        Ok(Runtime {
            config,
            source,
            engine: Some(engine),
            stats,
            done: Arc::new(AtomicBool::new(false)),
            rules_loaded,
        })
    }

    /// Installs the IPS decision callback on the diversion source.
    pub fn set_decision_callback(&mut self, decision: DecisionCallback) {
        self.source.set_decision_callback(decision);
    }

    /// Flag that stops the pipeline when set. Also set by SIGINT/SIGTERM.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.done)
    }

    /// Shared pipeline counters.
    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Starts capture, worker, sink, and sampler, then blocks until the
    /// shutdown flag is set. Drains in order: capture stops first, the
    /// worker finishes the ring, the sink flushes the alert queue.
    pub fn run(mut self) -> Result<()> {
        log::info!(
            "starting pipeline: mode {:?}, ring {}, flow table {}",
            self.config.capture_mode,
            self.config.ring_buffer_size,
            self.config.flow_table_size
        );

        let engine = self
            .engine
            .take()
            .ok_or_else(|| anyhow!("runtime already consumed"))?;
        let (mut producer, consumer) = spsc::ring::<Frame>(self.config.ring_buffer_size);
        let (alert_tx, alert_rx) = mpsc::queue::<Alert>();

        let sink_stop = Arc::new(AtomicBool::new(false));
        let writer = AlertWriter::open(self.config.alert_file.as_deref().map(Path::new))?;
        let sink = output::spawn_sink(alert_rx, writer, Arc::clone(&sink_stop));

        let inspector = Inspector::new(
            engine,
            self.config.flow_table_size,
            alert_tx,
            Arc::clone(&self.stats),
        );
        let drain = Arc::new(AtomicBool::new(false));
        let worker_drain = Arc::clone(&drain);
        let worker = thread::Builder::new()
            .name("worker".to_owned())
            .spawn(move || worker_loop(inspector, consumer, worker_drain))
            .context("spawn worker thread")?;

        let sampler = if self.config.enable_stats {
            Some(stats::spawn_sampler(
                Arc::clone(&self.stats),
                Duration::from_secs(self.config.stats_interval_seconds),
                Arc::clone(&self.done),
            ))
        } else {
            None
        };

        // Capture callback: spin-with-backoff into the ring; drop only once
        // shutdown is signalled.
        let done = Arc::clone(&self.done);
        let stats = Arc::clone(&self.stats);
        let callback: FrameCallback = Box::new(move |frame: Frame| {
            let mut pending = frame;
            loop {
                match producer.try_push(pending) {
                    Ok(()) => return,
                    Err(back) => {
                        if done.load(Ordering::Acquire) {
                            Stats::bump(&stats.frames_dropped);
                            return;
                        }
                        pending = back;
                        thread::sleep(PUSH_BACKOFF);
                    }
                }
            }
        });
        self.source.start(callback)?;

        let done = Arc::clone(&self.done);
        if let Err(e) = ctrlc::set_handler(move || done.store(true, Ordering::Release)) {
            log::warn!("signal handler unavailable: {}", e);
        }

        while !self.done.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(100));
        }

        log::info!("shutting down: stopping capture");
        self.source.stop();
        drain.store(true, Ordering::Release);
        let inspector = worker
            .join()
            .map_err(|_| anyhow!("worker thread panicked"))?;
        sink_stop.store(true, Ordering::Release);
        sink.join().map_err(|_| anyhow!("alert sink panicked"))?;
        if let Some(sampler) = sampler {
            let _ = sampler.join();
        }

        log::info!(
            "tracked flows at shutdown: {} ({} evicted)",
            inspector.flows().len(),
            inspector.flows().evictions()
        );
        self.stats.final_report(self.rules_loaded);
        Ok(())
    }
}
