//! Alert records and the alert sink.
//!
//! One JSON object per line, EVE-style:
//!
//! ```json
//! {"timestamp":"...","event_type":"alert","alert":{"signature_id":3,
//!  "signature":"SQL injection attempt"},"src_ip":"192.168.1.10",
//!  "src_port":12345,"dest_ip":"93.184.216.34","dest_port":80}
//! ```
//!
//! Alerts funnel from the worker through the MPSC queue to a single writer
//! thread, which appends lines to stdout or a configured file.

use crate::detect::Rule;
use crate::flowtable::FlowKey;
use crate::utils::mpsc;

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// The rule identification nested inside an alert record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AlertSignature {
    pub signature_id: u32,
    pub signature: String,
}

/// One alert, emitted once per admitted match.
///
/// Field declaration order is the wire order of the JSON object.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Alert {
    pub timestamp: String,
    pub event_type: &'static str,
    pub alert: AlertSignature,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dest_ip: Ipv4Addr,
    pub dest_port: u16,
}

impl Alert {
    /// Builds an alert for `rule` firing on the flow identified by `key`,
    /// stamped with the current wall-clock time.
    pub fn new(rule: &Rule, key: &FlowKey) -> Self {
        Alert {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            event_type: "alert",
            alert: AlertSignature {
                signature_id: rule.id,
                signature: rule.message.clone(),
            },
            src_ip: key.src_ip,
            src_port: key.src_port,
            dest_ip: key.dst_ip,
            dest_port: key.dst_port,
        }
    }

    /// The single-line JSON rendering.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("alert record serializes")
    }
}

/// Where alert lines go.
pub enum AlertWriter {
    Stdout,
    File(BufWriter<std::fs::File>),
}

impl AlertWriter {
    /// Opens the configured destination; `None` means stdout.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(AlertWriter::Stdout),
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("cannot open alert file {}", path.display()))?;
                Ok(AlertWriter::File(BufWriter::new(file)))
            }
        }
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            AlertWriter::Stdout => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                writeln!(out, "{}", line)?;
                out.flush()
            }
            AlertWriter::File(writer) => {
                writeln!(writer, "{}", line)?;
                writer.flush()
            }
        }
    }
}

/// Spawns the sink writer thread. It drains the queue continuously and exits
/// once `stop` is set *and* the queue is empty, so no produced alert is ever
/// lost on shutdown.
pub fn spawn_sink(
    mut alerts: mpsc::Receiver<Alert>,
    mut writer: AlertWriter,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("alert-sink".to_owned())
        .spawn(move || loop {
            match alerts.try_pop() {
                Some(alert) => {
                    if let Err(e) = writer.write_line(&alert.to_line()) {
                        log::error!("alert sink write failed: {}", e);
                    }
                }
                None => {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            }
        })
        .expect("spawn alert sink thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> FlowKey {
        FlowKey {
            src_ip: Ipv4Addr::new(192, 168, 1, 10),
            dst_ip: Ipv4Addr::new(93, 184, 216, 34),
            src_port: 12345,
            dst_port: 80,
            proto: 6,
        }
    }

    #[test]
    fn core_output_alert_line_shape() {
        let rule = Rule::new(3, "SQL injection attempt", b"SELECT * FROM".to_vec());
        let alert = Alert::new(&rule, &sample_key());
        let line = alert.to_line();

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event_type"], "alert");
        assert_eq!(value["alert"]["signature_id"], 3);
        assert_eq!(value["alert"]["signature"], "SQL injection attempt");
        assert_eq!(value["src_ip"], "192.168.1.10");
        assert_eq!(value["src_port"], 12345);
        assert_eq!(value["dest_ip"], "93.184.216.34");
        assert_eq!(value["dest_port"], 80);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn core_output_field_order_matches_wire_format() {
        let rule = Rule::new(1, "t", b"x".to_vec());
        let line = Alert::new(&rule, &sample_key()).to_line();
        let timestamp_at = line.find("\"timestamp\"").unwrap();
        let event_at = line.find("\"event_type\"").unwrap();
        let alert_at = line.find("\"alert\"").unwrap();
        let src_at = line.find("\"src_ip\"").unwrap();
        let dest_at = line.find("\"dest_ip\"").unwrap();
        assert!(timestamp_at < event_at && event_at < alert_at);
        assert!(alert_at < src_at && src_at < dest_at);
    }

    #[test]
    fn core_output_dotted_quad_round_trip() {
        // A decoded address re-rendered by the formatter equals the
        // original dotted-quad text.
        let addr: Ipv4Addr = "203.0.113.77".parse().unwrap();
        let key = FlowKey {
            src_ip: addr,
            dst_ip: Ipv4Addr::new(10, 0, 0, 1),
            src_port: 1,
            dst_port: 2,
            proto: 17,
        };
        let rule = Rule::new(1, "t", b"x".to_vec());
        let line = Alert::new(&rule, &key).to_line();
        assert!(line.contains("\"src_ip\":\"203.0.113.77\""));
    }
}
