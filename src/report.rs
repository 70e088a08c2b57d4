//! Turns raw probe results into the final, sorted scan report and renders it.
use crate::input::OutputFormat;
use crate::scanner::ProbeResult;
use crate::services::service_name;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serializer;
use serde_derive::Serialize;
use std::fmt::Write;
use std::net::IpAddr;
use std::time::Duration;

/// One reachable port with its service label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpenPort {
    /// Port number.
    pub port: u16,
    /// Well-known service name or `-`.
    pub service: &'static str,
}

/// Reachable ports of a finished scan, ascending, plus scan metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    /// Host as the user typed it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Address that was probed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<IpAddr>,
    /// When probing started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Number of ports attempted.
    pub total: usize,
    /// Wall-clock duration of the scan.
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Reachable ports, ascending.
    pub open_ports: Vec<OpenPort>,
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// Keeps the reachable results, sorts them by port and labels them.
///
/// ```rust
/// # use lmv_modules::report::aggregate;
/// # use lmv_modules::scanner::ProbeResult;
/// # use std::time::Duration;
/// let results = vec![
///     ProbeResult { port: 443, reachable: true },
///     ProbeResult { port: 21, reachable: false },
///     ProbeResult { port: 22, reachable: true },
/// ];
/// let report = aggregate(results, Duration::from_secs(1), 3);
/// assert_eq!(report.open_ports[0].service, "SSH");
/// assert_eq!(report.open_ports[1].port, 443);
/// ```
pub fn aggregate(
    results: impl IntoIterator<Item = ProbeResult>,
    elapsed: Duration,
    total: usize,
) -> ScanReport {
    let mut ports: Vec<u16> = results
        .into_iter()
        .filter(|result| result.reachable)
        .map(|result| result.port)
        .collect();
    ports.sort_unstable();
    ports.dedup();

    ScanReport {
        host: None,
        address: None,
        started_at: None,
        total,
        elapsed,
        open_ports: ports
            .into_iter()
            .map(|port| OpenPort {
                port,
                service: service_name(port),
            })
            .collect(),
    }
}

impl ScanReport {
    /// Attaches the scanned host and start time.
    #[must_use]
    pub fn with_target(mut self, host: &str, address: IpAddr, started_at: DateTime<Utc>) -> Self {
        self.host = Some(host.to_owned());
        self.address = Some(address);
        self.started_at = Some(started_at);
        self
    }

    /// Renders the report in `format`.
    pub fn render(&self, format: OutputFormat, accessible: bool) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Text => Ok(self.render_text(accessible)),
            OutputFormat::Json => self.render_json(),
            OutputFormat::Csv => Ok(self.render_csv()),
        }
    }

    /// Summary table of open ports followed by the scan duration.
    pub fn render_text(&self, accessible: bool) -> String {
        let paint = |marker: &str, color: fn(&str) -> colored::ColoredString| {
            if accessible {
                marker.to_owned()
            } else {
                color(marker).to_string()
            }
        };

        let mut out = String::new();
        if self.open_ports.is_empty() {
            let _ = writeln!(out, "\n{} No open ports found", paint("[!]", |s| s.red().bold()));
        } else {
            let _ = writeln!(
                out,
                "\n{} Found {} open port(s):\n",
                paint("[+]", |s| s.green().bold()),
                self.open_ports.len()
            );
            for open in &self.open_ports {
                let port = format!("{:<6}", open.port);
                let port = if accessible {
                    port
                } else {
                    port.purple().to_string()
                };
                let _ = writeln!(out, "  {port} {}", open.service);
            }
        }
        let _ = writeln!(
            out,
            "\n{} Scan completed in {:.2}s",
            paint("[*]", |s| s.blue().bold()),
            self.elapsed.as_secs_f64()
        );
        out
    }

    /// Pretty-printed JSON document.
    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// `port,service` header followed by one row per open port.
    pub fn render_csv(&self) -> String {
        let mut out = String::from("port,service\n");
        for open in &self.open_ports {
            let _ = writeln!(out, "{},{}", open.port, open.service);
        }
        out
    }

    /// Open port numbers, one per line.
    pub fn render_greppable(&self) -> String {
        self.open_ports
            .iter()
            .map(|open| format!("{}\n", open.port))
            .collect()
    }
}
