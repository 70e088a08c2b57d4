//! Provides a means to read, parse and hold configuration options for the modules.
//!
//! The LanManVan host hands options to a module as `ARG_<NAME>` environment
//! variables, so every option below can be given either as a flag or through
//! its variable. Each binary turns its `*Opts` into a validated, immutable
//! value once at start-up; nothing past that point reads the environment.
use crate::error::ScanError;
use crate::port_strategy::TargetSet;
use clap::{Parser, ValueEnum};
use serde_derive::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Lowest port number that can be probed.
pub const LOWEST_PORT_NUMBER: u16 = 1;
/// Highest port number that can be probed.
pub const TOP_PORT_NUMBER: u16 = 65535;

const DEFAULT_PORTS: &str = "1-1000";
const DEFAULT_SCAN_TIMEOUT: f64 = 2.0;
const DEFAULT_THREADS: usize = 5;

/// Represents the order in which ports are handed to the workers.
///   - Serial will dispatch from the lowest to the highest port.
///   - Random will shuffle the dispatch order.
///
/// The resulting report is sorted either way.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanOrder {
    /// Ascending dispatch.
    #[default]
    Serial,
    /// Shuffled dispatch.
    Random,
}

/// Presentation of a module's result.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human readable report.
    #[default]
    Text,
    /// Pretty-printed JSON document.
    Json,
    /// Header row followed by data rows.
    Csv,
}

/// Parses a port specification such as `22,80,443` or `1-1000,8080`.
///
/// Segments are comma separated and trimmed; blank segments are ignored.
/// The result is deduplicated and sorted ascending.
///
/// ```rust
/// # use lmv_modules::input::parse_ports_and_ranges;
/// let ports = parse_ports_and_ranges("80, 22, 20-22").unwrap();
/// assert_eq!(ports.as_slice(), &[20, 21, 22, 80]);
/// ```
pub fn parse_ports_and_ranges(input: &str) -> Result<TargetSet, ScanError> {
    let mut ports = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if part.contains('-') {
            let (start, end) = parse_port_range(part)?;
            ports.extend(start..=end);
        } else {
            ports.push(parse_single_port(part)?);
        }
    }

    if ports.is_empty() {
        return Err(ScanError::EmptySpec);
    }

    Ok(TargetSet::new(ports))
}

fn parse_port_range(range_str: &str) -> Result<(u16, u16), ScanError> {
    let range_parts: Vec<&str> = range_str.split('-').map(str::trim).collect();
    let [start, end] = range_parts.as_slice() else {
        return Err(ScanError::InvalidRange(format!(
            "Invalid range format '{range_str}'. Expected 'start-end'. Example: 1-1000."
        )));
    };

    let start: u16 = start.parse().map_err(|_| {
        ScanError::InvalidRange(format!("Invalid start port '{start}' in range '{range_str}'"))
    })?;
    let end: u16 = end.parse().map_err(|_| {
        ScanError::InvalidRange(format!("Invalid end port '{end}' in range '{range_str}'"))
    })?;

    if start > end {
        return Err(ScanError::InvalidRange(format!(
            "Start port {start} is greater than end port {end} in range '{range_str}'"
        )));
    }

    if start < LOWEST_PORT_NUMBER {
        return Err(ScanError::InvalidRange(format!(
            "Ports in range '{range_str}' must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}"
        )));
    }

    Ok((start, end))
}

/// Parses one port number in `LOWEST_PORT_NUMBER..=TOP_PORT_NUMBER`.
pub fn parse_single_port(port_str: &str) -> Result<u16, ScanError> {
    let port_str = port_str.trim();
    let port: u16 = port_str
        .parse()
        .map_err(|_| ScanError::InvalidPort(format!("Invalid port number '{port_str}'")))?;

    if port < LOWEST_PORT_NUMBER {
        return Err(ScanError::InvalidPort(format!(
            "Port {port} must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}"
        )));
    }

    Ok(port)
}

/// Converts a timeout given in (possibly fractional) seconds.
pub fn parse_timeout(seconds: f64) -> Result<Duration, ScanError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ScanError::InvalidOption(format!(
            "Timeout must be a positive number of seconds, got {seconds}"
        )));
    }

    Duration::try_from_secs_f64(seconds)
        .map_err(|e| ScanError::InvalidOption(format!("Invalid timeout {seconds}: {e}")))
}

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "port-scanner",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Scan ports on a host to find open services.
/// Every option can also be supplied as an ARG_* environment variable.
pub struct ScanOpts {
    /// Hostname or IP address to scan.
    #[arg(long, env = "ARG_HOST")]
    pub host: Option<String>,

    /// Ports and/or port ranges to scan. Examples: 22,80,443 or 1-1000 or 1-1000,8080 [default: 1-1000]
    #[arg(short, long, alias = "range", env = "ARG_PORTS")]
    pub ports: Option<String>,

    /// Seconds to wait for each connection before the port is assumed closed. Fractions are allowed. [default: 2]
    #[arg(short, long, env = "ARG_TIMEOUT")]
    pub timeout: Option<f64>,

    /// Number of ports probed at the same time. [default: 5]
    #[arg(long, alias = "concurrency", env = "ARG_THREADS")]
    pub threads: Option<usize>,

    /// Output format of the final report. [default: text]
    #[arg(short, long, value_enum, ignore_case = true, env = "ARG_FORMAT")]
    pub format: Option<OutputFormat>,

    /// The order in which ports are handed to the workers. [default: serial]
    #[arg(long, value_enum, ignore_case = true, env = "ARG_SCAN_ORDER")]
    pub scan_order: Option<ScanOrder>,

    /// A comma-delimited list or file of DNS resolvers used when the system lookup fails.
    #[arg(long, env = "ARG_RESOLVER")]
    pub resolver: Option<String>,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long, env = "ARG_ULIMIT")]
    pub ulimit: Option<u64>,

    /// Greppable mode. Only output the open ports, one per line.
    #[arg(short, long, env = "ARG_GREPPABLE")]
    pub greppable: bool,

    /// Accessible mode. Turns off colors and the progress bar.
    #[arg(long, env = "ARG_ACCESSIBLE")]
    pub accessible: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,
}

/// Validated scanner settings, built once from [`ScanOpts`].
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Host as the user typed it.
    pub host: String,
    /// Ports to probe.
    pub targets: TargetSet,
    /// Ports as the user wrote them, kept for the banner.
    pub port_spec: String,
    /// Per-probe connect timeout.
    pub timeout: Duration,
    /// Worker pool size, at least one.
    pub concurrency: usize,
    /// Report presentation.
    pub format: OutputFormat,
    /// Dispatch order of the ports.
    pub scan_order: ScanOrder,
    /// Fallback DNS servers.
    pub resolver: Option<String>,
    /// Open-file limit to apply before scanning.
    pub ulimit: Option<u64>,
    /// Only print open ports.
    pub greppable: bool,
    /// No colors, no progress bar.
    pub accessible: bool,
}

#[cfg(not(tarpaulin_include))]
impl ScanOpts {
    /// Reads the command line arguments and `ARG_*` variables.
    pub fn read() -> Self {
        Self::parse()
    }

    /// Fills every option the user left unset with the value found in the
    /// configuration file. Flags and `ARG_*` variables always win.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_optional(config);
            self.merge_flags(config);
        }
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if self.$field.is_none() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(host, ports, timeout, threads, format, scan_order, resolver, ulimit);
    }

    fn merge_flags(&mut self, config: &Config) {
        self.greppable |= config.greppable.unwrap_or(false);
        self.accessible |= config.accessible.unwrap_or(false);
    }

    /// Validates every option and applies defaults.
    pub fn into_config(self) -> Result<ScanConfig, ScanError> {
        let host = self
            .host
            .map(|h| h.trim().to_owned())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ScanError::InvalidOption("HOST is required".to_owned()))?;

        let port_spec = self.ports.unwrap_or_else(|| DEFAULT_PORTS.to_owned());
        let targets = parse_ports_and_ranges(&port_spec)?;
        let timeout = parse_timeout(self.timeout.unwrap_or(DEFAULT_SCAN_TIMEOUT))?;

        let concurrency = self.threads.unwrap_or(DEFAULT_THREADS);
        if concurrency == 0 {
            return Err(ScanError::InvalidOption(
                "Threads must be at least 1".to_owned(),
            ));
        }

        Ok(ScanConfig {
            host,
            targets,
            port_spec,
            timeout,
            concurrency,
            format: self.format.unwrap_or_default(),
            scan_order: self.scan_order.unwrap_or_default(),
            resolver: self.resolver,
            ulimit: self.ulimit,
            greppable: self.greppable,
            accessible: self.accessible,
        })
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final [`ScanConfig`].
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    host: Option<String>,
    ports: Option<String>,
    timeout: Option<f64>,
    threads: Option<usize>,
    format: Option<OutputFormat>,
    scan_order: Option<ScanOrder>,
    resolver: Option<String>,
    ulimit: Option<u64>,
    greppable: Option<bool>,
    accessible: Option<bool>,
}

#[cfg(not(tarpaulin_include))]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file yields an empty configuration.
    ///
    /// # Format
    ///
    /// host = "192.168.1.1"
    /// ports = "22,80,443,8000-8100"
    /// timeout = 0.5
    /// threads = 50
    /// format = "json"
    /// scan_order = "random"
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self, ScanError> {
        let Some(config_path) = custom_config_path.or_else(default_config_path) else {
            return Ok(Self::default());
        };
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| {
            ScanError::InvalidOption(format!(
                "Could not read configuration file {}: {e}",
                config_path.display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parses configuration file contents.
    pub fn from_toml(content: &str) -> Result<Self, ScanError> {
        toml::from_str(content)
            .map_err(|e| ScanError::InvalidOption(format!("Found {e} in configuration file.")))
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(".lmv-scanner.toml");
    Some(config_path)
}

#[derive(Parser, Debug, Clone)]
#[command(name = "ip-geolocation", version = env!("CARGO_PKG_VERSION"), max_term_width = 120)]
/// Get geolocation information for an IP address using the ip-api.com API.
pub struct GeoOpts {
    /// IPv4 or IPv6 address to look up.
    #[arg(long, env = "ARG_IP")]
    pub ip: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, ignore_case = true, default_value = "text", env = "ARG_FORMAT")]
    pub format: OutputFormat,

    /// Base URL of the geolocation API; the address is appended as a path segment.
    #[arg(long, default_value = "http://ip-api.com/json", env = "ARG_ENDPOINT")]
    pub endpoint: String,

    /// Seconds to wait for the API to answer.
    #[arg(short, long, default_value = "10", env = "ARG_TIMEOUT")]
    pub timeout: f64,
}

impl GeoOpts {
    /// Validates the address before anything goes on the wire.
    pub fn ip_addr(&self) -> Result<IpAddr, ScanError> {
        let ip = self
            .ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| ScanError::InvalidOption("IP address is required".to_owned()))?;

        ip.parse()
            .map_err(|_| ScanError::InvalidOption(format!("'{ip}' is not a valid IP address")))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "reachability", version = env!("CARGO_PKG_VERSION"), max_term_width = 120)]
/// Educational module: test whether a single host:port accepts TCP connections.
pub struct ReachOpts {
    /// Hostname or IP address to connect to.
    #[arg(long, env = "ARG_TARGET")]
    pub target: Option<String>,

    /// Port to connect to.
    #[arg(short, long, default_value = "80", env = "ARG_PORT")]
    pub port: String,

    /// Seconds to wait for the connection.
    #[arg(short, long, default_value = "5", env = "ARG_TIMEOUT")]
    pub timeout: f64,
}

impl ReachOpts {
    /// Target host, required.
    pub fn target(&self) -> Result<&str, ScanError> {
        self.target
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ScanError::InvalidOption("TARGET is required".to_owned()))
    }

    /// Port to connect to, validated.
    pub fn port(&self) -> Result<u16, ScanError> {
        parse_single_port(&self.port)
    }

    /// Connect timeout, validated.
    pub fn timeout(&self) -> Result<Duration, ScanError> {
        parse_timeout(self.timeout)
    }
}
