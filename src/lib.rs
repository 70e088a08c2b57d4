//! This crate exposes the internal functionality of the LanManVan network
//! modules.
//!
//! A LanManVan module is a standalone executable the host framework runs with
//! its options exported as `ARG_<NAME>` environment variables. Three modules
//! are built from this crate:
//!
//! - **`port-scanner`**: concurrent TCP connect scan of a port range on one host
//! - **`ip-geolocation`**: country, city, ISP and AS of an IP address via ip-api.com
//! - **`reachability`**: a single TCP connect to `host:port`, the tutorial module
//!
//! ## Architecture Overview
//!
//! The core scanning behaviour is managed by
//! [`Scanner`](crate::scanner::Scanner) which in turn requires a
//! [`PortStrategy`](crate::port_strategy::PortStrategy). A scan follows this
//! flow:
//!
//! 1. **Input Processing**: the port spec is parsed into a sorted
//!    [`TargetSet`](crate::port_strategy::TargetSet) and the host is resolved
//! 2. **Dispatch**: a fixed pool of workers claims ports one at a time
//! 3. **Probing**: each claim is one connect attempt bounded by the timeout;
//!    refusals and timeouts are results, not errors
//! 4. **Aggregation**: [`aggregate`](crate::report::aggregate) keeps the open
//!    ports, sorts them and labels well-known services
//!
//! ## Basic Usage Example
//!
//! ```rust
//! use std::{net::IpAddr, time::Duration};
//!
//! use lmv_modules::input::{parse_ports_and_ranges, ScanOrder};
//! use lmv_modules::port_strategy::PortStrategy;
//! use lmv_modules::report::aggregate;
//! use lmv_modules::scanner::Scanner;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ip = "127.0.0.1".parse::<IpAddr>()?;
//!     let targets = parse_ports_and_ranges("1-100")?;
//!     let total = targets.len();
//!
//!     let scanner = Scanner::new(
//!         ip,
//!         PortStrategy::pick(targets, ScanOrder::Serial),
//!         10,                          // workers
//!         Duration::from_millis(100),  // per-probe timeout
//!     );
//!
//!     let rt = tokio::runtime::Runtime::new()?;
//!     let results = rt.block_on(scanner.run())?;
//!     let report = aggregate(results, Duration::ZERO, total);
//!
//!     for open in &report.open_ports {
//!         println!("{} {}", open.port, open.service);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Only problems with the request itself are errors
//! ([`ScanError`](crate::error::ScanError)): a bad port spec, an unresolvable
//! host, an invalid option, or a scan that cannot run (file descriptors
//! exhausted). Every one of them maps to its own process exit status.
#![allow(clippy::needless_doctest_main)]
#![warn(missing_docs)]

pub mod tui;

pub mod error;

pub mod input;

pub mod port_strategy;

pub mod address;

pub mod scanner;

pub mod services;

pub mod report;

pub mod geolocation;
