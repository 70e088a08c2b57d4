//! Reachability module: the smallest useful LanManVan module.
//!
//! Reads its options, makes one TCP connection to `target:port` and reports
//! whether it was accepted. A refused or timed out connection is a normal
//! answer, not a failure of the module.
use clap::Parser;
use lmv_modules::address::resolve_host;
use lmv_modules::error::ScanError;
use lmv_modules::input::ReachOpts;
use lmv_modules::scanner::probe;
use lmv_modules::{detail, failure, output, warning};
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    let opts = ReachOpts::parse();
    if let Err(e) = run(&opts).await {
        warning!(format!("Error: {e}"));
        process::exit(e.exit_code());
    }
}

async fn run(opts: &ReachOpts) -> Result<(), ScanError> {
    let target = opts.target()?;
    let port = opts.port()?;
    let timeout = opts.timeout()?;

    println!();
    detail!("Reachability Module");
    detail!(format!("Target: {target}"));
    detail!(format!("Port: {port}"));
    detail!(format!("Timeout: {}s", timeout.as_secs_f64()));
    println!();

    let ip = resolve_host(target, None).await?;
    detail!(format!("Attempting connection to {target}:{port}..."));

    if probe(ip, port, timeout).await? {
        output!(format!("Connection successful on {target}:{port}"));
        output!("Host is reachable");
    } else {
        failure!(format!("Connection failed on {target}:{port}"));
        failure!("Host may not be reachable or port is closed");
    }

    println!();
    output!("Module execution completed successfully!");
    Ok(())
}
