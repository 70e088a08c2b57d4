//! IP Geolocation module: look up where an IP address is located.
use clap::Parser;
use lmv_modules::geolocation::GeoClient;
use lmv_modules::input::{parse_timeout, GeoOpts, OutputFormat};
use lmv_modules::{detail, warning};
use log::debug;
use std::net::IpAddr;
use std::process;
use std::time::Duration;

const USAGE: &str = "Usage: ip=<ip_address> [format=text|json|csv]";

#[tokio::main]
async fn main() {
    env_logger::init();

    let opts = GeoOpts::parse();
    let validated = opts
        .ip_addr()
        .and_then(|ip| Ok((ip, parse_timeout(opts.timeout)?)));
    let (ip, timeout) = match validated {
        Ok(validated) => validated,
        Err(e) => {
            warning!(format!("Error: {e}"));
            if opts.ip.is_none() {
                println!("{USAGE}");
            }
            process::exit(e.exit_code());
        }
    };
    debug!("Main() `opts` arguments are {opts:?}");

    if let Err(e) = run(&opts, ip, timeout).await {
        warning!(format!("{e:#}"));
        process::exit(1);
    }
}

async fn run(opts: &GeoOpts, ip: IpAddr, timeout: Duration) -> anyhow::Result<()> {
    // Structured formats stay parseable on stdout.
    if opts.format == OutputFormat::Text {
        detail!(format!("Fetching geolocation for {ip}..."));
    }

    let client = GeoClient::new(&opts.endpoint, timeout)?;
    let info = client.lookup(ip).await?;

    print!("{}", info.render(opts.format)?);
    if opts.format == OutputFormat::Json {
        println!();
    }
    Ok(())
}
