//! Port Scanner module: scan ports on a host to find open services.
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use lmv_modules::address::resolve_host;
use lmv_modules::error::ScanError;
use lmv_modules::input::{Config, OutputFormat, ScanConfig, ScanOpts};
use lmv_modules::port_strategy::PortStrategy;
use lmv_modules::report::aggregate;
use lmv_modules::scanner::Scanner;
use lmv_modules::{detail, rule, warning};
use log::debug;
use std::process;
use std::time::Instant;

const RULE_WIDTH: usize = 60;
const USAGE: &str = "Usage: host=<hostname> [ports=22,80,443] [timeout=2] [threads=5]";

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut opts = ScanOpts::read();
    let accessible = opts.accessible;
    let config_file = if opts.no_config {
        Ok(Config::default())
    } else {
        Config::read(opts.config_path.clone())
    };
    let config = config_file.and_then(|config| {
        opts.merge(&config);
        opts.into_config()
    });

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            warning!(format!("Error: {e}"), false, accessible);
            if matches!(&e, ScanError::InvalidOption(msg) if msg.contains("HOST")) {
                println!("{USAGE}");
            }
            process::exit(e.exit_code());
        }
    };
    debug!("Main() `config` arguments are {config:?}");

    if let Err(e) = run(&config).await {
        warning!(format!("Error: {e}"), false, config.accessible);
        process::exit(e.exit_code());
    }
}

async fn run(config: &ScanConfig) -> Result<(), ScanError> {
    let ip = resolve_host(&config.host, config.resolver.as_deref()).await?;
    let quiet = config.greppable || config.format != OutputFormat::Text;

    #[cfg(unix)]
    check_ulimit(config, quiet);

    if !quiet {
        println!();
    }
    detail!(format!("Scanning {} ({ip})", config.host), quiet, config.accessible);
    detail!(format!("Ports: {}", config.port_spec), quiet, config.accessible);
    detail!(
        format!(
            "Timeout: {}s | Threads: {}",
            config.timeout.as_secs_f64(),
            config.concurrency
        ),
        quiet,
        config.accessible
    );
    rule!(RULE_WIDTH, quiet);

    let total = config.targets.len();
    let strategy = PortStrategy::pick(config.targets.clone(), config.scan_order);
    let mut scanner = Scanner::new(ip, strategy, config.concurrency, config.timeout);

    let progress = (!quiet && !config.accessible).then(|| progress_bar(total));
    if let Some(progress) = &progress {
        scanner = scanner.with_progress(progress.clone());
    }

    let started_at = Utc::now();
    let start = Instant::now();
    let results = scanner.run().await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    let results = results?;
    let elapsed = start.elapsed();
    detail!(
        format!("Progress: {}/{total} ports scanned", results.len()),
        quiet,
        config.accessible
    );

    let report = aggregate(results, elapsed, total).with_target(&config.host, ip, started_at);
    rule!(RULE_WIDTH, quiet);

    if config.greppable {
        print!("{}", report.render_greppable());
        return Ok(());
    }

    let rendered = report
        .render(config.format, config.accessible)
        .map_err(|e| ScanError::Configuration(format!("Could not encode the report: {e}")))?;
    println!("{rendered}");
    Ok(())
}

fn progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::with_template("[*] Progress: {pos}/{len} ports scanned [{bar:30}] {elapsed}")
    {
        progress.set_style(style.progress_chars("=> "));
    }
    progress
}

/// Applies `--ulimit` and warns when the worker count cannot fit in the
/// open-file limit.
#[cfg(unix)]
fn check_ulimit(config: &ScanConfig, quiet: bool) {
    use rlimit::Resource;

    if let Some(limit) = config.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                quiet,
                config.accessible
            );
        } else {
            warning!("ERROR. Failed to set ulimit value.", quiet, config.accessible);
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) if config.concurrency as u64 >= soft => {
            warning!(
                format!(
                    "Threads {} reach the open file limit {soft}. Lower --threads or use --ulimit.",
                    config.concurrency
                ),
                quiet,
                config.accessible
            );
        }
        Ok(_) => {}
        Err(e) => debug!("Could not read the open file limit: {e}"),
    }
}
