use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use burner_core::subnet::{self, local_networks, normalize_network};
use burner_core::{
    BurnerConfig, Classifier, Device, Flasher, HttpFetcher, ImageCache, Operation, Scanner,
    SshConnector, Target, TracingObserver, targets_for,
};
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scan subnets for access points and convert, upgrade or restore their firmware", long_about = None)]
struct Args {
    /// Networks to scan (CIDR or single address). Defaults to every local network.
    networks: Vec<String>,

    /// Operation to run on matching devices. Without it the tool only scans.
    #[arg(short, long)]
    operation: Option<Operation>,

    /// Run the operation on every matching device
    #[arg(long, conflicts_with = "target")]
    all: bool,

    /// Run the operation only on these addresses
    #[arg(short, long)]
    target: Vec<Ipv4Addr>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for downloaded images
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Classification threads per subnet
    #[arg(long)]
    workers: Option<usize>,

    /// Give up reconnecting after this many login attempts
    #[arg(long)]
    reconnect_max: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(args: &Args) -> Result<BurnerConfig> {
    let mut config = match &args.config {
        Some(path) => BurnerConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BurnerConfig::default(),
    };
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(workers) = args.workers {
        config.scan_workers = workers;
    }
    if args.reconnect_max.is_some() {
        config.reconnect_max_attempts = args.reconnect_max;
    }
    Ok(config)
}

/// Networks to scan and the addresses to leave out.
fn scan_networks(args: &Args) -> Result<(Vec<String>, Vec<Ipv4Addr>)> {
    if !args.networks.is_empty() {
        let networks = args
            .networks
            .iter()
            .map(|n| normalize_network(n))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok((networks, Vec::new()));
    }

    let local = local_networks()?;
    if local.networks.is_empty() {
        anyhow::bail!("no local IPv4 network found, pass one explicitly");
    }
    let networks = local.networks.iter().map(|n| n.to_string()).collect();
    Ok((networks, local.own_addresses))
}

/// Returns whether every selected target succeeded.
fn run(args: &Args) -> Result<bool> {
    let config = load_config(args)?;
    let (networks, exclude) = scan_networks(args)?;
    // Reject bad input before any network traffic.
    for cidr in &networks {
        subnet::hosts(cidr, &exclude)?;
    }

    let fetcher = HttpFetcher::new(config.http_timeout())?;
    let cache = ImageCache::new(&config.cache_dir, fetcher);
    if config.refresh_versions {
        cache.purge_versions()?;
    }

    let connector = SshConnector::new();
    let observer = TracingObserver;
    let classifier = Classifier::new(&connector).with_timeout(config.connect_timeout());
    let scanner = Scanner::new(classifier, &observer).with_workers(config.scan_workers);

    info!(networks = ?networks, "Scanning");
    let scans = scanner.scan_all(&networks, &exclude)?;
    let devices: Vec<&Device> = scans.iter().flat_map(|s| s.devices()).collect();
    cache.resolve_latest(devices.iter().copied());

    println!("{}", Device::summary_header());
    for device in &devices {
        println!("{}", device.summary());
    }
    for scan in &scans {
        println!("{}", scan.one_line_summary());
    }

    let Some(operation) = args.operation else {
        return Ok(true);
    };

    let candidates = targets_for(devices.iter().copied(), operation);
    if candidates.is_empty() {
        info!(op = %operation, "No device needs this operation");
        return Ok(true);
    }

    println!();
    println!("{}", Target::summary_header());
    for target in &candidates {
        println!("{}", target.summary());
    }

    let selected: Vec<Target> = if args.all {
        candidates
    } else if !args.target.is_empty() {
        for ip in &args.target {
            if !candidates.iter().any(|t| t.host == *ip) {
                warn!(host = %ip, op = %operation, "Not a candidate, skipping");
            }
        }
        candidates
            .into_iter()
            .filter(|t| args.target.contains(&t.host))
            .collect()
    } else {
        info!("Pass --all or --target to run the operation");
        return Ok(true);
    };
    if selected.is_empty() {
        return Ok(true);
    }

    let prober = config.prober();
    let flasher = Flasher::new(&connector, &prober, &cache, &observer)
        .with_settings(config.flash_settings());
    let outcomes = flasher.flash_all(&selected);

    println!();
    for outcome in &outcomes {
        println!("{outcome}");
    }
    if operation == Operation::Convert {
        let converted: Vec<&str> = outcomes
            .iter()
            .filter(|o| o.success())
            .map(|o| o.mac.as_str())
            .collect();
        if !converted.is_empty() {
            println!("Converted: {}", converted.join(","));
        }
    }

    let failed = outcomes.iter().filter(|o| !o.success()).count();
    if failed > 0 {
        error!(failed, total = outcomes.len(), "Some devices failed");
    }
    Ok(failed == 0)
}
