//! probe_server - one-shot health check against a detection server
//!
//! Exits 0 when `<server>/test/` answers 2xx, 1 otherwise.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use object_announcer::config::normalize_server_url;
use object_announcer::{ClientConfig, HealthState, ServerHealthMonitor, UreqClient};

#[derive(Parser, Debug)]
#[command(author, version, about = "Check whether a detection server is reachable")]
struct Args {
    /// Server base URL; defaults to the configured one.
    #[arg(long, env = "ANNOUNCER_SERVER_URL")]
    server_url: Option<String>,

    /// Probe timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let cfg = ClientConfig::load()?;
    let server_url = match &args.server_url {
        Some(url) => normalize_server_url(url)?,
        None => cfg.server_url,
    };
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(cfg.probe_timeout);

    let mut monitor = ServerHealthMonitor::with_timeout(Arc::new(UreqClient::new()), timeout);
    let transition = monitor.refresh(&server_url);
    println!("{} {}", server_url, transition.current);

    if transition.current != HealthState::Online {
        std::process::exit(1);
    }
    Ok(())
}
