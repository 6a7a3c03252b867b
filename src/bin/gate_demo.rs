//! Capability Gate Demo CLI
//!
//! Drives file-flag gates through a full authorization flow without any OS
//! permission APIs. Each gate is granted while its marker file exists:
//! 1. Builds one gate per `--gate title=path` and a registry over them
//! 2. Runs every missing gate's flow (the "request" logs what to create)
//! 3. Waits until all gates are granted, or Ctrl-C / `--timeout-secs`
//! 4. Prints the final gate snapshots
//!
//! Usage:
//!   cargo run --features cli --bin gate_demo -- \
//!     --gate Accessibility=/tmp/grant-accessibility \
//!     --gate "Screen Recording=/tmp/grant-screen" \
//!     --poll-interval-ms 500
//!
//!   # in another shell
//!   touch /tmp/grant-accessibility /tmp/grant-screen

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use capability_gate::{Gate, GateConfig, GateContext, GateRegistry, UiQueue};

/// Capability gate demo driven by marker files
#[derive(Parser, Debug)]
#[command(name = "gate_demo")]
#[command(about = "Poll file-flag capability gates until all are granted")]
struct Args {
    /// Gate in format title=marker_path (can be specified multiple times)
    #[arg(long, short = 'g', value_parser = parse_key_val, required = true)]
    gate: Vec<(String, PathBuf)>,

    /// YAML gate configuration (overrides CAPGATE_* environment variables)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Poll interval override in milliseconds
    #[arg(long, short = 'i')]
    poll_interval_ms: Option<u64>,

    /// Give up after this many seconds
    #[arg(long, short = 't')]
    timeout_secs: Option<u64>,

    /// Output final snapshots as JSON
    #[arg(long)]
    json: bool,
}

fn parse_key_val(s: &str) -> Result<(String, PathBuf), String> {
    let (title, path) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid title=path: no `=` found in `{s}`"))?;
    if title.trim().is_empty() {
        return Err(format!("invalid title=path: empty title in `{s}`"));
    }
    Ok((title.trim().to_string(), PathBuf::from(path)))
}

fn load_config(args: &Args) -> anyhow::Result<GateConfig> {
    let config = match &args.config {
        Some(path) => GateConfig::from_file(path)
            .with_context(|| format!("loading gate config from {}", path.display()))?,
        None => GateConfig::from_env().context("reading CAPGATE_* environment")?,
    };
    let config = match args.poll_interval_ms {
        Some(interval_ms) => config.poll_interval_ms(interval_ms).validate()?,
        None => config,
    };
    Ok(config)
}

fn marker_gate(ctx: &GateContext, title: &str, marker: PathBuf) -> Gate {
    let probe_path = marker.clone();
    let request_title = title.to_string();
    Gate::new(
        ctx,
        title,
        vec![format!("Granted while {} exists.", marker.display())],
        Vec::new(),
        move || probe_path.exists(),
        move || {
            info!(
                gate = %request_title,
                marker = %marker.display(),
                "Create the marker file to grant this capability"
            );
        },
    )
}

async fn wait_for_all(registry: &GateRegistry) {
    let mut all_granted = registry.watch();
    while !*all_granted.borrow_and_update() {
        if all_granted.changed().await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let (queue, _drain) = UiQueue::spawn();
    let ctx = GateContext::new(queue).with_config(config);

    let gates: Vec<Arc<Gate>> = args
        .gate
        .iter()
        .map(|(title, marker)| Arc::new(marker_gate(&ctx, title, marker.clone())))
        .collect();
    let registry = GateRegistry::new(gates);

    for gate in registry.gates() {
        let title = gate.title().to_string();
        gate.run_with_completion(move || info!(gate = %title, "Capability granted, flow complete"));
    }

    let deadline = args.timeout_secs.map(Duration::from_secs);
    let outcome = tokio::select! {
        _ = wait_for_all(&registry) => Ok(()),
        _ = tokio::signal::ctrl_c() => Err("interrupted"),
        _ = async {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        } => Err("timed out"),
    };

    registry.stop_all_checks();

    let snapshots = registry.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    } else {
        for snapshot in &snapshots {
            let status = if snapshot.granted { "granted" } else { "missing" };
            println!("{:<24} {}", snapshot.title, status);
        }
    }

    if let Err(reason) = outcome {
        warn!(reason, "Stopped before every capability was granted");
        let missing = snapshots.iter().filter(|s| !s.granted).count();
        bail!("{reason} with {missing} capability(ies) missing");
    }
    Ok(())
}
