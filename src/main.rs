// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Daemon bootstrap: parses the command line, initializes logging,
//! wires the data-logic core and parks until a shutdown signal.
//!
//! Device discovery, the polling probes and the RPC transport are
//! provided by the GPU runtime layer; this binary owns the pieces they
//! plug into.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use xpum_config::{EnabledMetrics, METRICS_ENV, Tunables};
use xpum_data_logic::{
    DataHandlerManager, DataLogic, DeviceInventory, NoopSink, StaticInventory,
};
use xpum_dump::DumpService;

/// Intel GPU telemetry and management daemon.
#[derive(Debug, Parser)]
#[command(name = "xpumd", version, about)]
struct Args {
    /// Enabled metric families; same syntax as the XPUM_METRICS
    /// environment variable, e.g. "0,4-7,27-29".
    #[arg(long)]
    metrics: Option<String>,

    /// Folder dump-file tasks write into.
    #[arg(long, default_value = "/tmp/xpumdump")]
    dump_folder: PathBuf,

    /// Log filter, e.g. "info" or "xpum_data_logic=trace".
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level)?)
        .init();

    let enabled = match &args.metrics {
        Some(spec) => EnabledMetrics::from_spec(spec),
        None => EnabledMetrics::from_env(),
    };
    info!(
        enabled = enabled.families().count(),
        source = if args.metrics.is_some() { "--metrics" } else { METRICS_ENV },
        "resolved enabled metric set"
    );

    let tunables = Tunables::default();
    // Discovery fills the inventory in as devices appear; the core is
    // wired before the first probe tick arrives.
    let inventory = Arc::new(StaticInventory::new());
    let logic = Arc::new(DataLogic::new(
        DataHandlerManager::new(enabled, &tunables, Arc::new(NoopSink)),
        Arc::clone(&inventory) as Arc<dyn DeviceInventory>,
        &tunables,
    ));
    let dump = Arc::new(DumpService::new(
        Arc::clone(&logic),
        Arc::clone(&inventory) as Arc<dyn DeviceInventory>,
        &tunables,
    ));
    let dump_worker = dump.spawn_worker()?;
    info!(dump_folder = %args.dump_folder.display(), "xpumd core initialized");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    dump_worker.shutdown();
    Ok(())
}
