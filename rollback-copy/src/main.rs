//! rollback-copy - Main entry point
//!
//! Periodically backs up etcd and the static-pod resources while the local
//! member is the etcd leader.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollback_copy::daemon::ShutdownCoordinator;
use rollback_copy::etcd::EtcdClientFactory;
use rollback_copy::scheduler::Scheduler;
use rollback_copy::{config::Config, utils};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep rollback copies of etcd and the control-plane resources
    Rollbackcopy {
        /// Directory holding static-pod-resources/ and rollbackcopy/
        /// (overrides config, default /etc/kubernetes)
        #[arg(long, value_name = "DIR")]
        config_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    let Command::Rollbackcopy { config_dir } = args.command;
    config.apply_cli_overrides(config_dir, args.log_level);

    // Initialize logging
    utils::logger::init(&config.log.level)?;

    config.validate().context("invalid configuration")?;

    tracing::info!(
        "Starting rollback-copy v{} (member: {})",
        env!("CARGO_PKG_VERSION"),
        config.member.name
    );

    let factory = EtcdClientFactory::from_config(&config.etcd)
        .await
        .context("failed to prepare etcd client")?;
    let scheduler = Scheduler::from_config(factory, &config);

    let shutdown_coordinator = ShutdownCoordinator::new();
    let signals = shutdown_coordinator.clone();
    let signal_handle = tokio::spawn(async move {
        if let Err(e) = signals.wait_for_signal().await {
            tracing::error!("Signal handling failed: {}", e);
            signals.trigger();
        }
    });

    scheduler.run(shutdown_coordinator.token()).await;

    // Release the signal listener if the scheduler stopped on its own
    shutdown_coordinator.trigger();
    let _ = signal_handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
