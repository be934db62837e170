//! Flashbridge CLI Binary
//!
//! Hosted entry point for the bridge: runs the full session loop against
//! directory-backed volumes, or performs one-shot replicate/sweep passes
//! between two directory trees.

use anyhow::Context;
use clap::{Parser, Subcommand};
use flashbridge::block::HeapBlockDevice;
use flashbridge::config::BridgeConfig;
use flashbridge::hw::NoopReadiness;
use flashbridge::logging::{init_logging, LoggingConfig};
use flashbridge::scsi::{InquiryData, MassStorage, ScriptedTransport};
use flashbridge::session::SessionController;
use flashbridge::sync::{SyncOptions, Synchronizer};
use flashbridge::vfs::{DirVolume, Volume};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "flashbridge", version, about = "USB mass-storage bridge over a RAM staging disk")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Boot the session and service the storage loop until interrupted
    Run {
        /// Directory backing the persistent store
        #[arg(long)]
        persistent_root: PathBuf,

        /// Directory backing the staging store (created and formatted)
        #[arg(long)]
        staging_root: PathBuf,
    },

    /// One-shot hydration: replicate a flash tree onto a ram tree
    Hydrate { flash: PathBuf, ram: PathBuf },

    /// One-shot commit: replicate a ram tree onto a flash tree, then sweep
    Commit { ram: PathBuf, flash: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            process::exit(1);
        }
    };

    let mut logging = config.logging.clone();
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Err(e) = init_logging(Some(&logging)) {
        eprintln!("failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = execute(&cli, &config) {
        error!("command failed: {e:#}");
        eprintln!("{e:#}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    BridgeConfig::load(cli.config.as_deref()).context("loading configuration")
}

fn execute(cli: &Cli, config: &BridgeConfig) -> anyhow::Result<()> {
    match &cli.command {
        Command::Run {
            persistent_root,
            staging_root,
        } => run(config, persistent_root.clone(), staging_root.clone()),
        Command::Hydrate { flash, ram } => {
            let (mut flash, mut ram) = mount_pair(flash, ram)?;
            let stats = synchronizer(config).replicate(&flash, &mut ram);
            println!(
                "hydrated: {} files copied, {} skipped",
                stats.files_copied, stats.entries_skipped
            );
            flash.unmount()?;
            ram.unmount()?;
            Ok(())
        }
        Command::Commit { ram, flash } => {
            let (mut ram, mut flash) = mount_pair(ram, flash)?;
            let sync = synchronizer(config);
            let copied = sync.replicate(&ram, &mut flash);
            let swept = sync.sweep(&ram, &mut flash);
            println!(
                "committed: {} files copied, {} entries removed, {} skipped",
                copied.files_copied,
                swept.entries_removed,
                copied.entries_skipped + swept.entries_skipped
            );
            ram.unmount()?;
            flash.unmount()?;
            Ok(())
        }
    }
}

fn run(config: &BridgeConfig, persistent_root: PathBuf, staging_root: PathBuf) -> anyhow::Result<()> {
    let persistent = DirVolume::new(config.mounts.persistent.clone(), persistent_root);
    let staging = DirVolume::new(config.mounts.staging.clone(), staging_root);

    let device = HeapBlockDevice::new(config.staging.capacity_bytes, config.staging.erase_block_size);
    let msc = MassStorage::new(
        device,
        InquiryData::new(&config.usb.vendor, &config.usb.product, &config.usb.revision),
    );

    let mut session = SessionController::new(config, persistent, staging, msc);
    let mut transport = ScriptedTransport::new();
    let mut readiness = NoopReadiness::default();

    session
        .boot(&mut readiness, &mut transport)
        .context("session boot")?;
    info!("entering service loop");
    session.run(&mut transport)
}

fn mount_pair(src: &PathBuf, dst: &PathBuf) -> anyhow::Result<(DirVolume, DirVolume)> {
    let mut a = DirVolume::new(src.display().to_string(), src.clone());
    let mut b = DirVolume::new(dst.display().to_string(), dst.clone());
    std::fs::create_dir_all(dst).with_context(|| format!("creating {}", dst.display()))?;
    a.mount().with_context(|| format!("mounting {}", src.display()))?;
    b.mount().with_context(|| format!("mounting {}", dst.display()))?;
    Ok((a, b))
}

fn synchronizer(config: &BridgeConfig) -> Synchronizer {
    Synchronizer::new(SyncOptions {
        reserved_dir: config.sync.reserved_dir.clone(),
        max_rel_path: config.sync.max_rel_path,
    })
}
