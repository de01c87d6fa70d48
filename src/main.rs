//! mirrortree - Replicate a directory tree to remote hosts.
//!
//! Usage:
//!   mirrortree run [ROOT] -d HOST...    Initial sync, then periodic incremental cycles
//!   mirrortree once [ROOT] -d HOST...   One initial sync, then exit
//!   mirrortree scan [ROOT]              Snapshot a directory and show a summary
//!   mirrortree inspect                  Receive frames and print their contents
//!   mirrortree --help                   Show help

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use itertools::Itertools;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use mirrortree_core::{DEFAULT_PORT, Destination, FileChange, ReplicaConfig, ScanConfig};
use mirrortree_dispatch::{CycleReport, Replicator};
use mirrortree_scan::TreeBuilder;
use mirrortree_wire::{Frame, FrameDecoder};

#[derive(Parser)]
#[command(
    name = "mirrortree",
    version,
    about = "Replicate a directory tree to remote hosts",
    long_about = "mirrortree snapshots a directory, fingerprints every file and sends \
                  the differences since the previous cycle to each destination.\n\n\
                  Start with `mirrortree run ROOT -d HOST`, or point `--config` at a \
                  TOML file."
)]
struct Cli {
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send the whole tree, then keep sending changes until interrupted
    Run {
        #[command(flatten)]
        replica: ReplicaArgs,

        /// Seconds between the initial sync and the first incremental cycle
        #[arg(long)]
        initial_delay: Option<u64>,

        /// Seconds between incremental cycles
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Send the whole tree once and exit
    Once {
        #[command(flatten)]
        replica: ReplicaArgs,
    },

    /// Snapshot a directory and show a summary
    Scan {
        /// Directory to snapshot
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,

        /// Glob patterns for entries to leave out
        #[arg(long = "ignore")]
        ignore: Vec<String>,
    },

    /// Listen for frames and print what they contain
    Inspect {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Exit after the first frame
        #[arg(long)]
        once: bool,
    },
}

#[derive(Args)]
struct ReplicaArgs {
    /// Directory to replicate (created if missing)
    root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Destination host, optionally with :port (repeatable)
    #[arg(short, long = "dest")]
    dest: Vec<Destination>,

    /// Port for destinations that do not name one
    #[arg(short, long)]
    port: Option<u16>,

    /// Threads for walking and hashing (0 = auto-detect)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Glob patterns for entries that are not replicated
    #[arg(long = "ignore")]
    ignore: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Run {
            replica,
            initial_delay,
            interval,
        } => {
            let mut config = replica_config(&replica)?;
            if let Some(secs) = initial_delay {
                config.initial_delay_secs = secs;
            }
            if let Some(secs) = interval {
                config.interval_secs = secs;
            }
            config.validate().wrap_err("Invalid configuration")?;
            run_replication(config).await?;
        }
        Command::Once { replica } => {
            run_once(replica_config(&replica)?).await?;
        }
        Command::Scan { root, json, ignore } => {
            run_scan(&root, json, ignore)?;
        }
        Command::Inspect { bind, port, once } => {
            run_inspect(&bind, port, once).await?;
        }
    }

    Ok(())
}

/// Install the fmt subscriber, writing to stderr.
fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .wrap_err("Invalid log filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .wrap_err("Failed to initialize logging")?;

    Ok(())
}

/// Merge the config file, if any, with command-line overrides.
fn replica_config(args: &ReplicaArgs) -> Result<ReplicaConfig> {
    let mut config = match &args.config {
        Some(path) => ReplicaConfig::from_toml_file(path)
            .wrap_err_with(|| format!("Failed to load {}", path.display()))?,
        None => {
            let root = args
                .root
                .clone()
                .ok_or_else(|| eyre!("Specify a root directory or --config"))?;
            ReplicaConfig::builder()
                .root(root)
                .destinations(args.dest.clone())
                .build()
                .wrap_err("Invalid configuration")?
        }
    };

    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    if !args.dest.is_empty() {
        config.destinations = args.dest.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    config.ignore_patterns.extend(args.ignore.iter().cloned());

    config.validate().wrap_err("Invalid configuration")?;
    Ok(config)
}

/// Cancel the returned token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, finishing up");
            token.cancel();
        }
    });
    cancel
}

/// Replicate until interrupted.
async fn run_replication(config: ReplicaConfig) -> Result<()> {
    info!(
        root = %config.root.display(),
        destinations = %config.destinations.iter().join(", "),
        interval_secs = config.interval_secs,
        "starting replication"
    );

    let cancel = cancel_on_interrupt();
    Replicator::new(config)
        .run(&cancel)
        .await
        .wrap_err("Replication failed")
}

/// Run a single initial sync and report per destination.
async fn run_once(config: ReplicaConfig) -> Result<()> {
    let replicator = Replicator::new(config);
    replicator.ensure_root().wrap_err("Invalid root")?;

    let cancel = cancel_on_interrupt();
    let result = replicator
        .run_cycle(None, &cancel)
        .await
        .wrap_err("Sync failed")?;

    print_cycle(&result.report);

    match &result.report.dispatch {
        Some(outcome) if !outcome.is_success() => Err(eyre!(outcome.summary())),
        _ => Ok(()),
    }
}

fn print_cycle(report: &CycleReport) {
    println!();
    println!("{}", "─".repeat(60));
    println!(
        " {} sync at {}",
        report.kind,
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        " {} directories, {} files ({}), {} deleted, {} modified",
        report.created_dirs,
        report.created_files,
        format_size(report.payload_bytes),
        report.deleted,
        report.modified
    );
    if report.warnings > 0 {
        println!(" {} entries skipped", report.warnings);
    }
    println!(" Finished in {:.2}s", report.duration.as_secs_f64());
    println!("{}", "─".repeat(60));

    if let Some(outcome) = &report.dispatch {
        for delivery in &outcome.reports {
            match &delivery.result {
                Ok(stats) => println!(
                    "   ok      {:<30} {:>10}",
                    delivery.address,
                    format_size(stats.bytes_sent)
                ),
                Err(err) => println!("   failed  {:<30} {}", delivery.address, err),
            }
        }
        println!();
        println!(" {}", outcome.summary());
    }
}

/// Snapshot a directory and print a summary.
fn run_scan(root: &Path, json: bool, ignore: Vec<String>) -> Result<()> {
    let config = ScanConfig::builder()
        .root(root)
        .ignore_patterns(ignore)
        .build()
        .wrap_err("Invalid scan configuration")?;

    eprintln!("Scanning {}...", root.display());
    let snapshot = TreeBuilder::new().build(&config).wrap_err("Scan failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!();
    println!("{}", "─".repeat(60));
    println!(
        " {} - {}",
        snapshot.root_path.display(),
        format_size(snapshot.stats.total_bytes)
    );
    println!(
        " {} files, {} directories",
        snapshot.stats.total_files, snapshot.stats.total_dirs
    );
    if let Some((path, size)) = &snapshot.stats.largest_file {
        println!(" Largest: {} ({})", path, format_size(*size));
    }
    println!(" Scanned in {:.2}s", snapshot.duration.as_secs_f64());
    println!("{}", "─".repeat(60));

    if snapshot.has_warnings() {
        println!();
        println!("{} entries skipped:", snapshot.warnings.len());
        for warning in &snapshot.warnings {
            println!(
                "   {:<18} {}",
                warning.kind.to_string(),
                warning.path.display()
            );
        }
    }

    Ok(())
}

/// Accept connections and print every frame received.
async fn run_inspect(bind: &str, port: u16, once: bool) -> Result<()> {
    let listener = TcpListener::bind((bind, port))
        .await
        .wrap_err_with(|| format!("Failed to listen on {bind}:{port}"))?;
    info!(address = %listener.local_addr()?, "waiting for frames");

    let cancel = cancel_on_interrupt();
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted.wrap_err("Accept failed")?,
        };

        match FrameDecoder::new(stream).decode().await {
            Ok(frame) => {
                println!("from {peer}");
                print_frame(&frame);
                if once {
                    return Ok(());
                }
            }
            Err(err) => warn!(%peer, error = %err, "rejected frame"),
        }
    }
}

fn print_frame(frame: &Frame) {
    let changes = &frame.changeset;
    let kind = if frame.initial { "initial" } else { "incremental" };

    println!("{}", "─".repeat(60));
    println!(
        " {kind} frame for {:?}: {} entries, {}",
        frame.root_name,
        changes.len(),
        format_size(changes.payload_bytes())
    );
    println!("{}", "─".repeat(60));

    if !changes.created_dirs.is_empty() {
        println!(" created dirs: {}", changes.created_dirs.iter().join(", "));
    }
    print_files("created", &changes.created_files);
    if !changes.deleted.is_empty() {
        println!(" deleted: {}", changes.deleted.iter().join(", "));
    }
    print_files("modified", &changes.modified);
    println!();
}

fn print_files(label: &str, files: &[FileChange]) {
    for file in files {
        println!(
            " {label:<9} {:<40} {:>10}",
            file.path.to_string(),
            format_size(file.size)
        );
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
