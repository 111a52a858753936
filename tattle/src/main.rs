//! tattle - forward coding-agent session logs to a chat channel
//!
//! Tails the monitored agent's session logs, extracts the records a human
//! must see, and forwards them through the configured messenger. With no
//! webhook configured, deliveries print to stdout.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Checkpoint: $XDG_DATA_HOME/tattle/checkpoint.json
//! - Logs: $XDG_STATE_HOME/tattle/tattle.log
//! - Config: $XDG_CONFIG_HOME/tattle/config.toml

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tattle_core::deliver::{Delivery, Messenger};
use tattle_core::fileset::FileSetTracker;
use tattle_core::monitor::{Monitor, NoTerminal};
use tattle_core::session::SessionResolver;
use tattle_core::types::CycleReport;
use tattle_core::{Config, WebhookMessenger};
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "tattle")]
#[command(about = "Forward coding-agent session logs to a chat channel")]
#[command(version)]
struct Args {
    /// Verbose output (-v shows per-cycle warnings)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Config file path (defaults to the XDG location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Discover the current session and exit without monitoring
    #[arg(long)]
    dry_run: bool,

    /// Poll interval in milliseconds (overrides config)
    #[arg(long)]
    poll: Option<u64>,

    /// Print deliveries to stdout even when a webhook is configured
    #[arg(long)]
    stdout: bool,
}

/// Messenger that prints deliveries to stdout.
struct ConsoleMessenger;

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn send_text(&self, text: &str) -> Delivery {
        println!("--- tattle ---");
        println!("{}", text);
        Delivery::ok()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        tattle_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("tattle starting");

    let project_path = match &config.project_path {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("failed to determine working directory")?,
    };

    if args.dry_run {
        return dry_run(&config, &project_path);
    }

    // Pick the messenger: webhook when configured, stdout otherwise
    let messenger: Arc<dyn Messenger> = if config.webhook.is_ready() && !args.stdout {
        println!(
            "Webhook messenger: {}",
            config.webhook.url.as_deref().unwrap_or("")
        );
        Arc::new(WebhookMessenger::new(&config.webhook).context("failed to create webhook")?)
    } else {
        Arc::new(ConsoleMessenger)
    };

    let mut monitor = Monitor::new(&config, messenger, Arc::new(NoTerminal))
        .context("failed to create monitor")?;

    if args.once {
        let report = monitor.tick().await;
        monitor.stop();
        print_report(&report, args.verbose);
        return Ok(());
    }

    // Watch mode: run until Ctrl+C, then flush once
    let poll = Duration::from_millis(args.poll.unwrap_or(config.monitor.poll_interval_ms));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nShutting down...");
            let _ = shutdown_tx.send(true);
        }
    });

    println!(
        "Monitoring {} (poll every {}ms). Press Ctrl+C to stop.",
        project_path.display(),
        poll.as_millis()
    );

    monitor.run(shutdown_rx, poll).await;

    println!("Stopped.");
    Ok(())
}

/// Discover the current session and print what would be watched.
fn dry_run(config: &Config, project_path: &PathBuf) -> Result<()> {
    let log_root = config.session_log_root();
    let mut resolver = SessionResolver::new(&log_root, project_path);

    println!("Project:     {}", project_path.display());
    println!("Log root:    {}", resolver.project_dir().display());

    let resolution = resolver.resolve(true);
    match resolution.session_id {
        Some(sid) => {
            println!("Session:     {}", sid);
            let files = FileSetTracker::discover(resolver.project_dir(), &sid);
            println!("Files ({}):", files.len());
            for file in files {
                println!("  {}", file.display());
            }
        }
        None => {
            println!("Session:     none found");
        }
    }

    println!("\nDry run - no monitoring started");
    Ok(())
}

/// Print a cycle summary in `--once` mode.
fn print_report(report: &CycleReport, verbose: u8) {
    println!("\nCycle complete:");
    println!(
        "  Session:    {}",
        report.session_id.as_deref().unwrap_or("none")
    );
    println!("  Files:      {}", report.files_scanned);
    println!("  Lines read: {}", report.lines_read);
    println!("  Delivered:  {}", report.delivered);
    println!("  Suppressed: {}", report.suppressed);
    println!("  Deduped:    {}", report.deduped);
    if report.waiting {
        println!("  (waiting for a new session)");
    }

    if verbose >= 1 && !report.warnings.is_empty() {
        println!("\nWarnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  {}", warning);
        }
    }
}
