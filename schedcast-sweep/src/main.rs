//! schedcast-sweep - Background daemon for scheduled post delivery
//!
//! Monitors the pending queue and publishes content to the connected
//! networks when its scheduled time arrives.

use clap::Parser;
use libschedcast::networks::create_publishers;
use libschedcast::stats::RandomStats;
use libschedcast::{Config, Database, Result, Sweeper};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "schedcast-sweep")]
#[command(version)]
#[command(about = "Background daemon that delivers scheduled posts")]
#[command(long_about = "\
schedcast-sweep - Background daemon for scheduled post delivery

DESCRIPTION:
    schedcast-sweep is a long-running daemon that monitors the Schedcast
    queue and publishes scheduled content to the connected networks at the
    right time.

    Each pass picks up every due post, refreshes expired access tokens,
    publishes, records the result in the publish history, and marks the
    matching calendar event as posted. Failed attempts are retried on
    later passes up to the configured attempt limit.

USAGE:
    # Run in foreground (logs to stderr)
    schedcast-sweep

    # Run with custom poll interval
    schedcast-sweep --poll-interval 30

    # Enable verbose logging
    schedcast-sweep --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current pass)

CONFIGURATION:
    Configuration file: ~/.config/schedcast/config.toml
    Database location: ~/.local/share/schedcast/schedcast.db

    [sweeper]
    poll_interval = 60  # seconds between passes
    max_attempts = 10   # attempts before a post is parked as failed

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to sweep for due posts (default: from config)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run one pass and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Sweep due posts once and exit (for testing)")]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    info!("schedcast-sweep daemon starting");

    let publishers = create_publishers(&config);
    if publishers.is_empty() {
        error!("No networks are enabled in the configuration; nothing will be delivered");
    } else {
        let names: Vec<String> = publishers.keys().map(|n| n.to_string()).collect();
        info!("Publishers configured: {}", names.join(", "));
    }

    let sweeper = Sweeper::new(
        db,
        publishers,
        Box::new(RandomStats),
        config.sweeper.max_attempts,
    );

    // Set up graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.sweeper.poll_interval);
    info!("Poll interval: {}s", poll_interval);

    if cli.once {
        run_pass(&sweeper).await;
        info!("schedcast-sweep: swept once, exiting");
    } else {
        run_daemon_loop(&sweeper, poll_interval, shutdown).await;
    }

    info!("schedcast-sweep daemon stopped");
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use libschedcast::logging;

    logging::init(logging::format_from_env(), "info", verbose);
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libschedcast::SchedcastError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

/// Main daemon loop
async fn run_daemon_loop(sweeper: &Sweeper, poll_interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        run_pass(sweeper).await;

        // Sleep until next pass, checking for shutdown every second
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}

/// Run one sweep, absorbing pass-level errors so the daemon keeps going.
async fn run_pass(sweeper: &Sweeper) {
    match sweeper.run_pass(libschedcast::types::now_ms()).await {
        Ok(summary) if summary.due > 0 => {
            info!(
                "Pass complete: {} due, {} published, {} failed, {} skipped",
                summary.due, summary.published, summary.failed, summary.skipped
            );
        }
        Ok(_) => {}
        Err(e) => error!("Sweep pass failed: {}", e),
    }
}
