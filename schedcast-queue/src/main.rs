//! schedcast-queue - Manage scheduled posts
//!
//! Unix-style tool for the Schedcast queue: schedule posts, list what is
//! waiting, cancel events, and inspect the publish history.

use clap::{Parser, Subcommand};
use libschedcast::scheduling::parse_schedule;
use libschedcast::types::{
    now_ms, LinkedinPayload, MediaRef, Network, PostPayload, ShareMediaCategory, TwitterPayload,
    VideoKind, YoutubePayload,
};
use libschedcast::{service, Config, Database, Result, SchedcastError};

#[derive(Parser, Debug)]
#[command(name = "schedcast-queue")]
#[command(version)]
#[command(about = "Manage scheduled posts")]
#[command(long_about = "\
schedcast-queue - Manage scheduled posts

DESCRIPTION:
    schedcast-queue is a Unix-style tool for managing the Schedcast queue.
    Use it to schedule posts, list what is waiting, cancel scheduled
    events, or inspect the publish history.

COMMANDS:
    add       Schedule a post for later delivery
    list      List scheduled posts
    events    List calendar events
    cancel    Cancel a scheduled event
    history   Show the publish history for a network

USAGE EXAMPLES:
    # Schedule a tweet for tomorrow
    schedcast-queue add --user alice --at \"tomorrow 9am\" tweet \"Good morning\"

    # Schedule a three-segment thread in two hours
    schedcast-queue add --user alice --at 2h tweet \"One\" \"Two\" \"Three\"

    # Schedule a LinkedIn share
    schedcast-queue add --user alice --at 1d linkedin --commentary \"We shipped!\"

    # List pending posts in JSON
    schedcast-queue list --user alice --format json

    # Cancel a scheduled event
    schedcast-queue cancel --user alice <EVENT_ID>

CONFIGURATION:
    Configuration file: ~/.config/schedcast/config.toml
    Database location: ~/.local/share/schedcast/schedcast.db

    Override with environment variables:
        SCHEDCAST_CONFIG   - Path to config file
        SCHEDCAST_USER     - Default user id for --user

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Authorization expired
    3 - Invalid input (bad event ID, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Schedule a post for later delivery
    Add {
        /// User the post belongs to
        #[arg(long, env = "SCHEDCAST_USER")]
        user: String,

        /// When to deliver (e.g. "2h", "tomorrow 9am", "2026-09-01T15:00:00Z")
        #[arg(long)]
        at: String,

        #[command(subcommand)]
        content: AddContent,
    },

    /// List scheduled posts
    List {
        /// User whose queue to list
        #[arg(long, env = "SCHEDCAST_USER")]
        user: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Filter by network
        #[arg(short, long)]
        network: Option<Network>,
    },

    /// List calendar events
    Events {
        /// User whose events to list
        #[arg(long, env = "SCHEDCAST_USER")]
        user: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Cancel a scheduled event
    Cancel {
        /// Event ID to cancel
        event_id: String,

        /// User the event belongs to
        #[arg(long, env = "SCHEDCAST_USER")]
        user: String,
    },

    /// Show the publish history for a network
    History {
        /// User whose history to show
        #[arg(long, env = "SCHEDCAST_USER")]
        user: String,

        /// Network to show history for
        network: Network,
    },
}

#[derive(Subcommand, Debug)]
enum AddContent {
    /// A tweet, or a thread when several segments are given
    Tweet {
        /// Text segments; each one becomes a tweet in the thread
        #[arg(required = true)]
        segments: Vec<String>,
    },

    /// A LinkedIn share
    Linkedin {
        /// Commentary text
        #[arg(long, default_value = "")]
        commentary: String,

        /// Media category: none, article, image, or video
        #[arg(long, default_value = "none")]
        media_category: String,

        /// Media references (URL for articles, asset URN otherwise)
        #[arg(long)]
        media: Vec<String>,
    },

    /// A YouTube video upload
    Youtube {
        /// Video title
        #[arg(long)]
        title: String,

        /// Video description
        #[arg(long, default_value = "")]
        description: String,

        /// Key of the video file in the media store
        #[arg(long)]
        media: String,

        /// Upload as a Short
        #[arg(long)]
        short: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    {
        use libschedcast::logging::{self, LogFormat};
        logging::init(LogFormat::Text, "error", cli.verbose);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    match cli.command {
        Commands::Add { user, at, content } => {
            cmd_add(&db, &user, &at, content).await?;
        }
        Commands::List {
            user,
            format,
            network,
        } => {
            cmd_list(&db, &user, &format, network).await?;
        }
        Commands::Events { user, format } => {
            cmd_events(&db, &user, &format).await?;
        }
        Commands::Cancel { event_id, user } => {
            cmd_cancel(&db, &user, &event_id).await?;
        }
        Commands::History { user, network } => {
            cmd_history(&db, &user, network).await?;
        }
    }

    Ok(())
}

fn build_payload(content: AddContent) -> Result<PostPayload> {
    match content {
        AddContent::Tweet { segments } => Ok(PostPayload::Twitter(TwitterPayload { segments })),
        AddContent::Linkedin {
            commentary,
            media_category,
            media,
        } => {
            let media_category = match media_category.to_lowercase().as_str() {
                "none" => ShareMediaCategory::None,
                "article" => ShareMediaCategory::Article,
                "image" => ShareMediaCategory::Image,
                "video" => ShareMediaCategory::Video,
                other => {
                    return Err(SchedcastError::InvalidInput(format!(
                        "Invalid media category '{}'. Must be none, article, image, or video",
                        other
                    )))
                }
            };
            Ok(PostPayload::Linkedin(LinkedinPayload {
                commentary,
                media_category,
                media: media.into_iter().map(MediaRef::new).collect(),
            }))
        }
        AddContent::Youtube {
            title,
            description,
            media,
            short,
        } => Ok(PostPayload::Youtube(YoutubePayload {
            title,
            description,
            kind: if short {
                VideoKind::Short
            } else {
                VideoKind::Video
            },
            media: MediaRef::new(media),
        })),
    }
}

/// Schedule a post
async fn cmd_add(db: &Database, user: &str, at: &str, content: AddContent) -> Result<()> {
    let due_at = parse_schedule(at)?;
    let payload = build_payload(content)?;

    let (pending, event) = service::schedule_post(db, user, payload, due_at).await?;

    println!("Scheduled {} for {}", pending.id, format_timestamp(due_at));
    println!("Event: {}", event.id);

    Ok(())
}

/// List scheduled posts
async fn cmd_list(
    db: &Database,
    user: &str,
    format: &str,
    network: Option<Network>,
) -> Result<()> {
    validate_format(format)?;

    let mut posts = db.list_pending_by_owner(user).await?;
    if let Some(network) = network {
        posts.retain(|p| p.network == network);
    }

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&posts)
                .map_err(|e| SchedcastError::InvalidInput(e.to_string()))?
        );
        return Ok(());
    }

    let now = now_ms();
    for post in &posts {
        println!(
            "{} | {} | {} | {} | {}",
            post.id,
            post.network,
            truncate_content(&post.payload.summary(), 50),
            format_time_until(now, post.due_at),
            post.status.as_str(),
        );
    }

    Ok(())
}

/// List calendar events
async fn cmd_events(db: &Database, user: &str, format: &str) -> Result<()> {
    validate_format(format)?;

    let events = db.list_events_by_owner(user).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&events)
                .map_err(|e| SchedcastError::InvalidInput(e.to_string()))?
        );
        return Ok(());
    }

    for event in &events {
        println!(
            "{} | {} | {} | {} | {}",
            event.id,
            event.network,
            truncate_content(&event.summary, 50),
            format_timestamp(event.scheduled_at),
            if event.posted { "posted" } else { "scheduled" },
        );
    }

    Ok(())
}

/// Cancel a scheduled event
async fn cmd_cancel(db: &Database, user: &str, event_id: &str) -> Result<()> {
    service::cancel_schedule(db, user, event_id).await?;
    println!("Cancelled event {}", event_id);
    Ok(())
}

/// Show publish history
async fn cmd_history(db: &Database, user: &str, network: Network) -> Result<()> {
    let history = db.list_published(user, network).await?;

    for post in &history {
        let impressions = post.stats.last().map(|s| s.impressions).unwrap_or(0);
        println!(
            "{} | {} | {} | {} impressions",
            post.external_id,
            truncate_content(&post.content, 50),
            format_timestamp(post.published_at),
            impressions,
        );
    }

    Ok(())
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(SchedcastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

/// Truncate content to max length with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}

fn format_timestamp(ms: i64) -> String {
    use chrono::DateTime;

    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

/// Format time until the due moment in human-readable form
fn format_time_until(now_ms: i64, due_ms: i64) -> String {
    let diff = (due_ms - now_ms) / 1000;

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}
