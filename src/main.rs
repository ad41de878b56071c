//! Live chat relay client CLI
//!
//! Watch a live stream's comments through a relay and export them as CSV.

use anyhow::Context;
use clap::{Parser, Subcommand};
use livechat_relay_client::{
    config::Config,
    relay::{Connector, WsConnector},
    session::{Command, Notice, SessionOptions, SessionOrchestrator, SessionView},
    stats::{create_shared_stats_with_persistence, read_persisted, SharedFeedStats},
    VERSION, WATCH_HELP,
};
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "livechat")]
#[command(version = VERSION)]
#[command(about = "Follow live stream comments through a relay and export them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print comments as they arrive
    Watch {
        /// Platform username to follow (without @)
        #[arg(long, short)]
        target: Option<String>,

        /// Relay WebSocket address
        #[arg(long, short)]
        relay: Option<String>,

        /// Use the built-in simulated relay instead of a real one
        #[arg(long)]
        simulate: bool,

        /// Export the feed to CSV when stopping
        #[arg(long)]
        export_on_stop: bool,
    },

    /// Show configuration, or update it when flags are given
    Config {
        /// Default relay address
        #[arg(long)]
        relay: Option<String>,

        /// Default target username
        #[arg(long)]
        target: Option<String>,

        /// Directory for CSV exports
        #[arg(long)]
        export_path: Option<PathBuf>,
    },

    /// Show cumulative statistics from previous runs
    Status,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Watch {
            target,
            relay,
            simulate,
            export_on_stop,
        } => cmd_watch(target, relay, simulate, export_on_stop),
        Commands::Config {
            relay,
            target,
            export_path,
        } => cmd_config(relay, target, export_path),
        Commands::Status => cmd_status(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Log to stderr so the feed on stdout stays readable. `RUST_LOG` overrides.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_watch(
    target: Option<String>,
    relay: Option<String>,
    simulate: bool,
    export_on_stop: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    if let Some(target) = target {
        config.target_username = target;
    }
    if let Some(relay) = relay {
        config.relay_address = relay;
    }
    config.export_on_stop |= export_on_stop;

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    println!("Live chat relay client v{VERSION}");
    println!("  Relay: {}", config.relay_address);
    println!(
        "  Target: {}",
        if config.target_username.is_empty() {
            "(none)"
        } else {
            config.target_username.as_str()
        }
    );
    println!("  Exports: {:?}", config.export_path);
    println!();
    println!("Type `help` for commands. Press Ctrl+C to stop.");
    println!();

    let stats = create_shared_stats_with_persistence(config.stats_path());

    // One thread: every session event is handled in arrival order.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(async {
        if simulate {
            run_simulated(&config, stats.clone()).await
        } else {
            run_watch(WsConnector, &config, stats.clone()).await
        }
    });
    // The stdin reader may still be parked in a blocking read.
    runtime.shutdown_background();
    result?;

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save statistics: {e}");
    }
    println!();
    println!("{}", stats.summary());
    Ok(())
}

#[cfg(feature = "simulator")]
async fn run_simulated(config: &Config, stats: SharedFeedStats) -> anyhow::Result<()> {
    println!("Using simulated relay.");
    run_watch(livechat_relay_client::SimulatedConnector::default(), config, stats).await
}

#[cfg(not(feature = "simulator"))]
async fn run_simulated(_config: &Config, _stats: SharedFeedStats) -> anyhow::Result<()> {
    anyhow::bail!("--simulate requires the `simulator` feature")
}

async fn run_watch<C>(connector: C, config: &Config, stats: SharedFeedStats) -> anyhow::Result<()>
where
    C: Connector + Send + 'static,
{
    let (orchestrator, handle) =
        SessionOrchestrator::new(connector, SessionOptions::from_config(config), stats.clone());
    let session_task = tokio::spawn(orchestrator.run());

    let commands = handle.commands.clone();
    ctrlc::set_handler(move || {
        let _ = commands.send(Command::Shutdown);
    })
    .context("Error setting Ctrl+C handler")?;

    let commands = handle.commands.clone();
    let view = handle.view.clone();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_prompt(&line) {
                PromptInput::Session(command) => {
                    let shutdown = command == Command::Shutdown;
                    if commands.send(command).is_err() || shutdown {
                        break;
                    }
                }
                PromptInput::Help => println!("{WATCH_HELP}"),
                PromptInput::Stats => {
                    print_view(&view.borrow());
                    println!("{}", stats.summary());
                }
                PromptInput::Empty => {}
                PromptInput::Unknown(word) => {
                    println!("Unknown command `{word}`. Type `help` for commands.")
                }
            }
        }
    });

    if !config.target_username.trim().is_empty() {
        let _ = handle.commands.send(Command::Start);
    } else {
        println!("No target set. Use `target <name>` then `start`.");
    }

    let mut notices = handle.notices;
    while let Some(notice) = notices.recv().await {
        println!("{}", render_notice(&notice));
    }

    session_task.await.context("Session task failed")?;
    Ok(())
}

/// A line typed at the watch prompt.
#[derive(Debug, PartialEq)]
enum PromptInput {
    Session(Command),
    Help,
    Stats,
    Empty,
    Unknown(String),
}

fn parse_prompt(line: &str) -> PromptInput {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "" => PromptInput::Empty,
        "start" | "connect" => PromptInput::Session(Command::Start),
        "stop" | "disconnect" => PromptInput::Session(Command::Stop),
        "target" => PromptInput::Session(Command::SetTarget(
            rest.trim_start_matches('@').to_string(),
        )),
        "relay" => PromptInput::Session(Command::SetRelayAddress(rest.to_string())),
        "export" => PromptInput::Session(Command::Export),
        "clear" => PromptInput::Session(Command::ClearFeed),
        "quit" | "exit" => PromptInput::Session(Command::Shutdown),
        "stats" | "status" => PromptInput::Stats,
        "help" | "?" => PromptInput::Help,
        other => PromptInput::Unknown(other.to_string()),
    }
}

fn render_notice(notice: &Notice) -> String {
    match notice {
        Notice::ValidationFailed(e) => format!("! {e}"),
        Notice::Rejected(reason) => format!("! {reason}"),
        Notice::Connecting { relay_address } => format!("Connecting to {relay_address}..."),
        Notice::RelayConnected => "Relay connected.".to_string(),
        Notice::TargetRequested { username } => format!("Requesting @{username}..."),
        Notice::Live { username, message } => match message {
            Some(message) => format!("Live: {message}"),
            None => format!("Live: connected to @{username}"),
        },
        Notice::Status(message) => format!("Relay: {message}"),
        Notice::StreamEnded(message) => format!(
            "Stream ended{}",
            message
                .as_deref()
                .map(|m| format!(": {m}"))
                .unwrap_or_default()
        ),
        Notice::Comment(comment) => format!(
            "[{}] {} (@{}): {}",
            comment.received_at.format("%H:%M:%S"),
            comment.nickname,
            comment.username,
            comment.text
        ),
        Notice::Disconnected {
            unexpected: false, ..
        } => "Disconnected. Stopped listening for comments.".to_string(),
        Notice::Disconnected {
            unexpected: true,
            reason,
        } => match reason {
            Some(reason) => format!("! Disconnected from relay: {reason}"),
            None => "! Disconnected from relay".to_string(),
        },
        Notice::Exported(receipt) => format!(
            "Exported {} comments to {:?}",
            receipt.comment_count, receipt.path
        ),
        Notice::ExportEmpty => "! No data to export: there are no comments yet.".to_string(),
        Notice::ExportFailed(e) => format!("! {e}"),
    }
}

fn print_view(view: &SessionView) {
    println!("Status:         {}", view.state);
    println!("Target:         @{}", view.session.target_username);
    println!("Relay:          {}", view.session.relay_address);
    println!("Total comments: {}", view.stats.total_comments);
    println!("Duration:       {}", view.stats.duration);
    println!("Per minute:     {}", view.stats.comments_per_minute);
}

fn cmd_config(
    relay: Option<String>,
    target: Option<String>,
    export_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = Config::load().context("Could not load config")?;
    let changed = relay.is_some() || target.is_some() || export_path.is_some();

    if let Some(relay) = relay {
        config.relay_address = relay;
    }
    if let Some(target) = target {
        config.target_username = target;
    }
    if let Some(export_path) = export_path {
        config.export_path = export_path;
    }
    if changed {
        config.save().context("Could not save config")?;
        println!("Configuration saved.");
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Live Chat Relay Client Status");
    println!("=============================");
    println!();
    println!("Relay address: {}", config.relay_address);
    println!("Target:        {}", config.target_username);
    println!("Exports:       {:?}", config.export_path);
    println!();

    let stats_path = config.stats_path();
    if !stats_path.exists() {
        println!("No previous session data found.");
        return Ok(());
    }

    let stats = read_persisted(&stats_path)
        .with_context(|| format!("Could not read {stats_path:?}"))?;
    println!("Cumulative Statistics:");
    println!("  Frames received:   {}", stats.frames_received);
    println!("  Comments ingested: {}", stats.comments_ingested);
    println!("  Frames discarded:  {}", stats.frames_discarded);
    println!("  Comments evicted:  {}", stats.comments_evicted);
    println!("  Exports written:   {}", stats.exports_written);
    println!("  Last updated:      {}", stats.last_updated);
    Ok(())
}
