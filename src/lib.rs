//! Live chat relay client - follow a live stream's comments and export them.
//!
//! This library connects to a relay server that bridges to a streaming
//! platform, keeps a bounded feed of the most recent comments, derives live
//! metrics from it, and exports the feed as CSV.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Live Chat Relay Client                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   commands        ┌──────────────┐        ┌──────────────────┐   │
//! │  ───────────────▶ │   Session    │──────▶ │   Connection     │   │
//! │                   │ Orchestrator │        │    Manager       │   │
//! │  ◀─────────────── │  (1s ticks)  │ ◀───── │ (state machine)  │   │
//! │  notices / view   └──────────────┘ events └────────┬─────────┘   │
//! │                      │        │                    │ socket      │
//! │                      ▼        ▼                    ▼             │
//! │              ┌──────────┐ ┌──────────┐     ┌──────────────┐      │
//! │              │  Metrics │ │   CSV    │     │    Relay     │      │
//! │              │          │ │  Export  │     │ (WebSocket)  │      │
//! │              └──────────┘ └──────────┘     └──────────────┘      │
//! │                   ▲            ▲                                 │
//! │                   └─── Event Buffer (100, newest first) ◀─────── │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use livechat_relay_client::{
//!     config::Config,
//!     relay::WsConnector,
//!     session::{Command, SessionOptions, SessionOrchestrator},
//!     stats::create_shared_stats,
//! };
//!
//! # async fn demo() {
//! let mut config = Config::default();
//! config.target_username = "somecreator".to_string();
//!
//! let (orchestrator, mut handle) = SessionOrchestrator::new(
//!     WsConnector,
//!     SessionOptions::from_config(&config),
//!     create_shared_stats(),
//! );
//! tokio::spawn(orchestrator.run());
//!
//! handle.commands.send(Command::Start).unwrap();
//! while let Some(notice) = handle.notices.recv().await {
//!     println!("{notice:?}");
//! }
//! # }
//! ```

pub mod config;
pub mod export;
pub mod feed;
pub mod relay;
pub mod session;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, DEFAULT_RELAY_ADDRESS};
pub use export::{export_feed, ExportError, ExportReceipt};
pub use feed::{Comment, EventBuffer, LiveStats, FEED_CAPACITY};
pub use relay::{ConnectionManager, ConnectionState, Connector, WsConnector};
pub use session::{
    Command, Notice, Session, SessionHandle, SessionOptions, SessionOrchestrator, SessionView,
    ValidationError,
};
pub use stats::{FeedStats, SharedFeedStats};

#[cfg(feature = "simulator")]
pub use relay::{SimulatedConnector, SimulatorConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Help text for the interactive `watch` prompt.
pub const WATCH_HELP: &str = r#"
Commands:
  start            connect to the relay and the current target
  stop             disconnect and clear the feed
  target <name>    switch target (re-requests the bridge when connected)
  relay <addr>     change relay address (only while disconnected)
  export           write the feed to CSV
  clear            empty the feed
  stats            show live and cumulative statistics
  help             show this text
  quit             stop and exit
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_help_lists_commands() {
        for command in ["start", "stop", "target", "relay", "export", "clear", "quit"] {
            assert!(WATCH_HELP.contains(command), "missing {command}");
        }
    }
}
