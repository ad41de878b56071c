//! Session orchestration.
//!
//! The orchestrator is the single owner of all mutable session state: the
//! session record, the connection manager, the feed buffer and the metrics
//! ticker. It reacts to three event sources (user commands, socket events
//! and ticks) one at a time on a single task, so nothing here needs a lock.
//! The presentation layer only ever sees [`Notice`]s and [`SessionView`]
//! snapshots.

use crate::config::Config;
use crate::export::{export_feed, ExportError, ExportReceipt};
use crate::feed::{Comment, EventBuffer, LiveStats};
use crate::relay::{
    ConnectionEvent, ConnectionManager, ConnectionState, Connector, EventReceiver, SocketEvent,
};
use crate::stats::SharedFeedStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};

/// Shortest accepted metrics refresh period.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// The user's session: who to watch, through which relay, since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub target_username: String,
    pub relay_address: String,
    /// Set when a connection attempt begins, cleared when it ends
    pub started_at: Option<DateTime<Utc>>,
}

/// User commands accepted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect to the relay and bridge to the current target
    Start,
    /// Disconnect and reset the feed
    Stop,
    /// Change the target; re-requests the bridge when connected
    SetTarget(String),
    /// Change the relay address; only while disconnected
    SetRelayAddress(String),
    /// Write the feed to a CSV file
    Export,
    /// Empty the feed without touching the connection
    ClearFeed,
    /// Stop and end the orchestrator loop
    Shutdown,
}

/// Input rejected before any connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    EmptyUsername,
    EmptyRelayAddress,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyUsername => write!(f, "Please enter a username to connect to"),
            ValidationError::EmptyRelayAddress => write!(f, "Please enter a relay address"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// User-visible notices.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    ValidationFailed(ValidationError),
    /// A command could not be carried out in the current state
    Rejected(String),
    Connecting { relay_address: String },
    RelayConnected,
    TargetRequested { username: String },
    Live { username: String, message: Option<String> },
    /// Informational relay status text
    Status(String),
    /// The relay reported the stream ended
    StreamEnded(Option<String>),
    Comment(Comment),
    Disconnected { unexpected: bool, reason: Option<String> },
    Exported(ExportReceipt),
    ExportEmpty,
    ExportFailed(String),
}

/// Read-only snapshot for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub state: ConnectionState,
    pub session: Session,
    /// Feed contents, newest first
    pub comments: Vec<Comment>,
    pub stats: LiveStats,
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub target_username: String,
    pub relay_address: String,
    pub export_dir: PathBuf,
    pub export_on_stop: bool,
    pub tick_interval: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_username: config.target_username.clone(),
            relay_address: config.relay_address.clone(),
            export_dir: config.export_path.clone(),
            export_on_stop: config.export_on_stop,
            tick_interval: config.tick_interval,
        }
    }
}

/// Presentation-side ends of the orchestrator's channels.
///
/// `notices` is unbounded and carries one [`Notice::Comment`] per ingested
/// comment. Keep draining it for as long as the handle is held, or drop the
/// receiver and follow `view` instead.
pub struct SessionHandle {
    pub commands: mpsc::UnboundedSender<Command>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    pub view: watch::Receiver<SessionView>,
}

/// Top-level coordinator for one application run.
pub struct SessionOrchestrator<C: Connector> {
    session: Session,
    connection: ConnectionManager<C>,
    buffer: EventBuffer,
    export_dir: PathBuf,
    export_on_stop: bool,
    tick_interval: Duration,
    ticker: Option<Interval>,
    stats: SharedFeedStats,
    commands: mpsc::UnboundedReceiver<Command>,
    events: EventReceiver,
    notices: mpsc::UnboundedSender<Notice>,
    view: watch::Sender<SessionView>,
}

impl<C: Connector> SessionOrchestrator<C> {
    /// Create an orchestrator and the handle the presentation layer drives it with.
    ///
    /// A `tick_interval` below [`MIN_TICK_INTERVAL`] is raised to it.
    pub fn new(
        connector: C,
        options: SessionOptions,
        stats: SharedFeedStats,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let session = Session {
            target_username: options.target_username.trim().to_string(),
            relay_address: options.relay_address.trim().to_string(),
            started_at: None,
        };
        let initial_view = SessionView {
            state: ConnectionState::Disconnected,
            session: session.clone(),
            comments: Vec::new(),
            stats: LiveStats::idle(),
        };
        let (view_tx, view_rx) = watch::channel(initial_view);

        let orchestrator = Self {
            session,
            connection: ConnectionManager::new(connector, events_tx, stats.clone()),
            buffer: EventBuffer::new(),
            export_dir: options.export_dir,
            export_on_stop: options.export_on_stop,
            tick_interval: options.tick_interval.max(MIN_TICK_INTERVAL),
            ticker: None,
            stats,
            commands: commands_rx,
            events: events_rx,
            notices: notices_tx,
            view: view_tx,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            notices: notices_rx,
            view: view_rx,
        };
        (orchestrator, handle)
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    /// Live metrics as of now.
    pub fn live_stats(&self) -> LiveStats {
        LiveStats::compute(self.session.started_at, self.buffer.len(), Utc::now())
    }

    /// Current read-only snapshot.
    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.connection.state(),
            session: self.session.clone(),
            comments: self.buffer.to_vec(),
            stats: self.live_stats(),
        }
    }

    /// Process commands, socket events and ticks until shutdown.
    ///
    /// Dropping every command sender counts as shutdown.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let command = command.unwrap_or(Command::Shutdown);
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Some(event) = self.events.recv() => self.handle_socket_event(event),
                _ = next_tick(&mut self.ticker) => self.publish(),
            }
        }
        tracing::debug!("Session loop finished");
    }

    /// Apply one user command. Returns `false` once the session should end.
    pub fn handle_command(&mut self, command: Command) -> bool {
        tracing::debug!(?command, "Command");
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::SetTarget(username) => self.set_target(&username),
            Command::SetRelayAddress(address) => self.set_relay_address(&address),
            Command::Export => self.export(),
            Command::ClearFeed => {
                self.buffer.clear();
                self.publish();
            }
            Command::Shutdown => {
                self.stop();
                return false;
            }
        }
        true
    }

    /// Apply one socket event.
    pub fn handle_socket_event(&mut self, event: SocketEvent) {
        match self.connection.handle_event(event, &mut self.buffer) {
            ConnectionEvent::Ignored | ConnectionEvent::FrameDiscarded { .. } => return,
            ConnectionEvent::RelayConnected => {
                self.notify(Notice::RelayConnected);
                let target = self.session.target_username.clone();
                self.request_target(&target);
            }
            ConnectionEvent::CommentIngested { comment, .. } => {
                self.notify(Notice::Comment(comment));
            }
            ConnectionEvent::BridgeLive { message } => {
                let username = self.connection.target().unwrap_or_default().to_string();
                self.notify(Notice::Live { username, message });
            }
            ConnectionEvent::BridgeEnded { message } => self.notify(Notice::StreamEnded(message)),
            ConnectionEvent::Status { message } => {
                if let Some(message) = message {
                    self.notify(Notice::Status(message));
                }
            }
            ConnectionEvent::Dropped { reason } => {
                // Feed is kept so it can still be exported.
                self.end_timing();
                self.notify(Notice::Disconnected {
                    unexpected: true,
                    reason,
                });
            }
        }
        self.publish();
    }

    fn start(&mut self) {
        if let Err(e) = self.validate() {
            tracing::info!("Start rejected: {e}");
            self.notify(Notice::ValidationFailed(e));
            return;
        }
        if self.connection.state() != ConnectionState::Disconnected {
            self.notify(Notice::Rejected(format!(
                "Already running ({})",
                self.connection.state()
            )));
            return;
        }

        // Duration includes connection setup, so the clock starts now.
        self.session.started_at = Some(Utc::now());
        if let Err(e) = self
            .connection
            .start_relay_connection(&self.session.relay_address)
        {
            self.session.started_at = None;
            self.notify(Notice::Rejected(e.to_string()));
            return;
        }

        self.buffer.clear();
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);

        self.notify(Notice::Connecting {
            relay_address: self.session.relay_address.clone(),
        });
        self.publish();
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.session.target_username.is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        if self.session.relay_address.is_empty() {
            return Err(ValidationError::EmptyRelayAddress);
        }
        Ok(())
    }

    /// Explicit stop: disconnect, cancel the ticker, reset the feed.
    fn stop(&mut self) {
        if self.export_on_stop && !self.buffer.is_empty() {
            self.export();
        }

        let was_connected = self.connection.stop();
        self.end_timing();
        self.buffer.clear();

        if was_connected {
            self.notify(Notice::Disconnected {
                unexpected: false,
                reason: None,
            });
        }
        self.publish();
    }

    fn end_timing(&mut self) {
        self.session.started_at = None;
        self.ticker = None;
    }

    fn set_target(&mut self, username: &str) {
        let username = username.trim();
        if username.is_empty() {
            self.notify(Notice::ValidationFailed(ValidationError::EmptyUsername));
            return;
        }

        let already_requested = self.connection.target() == Some(username);
        self.session.target_username = username.to_string();
        if self.connection.state().is_relay_open() && !already_requested {
            self.request_target(username);
        }
        self.publish();
    }

    fn request_target(&mut self, username: &str) {
        match self.connection.request_target_connection(username) {
            Ok(()) => self.notify(Notice::TargetRequested {
                username: username.to_string(),
            }),
            Err(e) => self.notify(Notice::Rejected(e.to_string())),
        }
    }

    fn set_relay_address(&mut self, address: &str) {
        if self.connection.state() != ConnectionState::Disconnected {
            self.notify(Notice::Rejected(
                "Relay address cannot change while connected".to_string(),
            ));
            return;
        }
        let address = address.trim();
        if address.is_empty() {
            self.notify(Notice::ValidationFailed(ValidationError::EmptyRelayAddress));
            return;
        }
        self.session.relay_address = address.to_string();
        self.publish();
    }

    fn export(&mut self) {
        match export_feed(&self.export_dir, &self.session.target_username, &self.buffer) {
            Ok(receipt) => {
                self.stats.record_export();
                self.notify(Notice::Exported(receipt));
            }
            Err(ExportError::Empty) => self.notify(Notice::ExportEmpty),
            Err(e) => {
                tracing::warn!("Export failed: {e}");
                self.notify(Notice::ExportFailed(e.to_string()));
            }
        }
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    fn publish(&self) {
        self.view.send_replace(self.view());
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
