//! In-process stand-in for the relay.
//!
//! Speaks the same JSON frames as a real relay so the whole connection state
//! machine runs offline: it opens, acknowledges `connect` with two status
//! messages, then emits a random comment every few seconds until told to
//! disconnect.

use crate::relay::protocol::ClientMessage;
use crate::relay::transport::{
    Connector, EventSender, Outbound, SocketEvent, SocketId, TransportError, TransportEvent,
    TransportHandle,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

const SAMPLE_COMMENTS: &[&str] = &[
    "Amazing live stream! 🔥",
    "Hello from Indonesia! 🇮🇩",
    "Great content as always",
    "Can you see my comment?",
    "Love this! Keep it up! ❤️",
    "Watching from Jakarta",
    "This is so cool!",
    "First time here, loving it!",
    "Can't wait for the next stream",
    "You're the best! 🌟",
];

const SAMPLE_USERNAMES: &[&str] = &[
    "tiktoker123",
    "indolover",
    "jakartaboy",
    "streamfan",
    "coolvibes",
    "musiclover88",
    "trendsetter",
    "viralqueen",
    "contentking",
    "livewatcher",
];

const SAMPLE_NICKNAMES: &[&str] = &[
    "Stream Lover",
    "Jakarta Vibes",
    "Music Fan",
    "Trend Setter",
    "Viral Queen",
    "Content King",
    "Live Watcher",
    "Indonesia Pride",
    "Cool Vibes",
    "Stream Master",
];

/// Timing of the simulated relay.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Delay before the socket reports open
    pub open_delay: Duration,
    /// Delay between the `connect` request and the bridge confirmation
    pub bridge_delay: Duration,
    /// Shortest gap between comments
    pub min_comment_gap: Duration,
    /// Longest gap between comments
    pub max_comment_gap: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            open_delay: Duration::from_millis(200),
            bridge_delay: Duration::from_secs(2),
            min_comment_gap: Duration::from_secs(1),
            max_comment_gap: Duration::from_secs(5),
        }
    }
}

/// Connector that opens simulated relay sockets.
#[derive(Debug, Clone, Default)]
pub struct SimulatedConnector {
    config: SimulatorConfig,
}

impl SimulatedConnector {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }
}

impl Connector for SimulatedConnector {
    fn open(
        &mut self,
        id: SocketId,
        address: &str,
        events: EventSender,
    ) -> Result<TransportHandle, TransportError> {
        tracing::info!(%id, %address, "Opening simulated relay");
        let (handle, outbound_rx) = TransportHandle::new(id);
        tokio::spawn(run_simulated_relay(
            id,
            self.config.clone(),
            outbound_rx,
            events,
        ));
        Ok(handle)
    }
}

async fn run_simulated_relay(
    id: SocketId,
    config: SimulatorConfig,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    events: EventSender,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(SocketEvent::new(id, event));
    };

    tokio::time::sleep(config.open_delay).await;
    emit(TransportEvent::Opened);

    let mut rng = StdRng::from_entropy();
    let mut bridged = false;

    loop {
        let gap = random_gap(&mut rng, &config);
        tokio::select! {
            out = outbound_rx.recv() => match out {
                Some(Outbound::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Connect { username }) => {
                        emit(TransportEvent::Frame(status_frame(
                            &format!("Connecting to @{username}..."),
                            None,
                        )));
                        tokio::time::sleep(config.bridge_delay).await;
                        emit(TransportEvent::Frame(status_frame(
                            &format!("Connected to @{username}"),
                            Some(true),
                        )));
                        bridged = true;
                    }
                    Ok(ClientMessage::Disconnect) => bridged = false,
                    Err(e) => tracing::warn!(%id, "Simulated relay got invalid JSON: {e}"),
                },
                Some(Outbound::Close) | None => {
                    emit(TransportEvent::Closed);
                    return;
                }
            },
            _ = tokio::time::sleep(gap), if bridged => {
                emit(TransportEvent::Frame(random_comment_frame(&mut rng)));
            }
        }
    }
}

fn random_gap(rng: &mut StdRng, config: &SimulatorConfig) -> Duration {
    let min = config.min_comment_gap.as_millis() as u64;
    let max = (config.max_comment_gap.as_millis() as u64).max(min);
    Duration::from_millis(rng.gen_range(min..=max))
}

fn status_frame(message: &str, connected: Option<bool>) -> String {
    let mut frame = json!({ "type": "status", "message": message });
    if let Some(connected) = connected {
        frame["connected"] = json!(connected);
    }
    frame.to_string()
}

fn random_comment_frame(rng: &mut StdRng) -> String {
    let pick = |rng: &mut StdRng, items: &[&'static str]| -> &'static str {
        items.choose(rng).copied().unwrap_or_default()
    };
    json!({
        "type": "comment",
        "username": pick(rng, SAMPLE_USERNAMES),
        "nickname": pick(rng, SAMPLE_NICKNAMES),
        "comment": pick(rng, SAMPLE_COMMENTS),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::protocol::RelayMessage;

    fn fast() -> SimulatorConfig {
        SimulatorConfig {
            open_delay: Duration::from_millis(1),
            bridge_delay: Duration::from_millis(1),
            min_comment_gap: Duration::from_millis(1),
            max_comment_gap: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_generated_frames_parse() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let frame = random_comment_frame(&mut rng);
            assert!(matches!(
                RelayMessage::parse(&frame),
                Ok(RelayMessage::Comment {
                    username: Some(_),
                    nickname: Some(_),
                    comment: Some(_)
                })
            ));
        }
        assert!(RelayMessage::parse(&status_frame("ok", Some(true)))
            .unwrap()
            .is_bridge_active());
    }

    #[tokio::test]
    async fn test_simulated_handshake() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut connector = SimulatedConnector::new(fast());
        let handle = connector.open(SocketId(1), "sim://", events_tx).unwrap();

        assert_eq!(events_rx.recv().await.unwrap().event, TransportEvent::Opened);

        handle
            .send_text(
                ClientMessage::Connect {
                    username: "alice".to_string(),
                }
                .encode()
                .unwrap(),
            )
            .unwrap();

        let mut saw_live = false;
        let mut comments = 0;
        while comments < 3 {
            let event = events_rx.recv().await.unwrap();
            if let TransportEvent::Frame(frame) = event.event {
                match RelayMessage::parse(&frame).unwrap() {
                    msg if msg.is_bridge_active() => saw_live = true,
                    RelayMessage::Comment { .. } => {
                        assert!(saw_live, "comments only after the bridge is live");
                        comments += 1;
                    }
                    _ => {}
                }
            }
        }

        handle.close();
        loop {
            if events_rx.recv().await.unwrap().event == TransportEvent::Closed {
                break;
            }
        }
    }
}
