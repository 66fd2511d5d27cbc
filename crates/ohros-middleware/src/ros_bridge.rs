//! rosbridge-compatible WebSocket endpoint.
//!
//! [`RosBridge`] is the ROS-facing half of the bridge:
//!
//! 1. **Outbound** – every [`Topic::ItemUpdates`] event is pushed to every
//!    connected client as a rosbridge v2 `publish` frame on the configured
//!    update topic, e.g.
//!    `{"op":"publish","topic":"/openhab/updates","msg":{"key":"temp","value":"70"}}`.
//!    [`Topic::Stats`] events go out the same way on the stats topic.
//!
//! 2. **Inbound** – `publish` frames on the command or set topic are parsed
//!    into [`CommandEvent`]s and published on [`Topic::Commands`], where the
//!    command router picks them up.
//!
//! Anything else a client sends (subscribe/advertise ops, unknown topics,
//! invalid JSON) is ignored.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use ohros_types::{BridgeError, CommandEvent, Event, EventPayload, ItemUpdate, StatsSnapshot};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Topic};

/// ROS topic names used on the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTopics {
    pub update: String,
    pub command: String,
    pub set: String,
    pub stats: String,
}

impl Default for BridgeTopics {
    fn default() -> Self {
        Self {
            update: "/openhab/updates".to_string(),
            command: "/openhab/command".to_string(),
            set: "/openhab/set".to_string(),
            stats: "/openhab/stats".to_string(),
        }
    }
}

/// Bridge between ROS clients on a WebSocket and the internal [`EventBus`].
#[derive(Clone)]
pub struct RosBridge {
    bus: Arc<EventBus>,
    topics: Arc<BridgeTopics>,
}

impl RosBridge {
    /// Create a new bridge backed by `bus`.
    pub fn new(bus: Arc<EventBus>, topics: BridgeTopics) -> Self {
        Self {
            bus,
            topics: Arc::new(topics),
        }
    }

    // -----------------------------------------------------------------------
    // Frame encoding
    // -----------------------------------------------------------------------

    /// Build the rosbridge `publish` frame for an item change.
    pub fn build_update_frame(&self, update: &ItemUpdate) -> String {
        json!({
            "op": "publish",
            "topic": self.topics.update,
            "msg": { "key": update.key, "value": update.value }
        })
        .to_string()
    }

    /// Build the rosbridge `publish` frame for a stats snapshot.
    pub fn build_stats_frame(&self, snapshot: &StatsSnapshot) -> String {
        json!({
            "op": "publish",
            "topic": self.topics.stats,
            "msg": {
                "timestamp": snapshot.timestamp.to_rfc3339(),
                "updates": snapshot.updates,
                "commands": snapshot.commands,
                "errors": snapshot.errors
            }
        })
        .to_string()
    }

    // -----------------------------------------------------------------------
    // Inbound parsing
    // -----------------------------------------------------------------------

    /// Parse an incoming WebSocket text frame.
    ///
    /// Returns `Some` only for `publish` frames on the command or set topic
    /// that carry a `msg.key` string and a `msg.value`. Non-string values
    /// (numbers, booleans) are rendered with their JSON text.
    pub fn parse_inbound(&self, text: &str) -> Option<CommandEvent> {
        let json: Value = serde_json::from_str(text).ok()?;
        if json.get("op").and_then(Value::as_str) != Some("publish") {
            return None;
        }
        let topic = json.get("topic").and_then(Value::as_str)?;
        let msg = json.get("msg")?;
        let key = msg.get("key").and_then(Value::as_str)?;
        let value = match msg.get("value")? {
            Value::String(s) => s.clone(),
            Value::Null => return None,
            other => other.to_string(),
        };

        if topic == self.topics.command {
            Some(CommandEvent::command(key, value))
        } else if topic == self.topics.set {
            Some(CommandEvent::set(key, value))
        } else {
            None
        }
    }

    /// Parse `text` and, if it is a command or set request, publish it on
    /// [`Topic::Commands`].
    pub fn handle_incoming_ws_message(&self, text: &str) {
        let Some(command) = self.parse_inbound(text) else {
            debug!(frame = %text, "ignoring ws frame");
            return;
        };
        let event = Event::new("ohros-middleware::rosbridge", EventPayload::Inbound(command));
        if let Err(e) = self.bus.publish_to(Topic::Commands, event) {
            warn!(error = %e, "inbound command dropped");
        }
    }

    // -----------------------------------------------------------------------
    // WebSocket server
    // -----------------------------------------------------------------------

    /// Start a WebSocket server on `addr`.
    ///
    /// Runs until the listener cannot be bound; per-client failures are
    /// logged and only end that client's session.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if the TCP listener cannot be bound.
    pub async fn run_ws_server(self, addr: SocketAddr) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Transport(format!("ws bind error on {addr}: {e}")))?;
        info!(%addr, "rosbridge endpoint listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), BridgeError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| BridgeError::Transport(format!("ws handshake from {peer}: {e}")))?;
        info!(%peer, "ros client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut updates = self.bus.subscribe_to(Topic::ItemUpdates);
        let mut stats = self.bus.subscribe_to(Topic::Stats);

        loop {
            let frame = tokio::select! {
                result = updates.recv() => match result {
                    Ok(Event { payload: EventPayload::ItemChanged(update), .. }) => {
                        Some(self.build_update_frame(&update))
                    }
                    Ok(_) => None,
                    Err(RecvError::Lagged(n)) => {
                        warn!(peer = %peer, lagged_by = n, "ws client lagged");
                        None
                    }
                    Err(RecvError::Closed) => break,
                },
                result = stats.recv() => match result {
                    Ok(Event { payload: EventPayload::Stats(snapshot), .. }) => {
                        Some(self.build_stats_frame(&snapshot))
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => None,
                    Err(RecvError::Closed) => break,
                },
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Text(text))) => {
                        self.handle_incoming_ws_message(text.as_str());
                        None
                    }
                    _ => None,
                },
            };

            if let Some(frame) = frame
                && ws_tx.send(Message::Text(frame.into())).await.is_err()
            {
                break;
            }
        }

        info!(%peer, "ros client disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ohros_types::CommandKind;

    fn make_bridge() -> (Arc<EventBus>, RosBridge) {
        let bus = Arc::new(EventBus::default());
        let bridge = RosBridge::new(Arc::clone(&bus), BridgeTopics::default());
        (bus, bridge)
    }

    #[test]
    fn update_frame_is_rosbridge_publish() {
        let (_bus, bridge) = make_bridge();
        let frame = bridge.build_update_frame(&ItemUpdate::new("temp", "70"));
        let json: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["op"], "publish");
        assert_eq!(json["topic"], "/openhab/updates");
        assert_eq!(json["msg"]["key"], "temp");
        assert_eq!(json["msg"]["value"], "70");
    }

    #[test]
    fn stats_frame_carries_counters() {
        let (_bus, bridge) = make_bridge();
        let frame = bridge.build_stats_frame(&StatsSnapshot {
            timestamp: chrono::Utc::now(),
            updates: 5,
            commands: 4,
            errors: 3,
        });
        let json: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["topic"], "/openhab/stats");
        assert_eq!(json["msg"]["updates"], 5);
        assert_eq!(json["msg"]["errors"], 3);
    }

    #[test]
    fn parse_command_and_set_frames() {
        let (_bus, bridge) = make_bridge();
        let cmd = bridge
            .parse_inbound(r#"{"op":"publish","topic":"/openhab/command","msg":{"key":"Light","value":"ON"}}"#)
            .unwrap();
        assert_eq!(cmd, CommandEvent::command("Light", "ON"));

        let set = bridge
            .parse_inbound(r#"{"op":"publish","topic":"/openhab/set","msg":{"key":"Dimmer","value":42}}"#)
            .unwrap();
        assert_eq!(set.kind, CommandKind::Set);
        assert_eq!(set.value, "42");
    }

    #[test]
    fn parse_ignores_other_frames() {
        let (_bus, bridge) = make_bridge();
        assert!(bridge.parse_inbound("not json").is_none());
        assert!(bridge
            .parse_inbound(r#"{"op":"subscribe","topic":"/openhab/updates"}"#)
            .is_none());
        assert!(bridge
            .parse_inbound(r#"{"op":"publish","topic":"/cmd_vel","msg":{"key":"a","value":"b"}}"#)
            .is_none());
        assert!(bridge
            .parse_inbound(r#"{"op":"publish","topic":"/openhab/command","msg":{"value":"ON"}}"#)
            .is_none());
    }

    #[tokio::test]
    async fn incoming_command_is_published_on_commands_topic() {
        let (bus, bridge) = make_bridge();
        let mut rx = bus.subscribe_to(Topic::Commands);

        bridge.handle_incoming_ws_message(
            r#"{"op":"publish","topic":"/openhab/command","msg":{"key":"ROS_COMMAND","value":"REFRESH"}}"#,
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "ohros-middleware::rosbridge");
        match event.payload {
            EventPayload::Inbound(cmd) => {
                assert_eq!(cmd, CommandEvent::command(ohros_types::CONTROL_KEY, "REFRESH"));
            }
            other => panic!("expected Inbound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_frame_publishes_nothing() {
        let (bus, bridge) = make_bridge();
        let mut rx = bus.subscribe_to(Topic::Commands);
        bridge.handle_incoming_ws_message(r#"{"op":"advertise","topic":"/openhab/command"}"#);
        assert!(rx.try_recv().is_err());
    }
}
