//! `ohros-middleware` – Bus plumbing
//!
//! Moves events between the openHAB side of the bridge and ROS clients
//! without caring about what the items mean.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`ros_bridge`] – rosbridge-compatible WebSocket endpoint that publishes
//!   item changes to ROS clients and turns their `command` / `set` publishes
//!   into [`CommandEvent`][ohros_types::CommandEvent]s.

pub mod bus;
pub mod ros_bridge;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use ros_bridge::{BridgeTopics, RosBridge};
