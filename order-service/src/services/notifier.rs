//! Best-effort live events for order displays.
//!
//! Emission never blocks and never fails the caller: an event with no
//! listeners is simply dropped.

use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::models::{Order, OrderType};

/// Channel every kitchen display listens on.
pub const RESTAURANT_CHANNEL: &str = "restaurant";
pub const NEW_ORDER_EVENT: &str = "newOrder";
pub const ORDER_STATUS_CHANGE_EVENT: &str = "orderStatusChange";

/// Channel for a single dine-in table.
pub fn table_channel(table: &str) -> String {
    format!("table-{}", table)
}

/// Display channels that follow an order: the restaurant, plus the table
/// for dine-in orders.
pub fn order_channels(order: &Order) -> Vec<String> {
    let mut channels = vec![RESTAURANT_CHANNEL.to_string()];
    if order.order_type == OrderType::DineIn {
        if let Some(table) = order.table_number.as_deref().filter(|t| !t.is_empty()) {
            channels.push(table_channel(table));
        }
    }
    channels
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LiveEvent {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

pub trait Notifier: Send + Sync {
    fn emit(&self, channel: &str, event: &str, payload: Value);
}

/// Emit `event` for `order` on each channel that follows it.
pub fn notify_order(notifier: &dyn Notifier, event: &str, order: &Order) {
    let payload = match serde_json::to_value(order) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(order_id = %order.order_id, error = %e, "Failed to serialize order event");
            return;
        }
    };
    for channel in order_channels(order) {
        notifier.emit(&channel, event, payload.clone());
    }
}

/// Fan-out over a `tokio::sync::broadcast` channel; SSE handlers subscribe
/// and filter by channel name.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<LiveEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn emit(&self, channel: &str, event: &str, payload: Value) {
        let live = LiveEvent {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        };
        if self.sender.send(live).is_err() {
            tracing::debug!(channel = %channel, event = %event, "No live listeners, event dropped");
        }
    }
}

/// Keeps every emitted event in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<LiveEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LiveEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.event == event).count()
    }
}

impl Notifier for RecordingNotifier {
    fn emit(&self, channel: &str, event: &str, payload: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(LiveEvent {
                channel: channel.to_string(),
                event: event.to_string(),
                payload,
            });
        }
    }
}
