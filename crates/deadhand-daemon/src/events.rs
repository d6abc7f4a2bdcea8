//! Daemon event bus.
//!
//! Every poll, lifecycle transition and simulation run is broadcast as an
//! [`Event`]. Subscribers get an independent buffer; slow ones lose the
//! oldest events rather than stalling the daemon.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "HealthPolled", "SwitchTriggered").
    pub event_type: String,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, timestamp: u64, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp,
            payload,
        }
    }

    pub fn category(&self) -> &'static str {
        categorize_event(&self.event_type)
    }
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Category filter: "health", "lifecycle", "simulation", "system".
    pub categories: Option<Vec<String>>,
    /// Only events about this switch.
    pub switch_id: Option<String>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: Event) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(event_type = %event.event_type, category = event.category(), "event emitted");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref categories) = self.categories {
            if !categories.iter().any(|c| c == event.category()) {
                return false;
            }
        }

        if let Some(ref switch_id) = self.switch_id {
            if let Some(id) = event.payload.get("switch_id").and_then(|v| v.as_str()) {
                if id != switch_id {
                    return false;
                }
            }
        }

        true
    }
}

fn categorize_event(event_type: &str) -> &'static str {
    match event_type {
        s if s.starts_with("Health") || s.starts_with("Guardian") => "health",
        s if s.starts_with("Switch") || s.starts_with("CheckIn") => "lifecycle",
        s if s.starts_with("Simulation") => "simulation",
        _ => "system",
    }
}
