//! Signal dispatcher for Home Assistant
//!
//! The dispatcher is the lightweight sibling of the event bus: integrations
//! use it to notify their own entities (e.g. "device X changed") without
//! going through typed events. Signals are plain strings, delivery is
//! fire-and-forget, and a signal nobody listens to is simply dropped.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity per signal
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A signal as delivered to connected receivers
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Signal name
    pub name: String,
    /// Optional payload
    pub payload: Option<serde_json::Value>,
}

/// The signal dispatcher
pub struct Dispatcher {
    /// Map of signal names to their broadcast senders
    signals: DashMap<String, broadcast::Sender<Signal>>,
    /// Channel capacity
    capacity: usize,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new dispatcher with specified per-signal channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            signals: DashMap::new(),
            capacity,
        }
    }

    /// Connect to a signal
    ///
    /// Dropping the receiver disconnects.
    pub fn connect(&self, signal: impl Into<String>) -> broadcast::Receiver<Signal> {
        let signal = signal.into();
        trace!(signal = %signal, "Connecting to signal");

        self.signals
            .entry(signal)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send a signal to every connected receiver
    ///
    /// Returns the number of receivers reached. Senders left without
    /// receivers are pruned.
    pub fn send(&self, signal: &str, payload: Option<serde_json::Value>) -> usize {
        let Some(sender) = self.signals.get(signal).map(|s| s.clone()) else {
            trace!(signal, "No receivers for signal");
            return 0;
        };

        let delivered = sender
            .send(Signal {
                name: signal.to_string(),
                payload,
            })
            .unwrap_or(0);

        if delivered == 0 {
            self.signals
                .remove_if(signal, |_, tx| tx.receiver_count() == 0);
        }

        debug!(signal, delivered, "Dispatched signal");
        delivered
    }

    /// Number of receivers currently connected to a signal
    pub fn receiver_count(&self, signal: &str) -> usize {
        self.signals
            .get(signal)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for Dispatcher
pub type SharedDispatcher = Arc<Dispatcher>;
