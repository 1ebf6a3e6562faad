//! Refresh signals: "something changed, re-fetch".
//!
//! Delivery is at-most-once and best effort. Nobody listening is fine, and a
//! slow browser that lags behind simply misses old signals.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::sources::SignalRelay;

/// Payload of a refresh broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSignal {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub info: Value,
}

/// In-process fan-out of refresh signals, optionally relayed elsewhere.
#[derive(Clone)]
pub struct RefreshHub {
    tx: broadcast::Sender<RefreshSignal>,
    source: String,
    relay: Option<Arc<dyn SignalRelay>>,
}

impl RefreshHub {
    pub fn new(capacity: usize, source: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            source: source.into(),
            relay: None,
        }
    }

    pub fn with_relay(mut self, relay: Arc<dyn SignalRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshSignal> {
        self.tx.subscribe()
    }

    /// Broadcast a signal; returns how many local subscribers received it.
    pub async fn publish(&self, info: Value) -> usize {
        let signal = RefreshSignal {
            timestamp: Utc::now(),
            source: self.source.clone(),
            info,
        };

        let delivered = self.tx.send(signal.clone()).unwrap_or(0);
        debug!(delivered, "Published refresh signal");

        if let Some(relay) = &self.relay
            && let Err(e) = relay.publish(&signal).await
        {
            warn!(error = %e, "Failed to relay refresh signal");
        }

        delivered
    }
}
