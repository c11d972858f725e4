//! Session Statistics
//!
//! Counters describing everything the session has received. The counters are
//! monotonic for the life of the process and keyed only by the closed set of
//! [`EventKind`] labels, so memory stays bounded over unbounded runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::streaming::EventKind;

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Logical messages received.
    pub total: u64,
    /// Messages classified into a known variant.
    pub parsed_ok: u64,
    /// Messages that fell back to `Unknown`.
    pub unknown: u64,
    /// Subset of `unknown`: frames that were not valid JSON.
    pub undecodable: u64,
    /// Reconnect attempts made after a lost connection.
    pub reconnects: u64,
    /// Message counts per event type label.
    pub by_type: BTreeMap<&'static str, u64>,
    /// Label of the most recent message.
    pub last_event_type: Option<&'static str>,
    /// Receive time of the most recent message.
    pub last_message_at: Option<DateTime<Utc>>,
}

impl SessionStats {
    /// Render the per-type distribution as `k:v,k:v` in label order.
    #[must_use]
    pub fn types_summary(&self) -> String {
        self.by_type
            .iter()
            .map(|(label, count)| format!("{label}:{count}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Thread-safe session counters.
///
/// The lock is held for a single update or a single clone, never across I/O.
#[derive(Debug, Default)]
pub struct StatsTracker {
    inner: Mutex<SessionStats>,
}

impl StatsTracker {
    /// Create a tracker with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one received logical message.
    pub fn record_received(&self, kind: EventKind) {
        self.record_received_at(kind, Utc::now());
    }

    /// Count one received logical message with an explicit receive time.
    pub fn record_received_at(&self, kind: EventKind, received_at: DateTime<Utc>) {
        let label = kind.label();
        let mut stats = self.inner.lock();
        stats.total += 1;
        match kind {
            EventKind::Unknown { undecodable } => {
                stats.unknown += 1;
                if undecodable {
                    stats.undecodable += 1;
                }
            }
            _ => stats.parsed_ok += 1,
        }
        *stats.by_type.entry(label).or_insert(0) += 1;
        stats.last_event_type = Some(label);
        stats.last_message_at = Some(received_at);
    }

    /// Count one reconnect attempt.
    pub fn record_reconnect(&self) {
        self.inner.lock().reconnects += 1;
    }

    /// Consistent copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> SessionStats {
        self.inner.lock().clone()
    }

    /// Total messages received so far.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.inner.lock().total
    }
}
