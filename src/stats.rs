//! Session statistics.
//!
//! Counts what happened on the device link during this process's lifetime:
//! successful readings, each kind of failure, and reconnects. Nothing here is
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::device::DeviceError;

/// Lock-free counters for one device session.
#[derive(Debug)]
pub struct SessionStats {
    /// Reports decoded and fed to the aggregator
    readings: AtomicU64,
    /// Report fetches that failed
    transport_errors: AtomicU64,
    /// Reports too short to decode
    format_errors: AtomicU64,
    /// Re-open attempts that failed
    connection_failures: AtomicU64,
    /// Re-opens after a lost connection
    reconnects: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            readings: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            format_errors: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    pub fn record_reading(&self) {
        self.readings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failure under its kind.
    pub fn record_error(&self, error: &DeviceError) {
        let counter = match error {
            DeviceError::Connection(_) => &self.connection_failures,
            DeviceError::Transport(_) => &self.transport_errors,
            DeviceError::Format { .. } => &self.format_errors,
            DeviceError::Stopped | DeviceError::TimedOut => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            readings: self.readings.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            format_errors: self.format_errors.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Readings: {}\n\
             - Transport errors: {}\n\
             - Format errors: {}\n\
             - Failed re-opens: {}\n\
             - Reconnects: {}\n\
             - Session duration: {} seconds",
            stats.readings,
            stats.transport_errors,
            stats.format_errors,
            stats.connection_failures,
            stats.reconnects,
            stats.session_duration_secs
        )
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub readings: u64,
    pub transport_errors: u64,
    pub format_errors: u64,
    pub connection_failures: u64,
    pub reconnects: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared session statistics.
pub type SharedSessionStats = Arc<SessionStats>;
