//! SPL Meter Agent - rolling sound level averages from a USB HID meter.
//!
//! This library polls a WL100-style sound pressure level meter over raw HID
//! feature reports, decodes each report into a decibel reading and keeps a
//! set of rolling averages over the last 1/5/15/30 seconds and minutes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SPL Meter Agent                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────────┐     │
//! │  │HidTransport │──▶│DeviceSession│──▶│   Aggregator    │     │
//! │  │  (hidapi)   │   │  (decode,   │   │ (history, eight │     │
//! │  └─────────────┘   │  reconnect) │   │   windows)      │     │
//! │                    └─────────────┘   └─────────────────┘     │
//! │                           │                   │              │
//! │                           ▼                   ▼              │
//! │                    ┌─────────────┐   ┌─────────────────┐     │
//! │                    │SessionStats │   │ monitor::run    │     │
//! │                    │             │   │   (reports)     │     │
//! │                    └─────────────┘   └─────────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use spl_meter_agent::{Config, DefaultTransport, DeviceSession, MonotonicClock};
//!
//! let config = Config::default();
//! let mut session = DeviceSession::new(
//!     DefaultTransport::new(),
//!     config.device.clone(),
//!     &config.aggregator,
//!     MonotonicClock,
//! );
//!
//! // Blocks until the meter answers, reconnecting as needed.
//! let state = session.poll(true).expect("stopped");
//! println!("{} dBA, 1sec avg {:?}", state.instant, state.windows.sec_1);
//! ```

pub mod config;
pub mod core;
pub mod device;
pub mod monitor;
pub mod stats;

// Re-export key types at crate root for convenience
pub use crate::config::{AggregatorConfig, Config, ConfigError, DeviceConfig};
pub use crate::core::{
    decode_report, Aggregator, AggregatorState, Clock, ManualClock, MonotonicClock, Sample,
    SharedAggregator, Window, WindowAverages,
};
pub use crate::device::{
    hid_available, DefaultTransport, DeviceError, DeviceSession, HidTransport, SessionState,
    StopToken,
};
pub use crate::monitor::{run, MonitorError, Report, ReportFormat, RunOptions, RunSummary};
pub use crate::stats::{SessionStats, SharedSessionStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
