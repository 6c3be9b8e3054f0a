//! Core functionality for the SPL meter agent.
//!
//! This module contains:
//! - Clock sources used to timestamp and age samples
//! - The fixed set of averaging windows
//! - The sample history and windowed aggregator
//! - Decoding of the meter's feature report

pub mod aggregator;
pub mod clock;
pub mod decode;
pub mod windows;

// Re-export commonly used types
pub use aggregator::{Aggregator, AggregatorState, Sample, SharedAggregator};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use decode::{decode_report, REPORT_ID, REPORT_MAX_LEN};
pub use windows::{Window, WindowAverages};
