//! Polling loop and periodic reports.
//!
//! [`run`] polls the session at a fixed cadence, writes a report every
//! report interval and one final report when it stops. It takes the session
//! (and through it the transport, aggregator and clock) and the output sink
//! as parameters, so it can be driven with a fake transport and a manual
//! clock. The run duration is handed to the session as a deadline, so a run
//! that is stuck reconnecting still ends on time.

use crate::config::Config;
use crate::core::aggregator::AggregatorState;
use crate::core::clock::Clock;
use crate::core::windows::Window;
use crate::device::{DeviceError, DeviceSession, HidTransport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::str::FromStr;
use std::time::Duration;

/// How reports are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Multi-line human readable block
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" | "jsonl" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{other}' (expected text or json)")),
        }
    }
}

/// Parameters of a monitoring run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stop after this long; `None` runs until stopped
    pub duration: Option<Duration>,
    /// Delay between polls
    pub poll_interval: Duration,
    /// Minimum time between reports
    pub report_interval: Duration,
    /// Absorb device errors instead of returning them
    pub auto_reconnect: bool,
    pub format: ReportFormat,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            duration: None,
            poll_interval: Duration::from_millis(10),
            report_interval: Duration::from_secs(1),
            auto_reconnect: true,
            format: ReportFormat::Text,
        }
    }
}

impl RunOptions {
    /// Cadence settings from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            report_interval: config.report_interval,
            ..Self::default()
        }
    }
}

/// One periodic report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Wall-clock time the report was written
    pub timestamp: DateTime<Utc>,
    /// Whole seconds since the run started
    pub elapsed_secs: u64,
    #[serde(flatten)]
    pub state: AggregatorState,
}

impl Report {
    pub fn new(state: AggregatorState, elapsed: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            elapsed_secs: elapsed.as_secs_f64().round() as u64,
            state,
        }
    }

    /// Human readable block, terminated by a blank line.
    pub fn to_text(&self) -> String {
        let windows = &self.state.windows;
        let group = |ws: &[Window]| {
            ws.iter()
                .map(|w| format!("{}={}", w.label(), format_optional(windows.get(*w))))
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "{}dBA\n({})\n({})\n{} values\nElapsed: {}s\n\n",
            format_value(self.state.instant),
            group(&Window::ALL[..4]),
            group(&Window::ALL[4..]),
            self.state.sample_count,
            self.elapsed_secs
        )
    }

    /// Write this report to `sink` in `format`.
    pub fn write_to<W: Write>(&self, sink: &mut W, format: ReportFormat) -> std::io::Result<()> {
        match format {
            ReportFormat::Text => sink.write_all(self.to_text().as_bytes())?,
            ReportFormat::Json => {
                serde_json::to_writer(&mut *sink, self)?;
                writeln!(sink)?;
            }
        }
        sink.flush()
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), format_value)
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Successful polls
    pub polls: u64,
    /// Reports written, including the final one
    pub reports: u64,
    pub elapsed: Duration,
    /// State at the end of the run
    pub last_state: AggregatorState,
    /// Whether the run ended because the stop token fired
    pub stopped: bool,
}

/// Errors that end a run early.
#[derive(Debug)]
pub enum MonitorError {
    /// Device error with auto-reconnect disabled
    Device(DeviceError),
    /// Writing a report failed
    Io(std::io::Error),
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::Device(e) => write!(f, "{e}"),
            MonitorError::Io(e) => write!(f, "Report output error: {e}"),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Device(e) => Some(e),
            MonitorError::Io(e) => Some(e),
        }
    }
}

impl From<DeviceError> for MonitorError {
    fn from(e: DeviceError) -> Self {
        MonitorError::Device(e)
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(e: std::io::Error) -> Self {
        MonitorError::Io(e)
    }
}

/// Poll `session` until the duration elapses or its stop token fires.
pub fn run<T, C, W>(
    session: &mut DeviceSession<T, C>,
    options: &RunOptions,
    sink: &mut W,
) -> Result<RunSummary, MonitorError>
where
    T: HidTransport,
    C: Clock,
    W: Write,
{
    let start = session.clock().now();
    let deadline = options.duration.map(|duration| start + duration);
    let mut last_report = start;
    let mut last_state = *session.aggregator().state();
    let mut polls = 0u64;
    let mut reports = 0u64;
    let mut stopped = false;

    loop {
        let now = session.clock().now();
        if let Some(duration) = options.duration {
            if now.saturating_duration_since(start) >= duration {
                break;
            }
        }
        if session.stop_token().is_stopped() {
            stopped = true;
            break;
        }

        match session.poll_until(options.auto_reconnect, deadline) {
            Ok(state) => {
                last_state = state;
                polls += 1;
            }
            Err(DeviceError::Stopped) => {
                stopped = true;
                break;
            }
            Err(DeviceError::TimedOut) => break,
            Err(e) => return Err(e.into()),
        }

        let now = session.clock().now();
        if now.saturating_duration_since(last_report) >= options.report_interval {
            Report::new(last_state, now.saturating_duration_since(start))
                .write_to(sink, options.format)?;
            reports += 1;
            last_report = now;
        }

        session.clock().sleep(options.poll_interval);
    }

    let elapsed = session.clock().now().saturating_duration_since(start);
    Report::new(last_state, elapsed).write_to(sink, options.format)?;
    reports += 1;

    tracing::debug!("Run finished after {polls} polls and {reports} reports");

    Ok(RunSummary {
        polls,
        reports,
        elapsed,
        last_state,
        stopped,
    })
}
