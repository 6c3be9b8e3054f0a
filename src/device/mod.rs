//! Device session for the USB sound level meter.
//!
//! The session owns the HID transport, reads feature reports, decodes them
//! and feeds the readings to the aggregator. With auto-reconnect enabled it
//! keeps retrying until a reading succeeds: a failed read triggers a re-open,
//! and a failed re-open waits a fixed backoff before the next cycle. There is
//! no retry limit; the loop only ends on success, when the caller's
//! [`StopToken`] fires, or at the deadline passed to
//! [`DeviceSession::poll_until`].

use crate::config::{AggregatorConfig, DeviceConfig};
use crate::core::aggregator::{Aggregator, AggregatorState};
use crate::core::clock::{Clock, MonotonicClock};
use crate::core::decode::{decode_report, REPORT_ID, REPORT_MAX_LEN};
use crate::stats::{SessionStats, SharedSessionStats};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "hid")]
pub mod native;

#[cfg(not(feature = "hid"))]
pub mod unavailable;

#[cfg(feature = "hid")]
pub use native::{hid_available, HidApiTransport};

/// Transport used by the binary.
#[cfg(feature = "hid")]
pub type DefaultTransport = HidApiTransport;

#[cfg(not(feature = "hid"))]
pub use unavailable::{hid_available, UnavailableTransport};

/// Transport used by the binary.
#[cfg(not(feature = "hid"))]
pub type DefaultTransport = UnavailableTransport;

/// Raw access to a HID device.
///
/// Implementations keep the open handle internally; `open` replaces any
/// previous handle.
pub trait HidTransport {
    /// Bind to the first device matching the vendor/product pair.
    ///
    /// Fails with [`DeviceError::Connection`] if no device matches or access
    /// is denied.
    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<(), DeviceError>;

    /// Read up to `max_len` bytes of feature report `report_id`.
    ///
    /// Fails with [`DeviceError::Transport`] if the device is gone or the
    /// request is rejected.
    fn get_feature_report(&mut self, report_id: u8, max_len: usize)
        -> Result<Vec<u8>, DeviceError>;
}

impl<T: HidTransport + ?Sized> HidTransport for Box<T> {
    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<(), DeviceError> {
        (**self).open(vendor_id, product_id)
    }

    fn get_feature_report(
        &mut self,
        report_id: u8,
        max_len: usize,
    ) -> Result<Vec<u8>, DeviceError> {
        (**self).get_feature_report(report_id, max_len)
    }
}

/// Errors from the device link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// No matching device, or it is busy or not accessible
    Connection(String),
    /// Report fetch failed, usually because the device was unplugged
    Transport(String),
    /// Report too short to contain the level field
    Format { len: usize, required: usize },
    /// The stop token fired while reconnecting
    Stopped,
    /// The caller's deadline passed while reconnecting
    TimedOut,
}

impl DeviceError {
    /// Whether the reconnect loop absorbs this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DeviceError::Stopped | DeviceError::TimedOut)
    }
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::Connection(msg) => write!(f, "Device connection error: {msg}"),
            DeviceError::Transport(msg) => write!(f, "Device transport error: {msg}"),
            DeviceError::Format { len, required } => write!(
                f,
                "Malformed report: got {len} bytes, need at least {required}"
            ),
            DeviceError::Stopped => write!(f, "Stopped while waiting for the device"),
            DeviceError::TimedOut => write!(f, "Timed out waiting for the device"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never opened
    Disconnected,
    /// Last read succeeded
    Connected,
    /// Last read failed; re-opening
    Reconnecting,
}

/// Cooperative stop signal for the reconnect loop.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A connection to one meter plus the aggregator it feeds.
pub struct DeviceSession<T, C = MonotonicClock> {
    transport: T,
    config: DeviceConfig,
    aggregator: Aggregator<C>,
    clock: C,
    state: SessionState,
    /// Whether any read has succeeded yet
    ever_connected: bool,
    stop: StopToken,
    stats: SharedSessionStats,
}

impl<T: HidTransport, C: Clock + Clone> DeviceSession<T, C> {
    /// Create a session with a fresh aggregator on `clock`.
    pub fn new(
        transport: T,
        config: DeviceConfig,
        aggregator_config: &AggregatorConfig,
        clock: C,
    ) -> Self {
        let aggregator = Aggregator::from_config(aggregator_config, clock.clone());
        Self::with_aggregator(transport, config, aggregator, clock)
    }
}

impl<T: HidTransport, C: Clock> DeviceSession<T, C> {
    /// Create a session around an existing aggregator.
    ///
    /// `clock` is only used for the reconnect backoff; timestamps come from
    /// the aggregator's own clock.
    pub fn with_aggregator(
        transport: T,
        config: DeviceConfig,
        aggregator: Aggregator<C>,
        clock: C,
    ) -> Self {
        Self {
            transport,
            config,
            aggregator,
            clock,
            state: SessionState::Disconnected,
            ever_connected: false,
            stop: StopToken::new(),
            stats: Arc::new(SessionStats::new()),
        }
    }

    /// Use `stop` to interrupt the reconnect loop.
    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    /// Open (or re-open) the configured device.
    pub fn open(&mut self) -> Result<(), DeviceError> {
        self.transport
            .open(self.config.vendor_id, self.config.product_id)?;
        tracing::info!(
            "Opened device {:04x}:{:04x}",
            self.config.vendor_id,
            self.config.product_id
        );
        // Only a re-open after a lost connection counts as a reconnect.
        if self.state == SessionState::Reconnecting && self.ever_connected {
            self.stats.record_reconnect();
        }
        Ok(())
    }

    /// Fetch the raw level report.
    pub fn fetch_report(&mut self) -> Result<Vec<u8>, DeviceError> {
        self.transport.get_feature_report(REPORT_ID, REPORT_MAX_LEN)
    }

    /// Decode a raw report into decibels.
    pub fn decode(&self, report: &[u8]) -> Result<f64, DeviceError> {
        decode_report(report)
    }

    /// Read one value and feed it to the aggregator.
    ///
    /// With `auto_reconnect` off, any error is returned as-is with no retry.
    /// With it on, errors are absorbed and this only returns once a reading
    /// succeeds, or with [`DeviceError::Stopped`] if the stop token fires.
    pub fn poll(&mut self, auto_reconnect: bool) -> Result<AggregatorState, DeviceError> {
        self.poll_until(auto_reconnect, None)
    }

    /// Like [`poll`](Self::poll), but the reconnect loop gives up with
    /// [`DeviceError::TimedOut`] once the clock reaches `deadline`.
    pub fn poll_until(
        &mut self,
        auto_reconnect: bool,
        deadline: Option<Instant>,
    ) -> Result<AggregatorState, DeviceError> {
        if !auto_reconnect {
            return self.read_once().map_err(|e| {
                self.stats.record_error(&e);
                e
            });
        }

        loop {
            if self.stop.is_stopped() {
                return Err(DeviceError::Stopped);
            }
            if deadline.is_some_and(|deadline| self.clock.now() >= deadline) {
                return Err(DeviceError::TimedOut);
            }

            let error = match self.read_once() {
                Ok(state) => return Ok(state),
                Err(e) => e,
            };
            self.stats.record_error(&error);
            if self.state == SessionState::Connected {
                tracing::warn!("Lost device: {error}");
            } else {
                tracing::debug!("Read failed: {error}");
            }
            self.state = SessionState::Reconnecting;

            if let Err(e) = self.open() {
                self.stats.record_error(&e);
                tracing::debug!(
                    "Re-open failed, retrying in {:?}: {e}",
                    self.config.reconnect_backoff
                );
                self.clock.sleep(self.config.reconnect_backoff);
            }
        }
    }

    /// Poll and return only the instant reading.
    pub fn value(&mut self, auto_reconnect: bool) -> Result<f64, DeviceError> {
        self.poll(auto_reconnect).map(|state| state.instant)
    }

    fn read_once(&mut self) -> Result<AggregatorState, DeviceError> {
        let report = self.fetch_report()?;
        let value = self.decode(&report)?;
        let state = *self.aggregator.add_value(value);
        self.state = SessionState::Connected;
        self.ever_connected = true;
        self.stats.record_reading();
        Ok(state)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn aggregator(&self) -> &Aggregator<C> {
        &self.aggregator
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Counters shared with anyone holding a clone.
    pub fn stats(&self) -> SharedSessionStats {
        Arc::clone(&self.stats)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::decode::REPORT_LEVEL_OFFSET;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Transport that replays scripted results.
    #[derive(Default)]
    struct ScriptedTransport {
        reads: VecDeque<Result<Vec<u8>, DeviceError>>,
        opens: VecDeque<Result<(), DeviceError>>,
        open_calls: usize,
        read_calls: usize,
    }

    impl HidTransport for ScriptedTransport {
        fn open(&mut self, _vendor_id: u16, _product_id: u16) -> Result<(), DeviceError> {
            self.open_calls += 1;
            self.opens.pop_front().unwrap_or(Ok(()))
        }

        fn get_feature_report(
            &mut self,
            report_id: u8,
            max_len: usize,
        ) -> Result<Vec<u8>, DeviceError> {
            assert_eq!(report_id, REPORT_ID);
            assert_eq!(max_len, REPORT_MAX_LEN);
            self.read_calls += 1;
            self.reads
                .pop_front()
                .unwrap_or_else(|| Err(DeviceError::Transport("script exhausted".into())))
        }
    }

    fn report(tenths: u16) -> Vec<u8> {
        let mut report = vec![0; REPORT_MAX_LEN];
        report[REPORT_LEVEL_OFFSET..REPORT_LEVEL_OFFSET + 2].copy_from_slice(&tenths.to_be_bytes());
        report
    }

    fn session(transport: ScriptedTransport) -> (DeviceSession<ScriptedTransport, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let session = DeviceSession::new(
            transport,
            DeviceConfig::default(),
            &AggregatorConfig::default(),
            clock.clone(),
        );
        (session, clock)
    }

    #[test]
    fn test_single_shot_success() {
        let mut transport = ScriptedTransport::default();
        transport.reads.push_back(Ok(report(534)));
        let (mut session, _) = session(transport);

        let state = session.poll(false).unwrap();
        assert_eq!(state.instant, 53.4);
        assert_eq!(state.sample_count, 1);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_single_shot_propagates_error_without_retry() {
        let mut transport = ScriptedTransport::default();
        transport
            .reads
            .push_back(Err(DeviceError::Transport("unplugged".into())));
        let (mut session, _) = session(transport);

        let err = session.poll(false).unwrap_err();
        assert_eq!(err, DeviceError::Transport("unplugged".into()));
        assert_eq!(session.transport().read_calls, 1);
        assert_eq!(session.transport().open_calls, 0);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_single_shot_format_error() {
        let mut transport = ScriptedTransport::default();
        transport.reads.push_back(Ok(vec![0x05, 0x00]));
        let (mut session, _) = session(transport);

        assert_eq!(
            session.poll(false),
            Err(DeviceError::Format {
                len: 2,
                required: 9
            })
        );
        assert!(session.aggregator().is_empty());
    }

    #[test]
    fn test_reconnect_after_transport_error() {
        let mut transport = ScriptedTransport::default();
        transport
            .reads
            .push_back(Err(DeviceError::Transport("unplugged".into())));
        transport.reads.push_back(Ok(report(600)));
        let (mut session, clock) = session(transport);
        let start = clock.now();

        let state = session.poll(true).unwrap();
        assert_eq!(state.instant, 60.0);
        assert_eq!(session.transport().open_calls, 1);
        // Re-open succeeded, so no backoff was taken.
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_backoff_when_reopen_fails() {
        let mut transport = ScriptedTransport::default();
        for _ in 0..3 {
            transport
                .reads
                .push_back(Err(DeviceError::Transport("unplugged".into())));
            transport
                .opens
                .push_back(Err(DeviceError::Connection("no device".into())));
        }
        transport.reads.push_back(Ok(report(450)));
        let (mut session, clock) = session(transport);
        let start = clock.now();

        let state = session.poll(true).unwrap();
        assert_eq!(state.instant, 45.0);
        assert_eq!(clock.now() - start, Duration::from_secs(3));

        let stats = session.stats().snapshot();
        assert_eq!(stats.transport_errors, 3);
        assert_eq!(stats.connection_failures, 3);
        assert_eq!(stats.readings, 1);
    }

    #[test]
    fn test_format_error_triggers_reconnect() {
        let mut transport = ScriptedTransport::default();
        transport.reads.push_back(Ok(vec![0; 4]));
        transport.reads.push_back(Ok(report(700)));
        let (mut session, _) = session(transport);

        assert_eq!(session.value(true).unwrap(), 70.0);
        assert_eq!(session.transport().open_calls, 1);
        assert_eq!(session.stats().snapshot().format_errors, 1);
    }

    #[test]
    fn test_stop_token_interrupts_reconnect() {
        let stop = StopToken::new();
        stop.stop();
        let (session, _) = session(ScriptedTransport::default());
        let mut session = session.with_stop_token(stop);

        assert_eq!(session.poll(true), Err(DeviceError::Stopped));
        assert_eq!(session.transport().read_calls, 0);
    }

    #[test]
    fn test_deadline_ends_reconnect_loop() {
        let mut transport = ScriptedTransport::default();
        for _ in 0..100 {
            transport
                .opens
                .push_back(Err(DeviceError::Connection("no device".into())));
        }
        let (mut session, clock) = session(transport);
        let deadline = clock.now() + Duration::from_secs(3);

        assert_eq!(
            session.poll_until(true, Some(deadline)),
            Err(DeviceError::TimedOut)
        );
        assert_eq!(clock.now(), deadline);
        assert_eq!(session.transport().open_calls, 3);
        assert_eq!(session.state(), SessionState::Reconnecting);
    }

    #[test]
    fn test_deadline_checked_before_read() {
        let mut transport = ScriptedTransport::default();
        transport.reads.push_back(Ok(report(520)));
        let (mut session, clock) = session(transport);

        let state = session.poll_until(true, Some(clock.now())).unwrap_err();
        assert_eq!(state, DeviceError::TimedOut);

        let deadline = clock.now() + Duration::from_secs(1);
        assert_eq!(session.poll_until(true, Some(deadline)).unwrap().instant, 52.0);
    }

    #[test]
    fn test_first_open_is_not_a_reconnect() {
        let mut transport = ScriptedTransport::default();
        transport.reads.push_back(Ok(report(500)));
        let (mut session, _) = session(transport);

        session.open().unwrap();
        session.poll(false).unwrap();
        assert_eq!(session.stats().snapshot().reconnects, 0);
    }

    #[test]
    fn test_lazy_first_open_is_not_a_reconnect() {
        let mut transport = ScriptedTransport::default();
        transport
            .reads
            .push_back(Err(DeviceError::Transport("device not open".into())));
        transport.reads.push_back(Ok(report(500)));
        transport
            .reads
            .push_back(Err(DeviceError::Transport("unplugged".into())));
        transport.reads.push_back(Ok(report(510)));
        let (mut session, _) = session(transport);

        session.poll(true).unwrap();
        assert_eq!(session.stats().snapshot().reconnects, 0);

        session.poll(true).unwrap();
        assert_eq!(session.stats().snapshot().reconnects, 1);
        assert_eq!(session.transport().open_calls, 2);
    }

    #[test]
    fn test_error_display() {
        let err = DeviceError::Format {
            len: 3,
            required: 9,
        };
        assert_eq!(
            err.to_string(),
            "Malformed report: got 3 bytes, need at least 9"
        );
        assert!(err.is_recoverable());
        assert!(!DeviceError::Stopped.is_recoverable());
        assert!(!DeviceError::TimedOut.is_recoverable());
    }
}
