//! Shared fakes for the integration tests.

#![allow(dead_code)]

use spl_meter_agent::core::decode::{REPORT_LEVEL_OFFSET, REPORT_MAX_LEN};
use spl_meter_agent::{DeviceError, HidTransport};
use std::collections::VecDeque;

/// A transport that replays scripted results.
///
/// Once a script runs out, every call returns the matching fallback.
pub struct FakeTransport {
    pub reads: VecDeque<Result<Vec<u8>, DeviceError>>,
    pub opens: VecDeque<Result<(), DeviceError>>,
    pub fallback_read: Result<Vec<u8>, DeviceError>,
    pub fallback_open: Result<(), DeviceError>,
    pub open_calls: usize,
    pub read_calls: usize,
}

impl FakeTransport {
    /// Every read returns `tenths` / 10 dB.
    pub fn steady(tenths: u16) -> Self {
        Self {
            reads: VecDeque::new(),
            opens: VecDeque::new(),
            fallback_read: Ok(level_report(tenths)),
            fallback_open: Ok(()),
            open_calls: 0,
            read_calls: 0,
        }
    }

    /// Every read fails with `error`.
    pub fn failing(error: DeviceError) -> Self {
        Self {
            fallback_read: Err(error),
            ..Self::steady(0)
        }
    }

    /// Every read and every open fails.
    pub fn unreachable(read_error: DeviceError, open_error: DeviceError) -> Self {
        Self {
            fallback_open: Err(open_error),
            ..Self::failing(read_error)
        }
    }

    pub fn then_read(mut self, result: Result<Vec<u8>, DeviceError>) -> Self {
        self.reads.push_back(result);
        self
    }

    pub fn then_open(mut self, result: Result<(), DeviceError>) -> Self {
        self.opens.push_back(result);
        self
    }
}

impl HidTransport for FakeTransport {
    fn open(&mut self, _vendor_id: u16, _product_id: u16) -> Result<(), DeviceError> {
        self.open_calls += 1;
        self.opens
            .pop_front()
            .unwrap_or_else(|| self.fallback_open.clone())
    }

    fn get_feature_report(
        &mut self,
        _report_id: u8,
        _max_len: usize,
    ) -> Result<Vec<u8>, DeviceError> {
        self.read_calls += 1;
        self.reads
            .pop_front()
            .unwrap_or_else(|| self.fallback_read.clone())
    }
}

/// A full-size report carrying `tenths` at the level offset.
pub fn level_report(tenths: u16) -> Vec<u8> {
    let mut report = vec![0u8; REPORT_MAX_LEN];
    report[0] = 0x05;
    report[REPORT_LEVEL_OFFSET..REPORT_LEVEL_OFFSET + 2].copy_from_slice(&tenths.to_be_bytes());
    report
}
