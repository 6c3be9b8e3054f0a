//! Fallback transport for builds without the `hid` feature.
//!
//! This exists so the crate (and binary) can compile on hosts without the
//! native HID stack. Every `open` fails, so a session never gets a reading.

use super::{DeviceError, HidTransport};

/// A transport with no device behind it.
#[derive(Debug, Default)]
pub struct UnavailableTransport;

impl UnavailableTransport {
    pub fn new() -> Self {
        Self
    }
}

impl HidTransport for UnavailableTransport {
    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<(), DeviceError> {
        Err(DeviceError::Connection(format!(
            "cannot open {vendor_id:04x}:{product_id:04x}: built without the `hid` feature"
        )))
    }

    fn get_feature_report(
        &mut self,
        _report_id: u8,
        _max_len: usize,
    ) -> Result<Vec<u8>, DeviceError> {
        Err(DeviceError::Transport("device not open".to_string()))
    }
}

/// Native HID support is not compiled in.
pub fn hid_available() -> bool {
    false
}
