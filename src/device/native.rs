//! HID transport backed by the `hidapi` crate.

use super::{DeviceError, HidTransport};
use ::hidapi::{HidApi, HidDevice};

/// Talks to the meter through the platform HID stack.
///
/// The `HidApi` context is created on the first `open` and reused for every
/// re-open after that.
#[derive(Default)]
pub struct HidApiTransport {
    api: Option<HidApi>,
    device: Option<HidDevice>,
}

impl HidApiTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HidTransport for HidApiTransport {
    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<(), DeviceError> {
        // Drop any stale handle before binding again.
        self.device = None;

        if self.api.is_none() {
            let api = HidApi::new().map_err(|e| DeviceError::Connection(e.to_string()))?;
            self.api = Some(api);
        }
        let api = self
            .api
            .as_ref()
            .ok_or_else(|| DeviceError::Connection("HID context unavailable".to_string()))?;

        let device = api
            .open(vendor_id, product_id)
            .map_err(|e| DeviceError::Connection(e.to_string()))?;
        self.device = Some(device);
        Ok(())
    }

    fn get_feature_report(
        &mut self,
        report_id: u8,
        max_len: usize,
    ) -> Result<Vec<u8>, DeviceError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| DeviceError::Transport("device not open".to_string()))?;

        // The first byte selects the report; the reply keeps it in place.
        let mut buf = vec![0u8; max_len.max(1)];
        buf[0] = report_id;

        match device.get_feature_report(&mut buf) {
            Ok(len) => {
                buf.truncate(len);
                Ok(buf)
            }
            Err(e) => {
                self.device = None;
                Err(DeviceError::Transport(e.to_string()))
            }
        }
    }
}

/// Native HID support is compiled in.
pub fn hid_available() -> bool {
    true
}
