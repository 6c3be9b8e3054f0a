//! Feature report layout of the WL100-style meter.
//!
//! The meter answers feature report 5 with up to 61 bytes. Bytes 7..9 hold
//! the level as a big-endian u16 in tenths of a decibel (`0x02 0x16` = 534 =
//! 53.4 dBA). Every other byte is ignored.

use crate::device::DeviceError;

/// Feature report carrying the sound level.
pub const REPORT_ID: u8 = 0x05;

/// Size of the feature report buffer.
pub const REPORT_MAX_LEN: usize = 61;

/// Byte offset of the level field.
pub const REPORT_LEVEL_OFFSET: usize = 0x07;

/// Width of the level field in bytes.
pub const REPORT_LEVEL_LEN: usize = 2;

/// Decode a raw feature report into decibels.
pub fn decode_report(report: &[u8]) -> Result<f64, DeviceError> {
    let required = REPORT_LEVEL_OFFSET + REPORT_LEVEL_LEN;
    let level = report
        .get(REPORT_LEVEL_OFFSET..required)
        .ok_or(DeviceError::Format {
            len: report.len(),
            required,
        })?;

    let raw = u16::from_be_bytes([level[0], level[1]]);
    Ok(f64::from(raw) / 10.0)
}
