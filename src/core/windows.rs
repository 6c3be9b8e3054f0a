//! The fixed set of averaging windows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One of the eight averaging windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    Sec1,
    Sec5,
    Sec15,
    Sec30,
    Min1,
    Min5,
    Min15,
    Min30,
}

impl Window {
    /// All windows, shortest first.
    pub const ALL: [Window; 8] = [
        Window::Sec1,
        Window::Sec5,
        Window::Sec15,
        Window::Sec30,
        Window::Min1,
        Window::Min5,
        Window::Min15,
        Window::Min30,
    ];

    /// Window length in whole seconds.
    pub const fn seconds(self) -> u64 {
        match self {
            Window::Sec1 => 1,
            Window::Sec5 => 5,
            Window::Sec15 => 15,
            Window::Sec30 => 30,
            Window::Min1 => 60,
            Window::Min5 => 300,
            Window::Min15 => 900,
            Window::Min30 => 1800,
        }
    }

    pub const fn duration(self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    /// Display label, e.g. `5sec` or `15min`.
    pub const fn label(self) -> &'static str {
        match self {
            Window::Sec1 => "1sec",
            Window::Sec5 => "5sec",
            Window::Sec15 => "15sec",
            Window::Sec30 => "30sec",
            Window::Min1 => "1min",
            Window::Min5 => "5min",
            Window::Min15 => "15min",
            Window::Min30 => "30min",
        }
    }

    /// Look a window up by its label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.label() == label)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rounded mean per window.
///
/// `None` means the window is not warmed up yet: the retained history does
/// not span the full window length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowAverages {
    #[serde(rename = "1sec")]
    pub sec_1: Option<f64>,
    #[serde(rename = "5sec")]
    pub sec_5: Option<f64>,
    #[serde(rename = "15sec")]
    pub sec_15: Option<f64>,
    #[serde(rename = "30sec")]
    pub sec_30: Option<f64>,
    #[serde(rename = "1min")]
    pub min_1: Option<f64>,
    #[serde(rename = "5min")]
    pub min_5: Option<f64>,
    #[serde(rename = "15min")]
    pub min_15: Option<f64>,
    #[serde(rename = "30min")]
    pub min_30: Option<f64>,
}

impl WindowAverages {
    pub fn get(&self, window: Window) -> Option<f64> {
        match window {
            Window::Sec1 => self.sec_1,
            Window::Sec5 => self.sec_5,
            Window::Sec15 => self.sec_15,
            Window::Sec30 => self.sec_30,
            Window::Min1 => self.min_1,
            Window::Min5 => self.min_5,
            Window::Min15 => self.min_15,
            Window::Min30 => self.min_30,
        }
    }

    pub fn set(&mut self, window: Window, value: Option<f64>) {
        let slot = match window {
            Window::Sec1 => &mut self.sec_1,
            Window::Sec5 => &mut self.sec_5,
            Window::Sec15 => &mut self.sec_15,
            Window::Sec30 => &mut self.sec_30,
            Window::Min1 => &mut self.min_1,
            Window::Min5 => &mut self.min_5,
            Window::Min15 => &mut self.min_15,
            Window::Min30 => &mut self.min_30,
        };
        *slot = value;
    }

    /// Iterate `(window, value)` pairs, shortest window first.
    pub fn iter(&self) -> impl Iterator<Item = (Window, Option<f64>)> + '_ {
        Window::ALL.into_iter().map(move |w| (w, self.get(w)))
    }

    /// Whether every window is still warming up.
    pub fn all_absent(&self) -> bool {
        self.iter().all(|(_, v)| v.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_set() {
        let secs: Vec<u64> = Window::ALL.iter().map(|w| w.seconds()).collect();
        assert_eq!(secs, vec![1, 5, 15, 30, 60, 300, 900, 1800]);
        assert_eq!(Window::Min5.duration(), Duration::from_secs(300));
    }

    #[test]
    fn test_labels_round_trip() {
        for window in Window::ALL {
            assert_eq!(Window::from_label(window.label()), Some(window));
        }
        assert_eq!(Window::from_label("2min"), None);
    }

    #[test]
    fn test_set_and_get() {
        let mut averages = WindowAverages::default();
        assert!(averages.all_absent());

        averages.set(Window::Min15, Some(61.25));
        assert_eq!(averages.get(Window::Min15), Some(61.25));
        assert_eq!(averages.min_15, Some(61.25));
        assert!(!averages.all_absent());
    }

    #[test]
    fn test_serialized_labels() {
        let mut averages = WindowAverages::default();
        averages.set(Window::Sec1, Some(53.4));

        let json = serde_json::to_value(averages).unwrap();
        assert_eq!(json["1sec"], 53.4);
        assert!(json["30min"].is_null());
    }
}
