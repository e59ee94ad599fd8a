use crate::settings::QuietHours;
use std::sync::atomic::{AtomicBool, Ordering};

/// True when `hour` falls in `[start, end)`, wrapping past midnight when
/// `start > end`.
pub fn in_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

pub fn in_quiet_hours(quiet_hours: &QuietHours, hour: u32) -> bool {
    quiet_hours.enabled && in_window(hour, quiet_hours.start_hour, quiet_hours.end_hour)
}

pub fn notice_message(quiet_hours: &QuietHours) -> String {
    format!(
        "Calm mode is auto-on {}:00-{}:00. Tap to override.",
        quiet_hours.start_hour, quiet_hours.end_hour
    )
}

/// One-shot latch for the quiet-hours notice. Fires at most once per page.
#[derive(Debug, Default)]
pub struct QuietHoursGate {
    shown: AtomicBool,
}

impl QuietHoursGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true exactly once.
    pub fn try_fire(&self) -> bool {
        !self.shown.swap(true, Ordering::SeqCst)
    }

    pub fn has_fired(&self) -> bool {
        self.shown.load(Ordering::SeqCst)
    }
}
