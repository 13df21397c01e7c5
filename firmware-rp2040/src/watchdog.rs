//! Hardware watchdog adapter.

use embassy_rp::watchdog::{ResetReason, Watchdog};
use embassy_time::Duration;
use keybridge_core::WatchdogTimer;

/// RP2040 watchdog behind the [`WatchdogTimer`] trait.
pub struct HardwareWatchdog(Watchdog);

impl HardwareWatchdog {
    pub fn new(watchdog: Watchdog) -> Self {
        Self(watchdog)
    }

    /// True if the last reset was forced by the watchdog timing out.
    pub fn caused_last_reset(&self) -> bool {
        matches!(self.0.reset_reason(), Some(ResetReason::TimedOut))
    }
}

impl WatchdogTimer for HardwareWatchdog {
    fn start(&mut self, timeout: Duration) {
        // Keep the timer frozen while a debugger halts the core
        self.0.pause_on_debug(true);
        self.0.start(timeout);
    }

    fn pet(&mut self) {
        self.0.feed();
    }
}
