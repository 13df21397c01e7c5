//! Timing tunables and sizing constants.
//!
//! Everything is fixed at build time. [`Config::DEFAULT`] carries the values
//! the bridge ships with; tests and alternate builds override individual
//! fields with the `with_*` setters.

use embassy_time::Duration;

/// Event queue slots.
pub const QUEUE_SLOTS: usize = 64;

/// Diagnostic log ring capacity in bytes.
pub const LOG_BUFFER_SIZE: usize = 8192;

/// Depth of the cross-context FIFO between the ingress and emission contexts.
pub const FIFO_DEPTH: usize = 8;

/// Longest diagnostic line, including the level prefix and CRLF.
pub const LOG_LINE_MAX: usize = 256;

/// Runtime timing configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Partial packets older than this are discarded.
    pub inter_byte_timeout: Duration,
    /// How long a press report is held before the automatic release.
    pub press_hold: Duration,
    /// Minimum gap after a release before the next press on that interface.
    pub release_gap: Duration,
    /// Hardware watchdog timeout.
    pub watchdog_timeout: Duration,
    /// A context silent for longer than this is considered stalled.
    pub liveness_window: Duration,
    /// How long a context may go without its first heartbeat after boot.
    pub boot_grace: Duration,
    /// Give up on a cross-context push after this long and drop the event.
    pub fifo_push_timeout: Duration,
    /// Log the first drop and then every this many drops.
    pub drop_log_interval: u32,
}

impl Config {
    pub const DEFAULT: Self = Self {
        inter_byte_timeout: Duration::from_millis(200),
        press_hold: Duration::from_millis(2),
        release_gap: Duration::from_millis(2),
        watchdog_timeout: Duration::from_secs(8),
        liveness_window: Duration::from_secs(5),
        boot_grace: Duration::from_secs(5),
        fifo_push_timeout: Duration::from_millis(100),
        drop_log_interval: 64,
    };

    #[must_use]
    pub const fn with_inter_byte_timeout(mut self, timeout: Duration) -> Self {
        self.inter_byte_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_press_hold(mut self, hold: Duration) -> Self {
        self.press_hold = hold;
        self
    }

    #[must_use]
    pub const fn with_release_gap(mut self, gap: Duration) -> Self {
        self.release_gap = gap;
        self
    }

    #[must_use]
    pub const fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    #[must_use]
    pub const fn with_boot_grace(mut self, grace: Duration) -> Self {
        self.boot_grace = grace;
        self
    }

    #[must_use]
    pub const fn with_fifo_push_timeout(mut self, timeout: Duration) -> Self {
        self.fifo_push_timeout = timeout;
        self
    }

    /// Clamped to at least 1.
    #[must_use]
    pub const fn with_drop_log_interval(mut self, interval: u32) -> Self {
        self.drop_log_interval = if interval == 0 { 1 } else { interval };
        self
    }

    /// Whether the `count`th drop (1-based) should be narrated.
    #[inline]
    #[must_use]
    pub const fn should_log_drop(&self, count: u32) -> bool {
        count % self.drop_log_interval == 1 % self.drop_log_interval
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}
