//! Report sink trait and error types.

use keybridge_proto::{HidInterface, Report};

/// Error type for report output.
///
/// None of these are fatal; the emitter keeps its pending action and retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputError {
    /// USB/communication I/O error.
    Io,
    /// Device not ready (e.g., USB not enumerated).
    NotReady,
    /// Endpoint busy with a previous report.
    Busy,
}

/// Non-blocking destination for HID reports.
///
/// Implementations must never block: a report that cannot be accepted right
/// now is refused with an error and offered again on a later poll.
///
/// # `no_std` Compatibility
///
/// All implementations must be `#![no_std]` compatible with no heap allocation.
pub trait ReportSink {
    /// Check if `interface` can take a report right now.
    fn is_ready(&self, interface: HidInterface) -> bool;

    /// Hand one report to its interface.
    fn try_send(&mut self, report: &Report) -> Result<(), OutputError>;
}

impl<T: ReportSink + ?Sized> ReportSink for &mut T {
    fn is_ready(&self, interface: HidInterface) -> bool {
        (**self).is_ready(interface)
    }

    fn try_send(&mut self, report: &Report) -> Result<(), OutputError> {
        (**self).try_send(report)
    }
}
