//! Board-level constants.
//!
//! Timing lives in [`keybridge_core::Config`]; this module only holds what is
//! specific to this board and its USB identity.

use keybridge_proto::WireFormat;

/// Wire protocol spoken on the serial link.
#[cfg(feature = "proto-extended")]
pub const WIRE_FORMAT: WireFormat = WireFormat::Extended;

/// Wire protocol spoken on the serial link.
#[cfg(feature = "proto-compact")]
pub const WIRE_FORMAT: WireFormat = WireFormat::Compact;

/// pid.codes test VID/PID.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0001;

pub const USB_MANUFACTURER: &str = "Rust KeyBridge";
pub const USB_PRODUCT: &str = "Serial-to-HID Keyboard Bridge";
pub const USB_SERIAL_NUMBER: &str = "001";

/// HID endpoint polling interval.
pub const USB_HID_POLL_MS: u8 = 1;

/// How often the diagnostic log is drained into the UART.
pub const LOG_FLUSH_MS: u64 = 10;

/// Supervisor check period; well under the liveness window.
pub const SUPERVISOR_PERIOD_MS: u64 = 250;

/// Idle wait when there is nothing to read, so emission keeps getting polled.
pub const SERVICE_TICK_MS: u64 = 1;

/// How long core 0 waits for core 1 to bring up USB before carrying on.
pub const CORE1_BOOT_WAIT_MS: u64 = 200;
