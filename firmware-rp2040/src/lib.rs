//! Serial-to-USB HID keyboard bridge for RP2040.
//!
//! The firmware runs on a Raspberry Pi Pico (RP2040) and:
//! 1. Receives key packets over UART (115200 baud, 8N1)
//! 2. Decodes them and queues the resulting key events
//! 3. Emits each event as a paced press/release pair of USB HID reports
//!
//! # Hardware Configuration
//!
//! | Function | GPIO | Description |
//! |----------|------|-------------|
//! | UART1 TX | 8    | Diagnostic log output |
//! | UART1 RX | 9    | Key packet input |
//! | USB      | -    | HID keyboard + consumer/vendor interface |
//!
//! # Architecture
//!
//! Single core (default): one executor runs the USB stack, both HID
//! writers, the bridge loop (UART → decoder → queue → emitter), the log
//! flusher and the watchdog supervisor.
//!
//! Dual core (`dual-core`): core 0 runs ingress, the log flusher and the
//! supervisor and hands events to core 1 as packed words through a FIFO;
//! core 1 runs USB and report emission only.
//!
//! # Features
//!
//! - **`dev-panic`** (default): Use `panic-probe` for development (prints panic info via RTT)
//! - **`prod-panic`**: Use `panic-reset` for production (silent reset)
//! - **`proto-extended`** (default): 5-byte packets
//! - **`proto-compact`**: 2-byte packets
//! - **`dual-core`**: split ingress and emission across both cores
//! - **`quiet`**: keep DEBUG lines off the serial log

#![no_std]

// Ensure exactly one wire protocol is selected
#[cfg(all(feature = "proto-extended", feature = "proto-compact"))]
compile_error!("Cannot enable both `proto-extended` and `proto-compact` features - the two wire formats are incompatible");

#[cfg(not(any(feature = "proto-extended", feature = "proto-compact")))]
compile_error!("Select a wire protocol with the `proto-extended` or `proto-compact` feature");

#[cfg(all(feature = "dev-panic", feature = "prod-panic"))]
compile_error!("Cannot enable both `dev-panic` and `prod-panic` features");

pub mod config;
pub mod fifo;
pub mod uart_link;
pub mod usb_output;
pub mod watchdog;

// Re-export core types for convenience
pub use keybridge_core::{
    Config, Diagnostics, Heartbeat, KeyBridge, Level, LogChannel, Supervisor, SupervisorState,
};
pub use keybridge_proto::{Event, WireFormat};

pub use config::WIRE_FORMAT;
pub use fifo::{CoreFifoRx, CoreFifoTx};
pub use uart_link::{link_ready, mark_link_down, mark_link_ready, UartLogLink};
pub use usb_output::{configure_usb_hid, hid_writer, UsbHid, UsbReportSink, UsbStateHandler};
pub use watchdog::HardwareWatchdog;
