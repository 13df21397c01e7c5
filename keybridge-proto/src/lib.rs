//! Serial key event protocol for the key bridge.
//!
//! This crate provides everything needed to work with the bytes that arrive
//! on the bridge's serial link and the reports that leave on its USB HID port:
//!
//! - **Types**: the [`Event`] data model
//!   - [`EventKind`] - keyboard, consumer control or vendor control
//!   - [`Phase`] - press or release
//!   - [`Modifiers`] - the eight keyboard modifier bits
//!   - [`KeyFlags`] - auxiliary keyboard flags (function modifier)
//!
//! - **Decoding**: [`Decoder`] turns a raw byte stream into events, one byte
//!   at a time, with an inter-byte timeout.
//!
//! - **Encoding**: [`encode()`] produces well-formed packets for host tools and
//!   tests.
//!
//! - **Reports**: [`KeyboardReport`], [`AuxReport`] and [`Report`] compute the
//!   HID wire layout for an event.
//!
//! # Wire Format
//!
//! Two protocol generations exist; a build picks exactly one of them.
//!
//! ## Compact (2 bytes)
//!
//! ```text
//! [keycode][modifier]
//! ```
//!
//! Always a key press; the bridge releases the key itself after a short hold.
//!
//! ## Extended (5 bytes)
//!
//! ```text
//! [type][code_lo][code_hi][modifier][flags]
//! ```
//!
//! - `type` low nibble: 0 = keyboard, 1 = consumer control, 2 = vendor control
//! - `type` bit 7: set for a release
//! - keyboard events use only `code_lo`; consumer/vendor use the full
//!   little-endian 16-bit usage
//! - `flags` bit 0: auxiliary function modifier (keyboard only)
//!
//! The link runs at 115200 baud, 8N1, no flow control.
//!
//! # Example
//!
//! ```
//! use embassy_time::{Duration, Instant};
//! use keybridge_proto::{Decoder, Event, Modifiers, WireFormat};
//!
//! let mut decoder = Decoder::new(WireFormat::Compact, Duration::from_millis(200));
//! let now = Instant::from_millis(0);
//!
//! assert_eq!(decoder.feed(0x04, now), None);
//! let event = decoder.feed(0x02, now).unwrap();
//! assert_eq!(event, Event::key_press(0x04, Modifiers::LEFT_SHIFT));
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod decoder;
pub mod encode;
pub mod report;
pub mod types;

pub use decoder::{Decoder, DecoderStats, WireFormat};
pub use encode::{encode, encode_compact, encode_extended, EncodeError};
pub use report::{
    AuxReport, HidInterface, KeyboardReport, Report, REPORT_ID_CONSUMER, REPORT_ID_VENDOR,
};
pub use types::{Event, EventKind, KeyFlags, Modifiers, Phase};

/// Serial link baud rate shared by both wire variants.
pub const BAUDRATE: u32 = 115_200;
