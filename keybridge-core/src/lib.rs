//! Platform-agnostic core of the key bridge.
//!
//! Everything between "a byte arrived on the serial link" and "a HID report
//! left on USB", with no hardware dependencies. It builds for `no_std`
//! targets and runs on the host for testing.
//!
//! # Overview
//!
//! - [`config`]: timing tunables ([`Config`]) and sizing constants
//! - [`queue`]: bounded drop-newest event queue ([`EventQueue`], [`EventSource`])
//! - [`ingress`]: decoder plus queue producer ([`Ingress`])
//! - [`emitter`]: staged press/release report emission ([`Emitter`])
//! - [`output`]: report sink trait ([`ReportSink`])
//! - [`channel`]: word FIFO between execution contexts ([`CrossContextSender`], [`FifoEventSource`])
//! - [`supervisor`]: liveness-gated watchdog ([`Supervisor`], [`Heartbeat`])
//! - [`diag`]: diagnostic text lines for the serial link ([`LogChannel`])
//! - [`bridge`]: single-context pipeline ([`KeyBridge`])
//!
//! # Topologies
//!
//! Single context:
//!
//! ```text
//! UART ─▶ Ingress ─▶ EventQueue ─▶ Emitter ─▶ ReportSink (USB HID)
//! ```
//!
//! Two contexts:
//!
//! ```text
//! ctx 0: UART ─▶ Ingress ─▶ EventQueue ─▶ CrossContextSender ─┐
//!                                                              │ FIFO (u32 words)
//! ctx 1:                 ReportSink ◀─ Emitter ◀─ FifoEventSource ◀─┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//! use embassy_time::Instant;
//! use keybridge_core::{Config, EventQueue, KeyBridge, LogChannel, OutputError, ReportSink};
//! use keybridge_proto::{HidInterface, Report, WireFormat};
//!
//! struct Count(usize);
//!
//! impl ReportSink for Count {
//!     fn is_ready(&self, _: HidInterface) -> bool {
//!         true
//!     }
//!     fn try_send(&mut self, _: &Report) -> Result<(), OutputError> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! let log: LogChannel<NoopRawMutex, 1024> = LogChannel::new();
//! let mut queue: EventQueue<16> = EventQueue::new();
//! let mut bridge = KeyBridge::new(&mut queue, WireFormat::Compact, Count(0), &Config::DEFAULT, &log);
//!
//! bridge.ingest(&[0x04, 0x00], Instant::from_millis(0));
//! bridge.service(Instant::from_millis(0));
//! bridge.service(Instant::from_millis(2));
//! assert_eq!(bridge.output().0, 2); // press and release
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting and internal defmt logging
//! - **`log`**: Route internal logging to the `log` crate

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod bridge;
pub mod channel;
pub mod config;
pub mod diag;
pub mod emitter;
pub mod ingress;
pub mod output;
pub mod queue;
pub mod supervisor;

// Re-export main types at crate root
pub use bridge::KeyBridge;
pub use channel::{ChannelStats, CrossContextSender, FifoEventSource, FifoRx, FifoTx};
pub use config::{Config, FIFO_DEPTH, LOG_BUFFER_SIZE, LOG_LINE_MAX, QUEUE_SLOTS};
pub use diag::{Diagnostics, Level, LogChannel, LogLink};
pub use emitter::{Emitter, EmitterStats, Stage};
pub use ingress::Ingress;
pub use output::{OutputError, ReportSink};
pub use queue::{split, EventConsumer, EventProducer, EventQueue, EventSource};
pub use supervisor::{Heartbeat, Supervisor, SupervisorState, WatchdogTimer};
