//! Ingress: serial bytes in, queued events out.
//!
//! Owns the decoder and the producing half of the event queue. Everything
//! that can go wrong here (malformed packets, stale fragments, a full queue)
//! is recovered in place and only narrated on the diagnostic channel.

use core::fmt;

use embassy_time::Instant;
use keybridge_proto::{encode, Decoder, DecoderStats, Event, WireFormat};

use crate::config::Config;
use crate::diag::{Diagnostics, Level};
use crate::queue::EventProducer;

/// Space-separated uppercase hex.
struct Hex<'a>(&'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Decoder plus queue producer for one serial link.
pub struct Ingress<'a, const N: usize> {
    decoder: Decoder,
    producer: EventProducer<'a, N>,
    config: Config,
    link_up: bool,
    log: &'a dyn Diagnostics,
}

impl<'a, const N: usize> Ingress<'a, N> {
    pub fn new(
        format: WireFormat,
        producer: EventProducer<'a, N>,
        config: &Config,
        log: &'a dyn Diagnostics,
    ) -> Self {
        Self {
            decoder: Decoder::new(format, config.inter_byte_timeout),
            producer,
            config: *config,
            link_up: false,
            log,
        }
    }

    /// Decode `bytes` received at `now` and queue the resulting events.
    ///
    /// Returns the number of events queued; events that find the queue full
    /// are dropped and counted.
    pub fn receive(&mut self, bytes: &[u8], now: Instant) -> usize {
        let mut queued = 0;
        for &byte in bytes {
            let before = self.decoder.stats();
            let event = self.decoder.feed(byte, now);
            self.narrate_discards(before);

            if let Some(event) = event {
                self.narrate_rx(&event);
                if self.enqueue(event) {
                    queued += 1;
                }
            }
        }
        queued
    }

    /// Discard a stale partial packet even if no further byte arrives.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        if self.decoder.poll_timeout(now) {
            crate::diag_debug!(self.log, "partial packet timed out");
            return true;
        }
        false
    }

    /// Track the serial peer; a disconnect throws away any partial packet.
    pub fn set_link_state(&mut self, up: bool) {
        if self.link_up && !up && !self.decoder.is_idle() {
            crate::diag_debug!(
                self.log,
                "link down, discarding {} partial bytes",
                self.decoder.pending_bytes()
            );
        }
        if !up {
            self.decoder.reset();
        }
        self.link_up = up;
    }

    #[must_use]
    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// Bytes that may be read from the link without overrunning the queue.
    #[must_use]
    pub fn read_budget(&self) -> usize {
        let free = self.producer.free_space();
        if free == 0 {
            return 0;
        }
        (free * self.decoder.format().packet_len()).saturating_sub(self.decoder.pending_bytes())
    }

    /// Events dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.producer.dropped()
    }

    #[must_use]
    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    fn enqueue(&mut self, event: Event) -> bool {
        if self.producer.push(event) {
            return true;
        }
        let dropped = self.producer.dropped();
        if self.config.should_log_drop(dropped) {
            crate::diag_warn!(self.log, "event queue full, dropped {} events", dropped);
            warn!("ingress: queue full, {} dropped", dropped);
        }
        false
    }

    fn narrate_rx(&self, event: &Event) {
        if !self.log.enabled(Level::Debug) {
            return;
        }
        let mut packet = [0u8; 8];
        if let Ok(len) = encode(event, self.decoder.format(), &mut packet) {
            crate::diag_debug!(self.log, "rx {}", Hex(&packet[..len]));
        }
    }

    fn narrate_discards(&self, before: DecoderStats) {
        let after = self.decoder.stats();
        if after.timeouts != before.timeouts {
            crate::diag_debug!(self.log, "partial packet timed out");
        }
        if after.malformed != before.malformed {
            crate::diag_debug!(self.log, "malformed packet discarded");
        }
    }
}
