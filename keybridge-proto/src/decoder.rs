//! Incremental packet decoder.
//!
//! Bytes arrive one at a time from the serial link. The decoder buffers them
//! until a full packet of the configured wire format is present, then
//! synthesizes exactly one [`Event`] and starts over.
//!
//! A partial packet that does not complete within the inter-byte timeout is
//! discarded, so one lost byte costs at most one packet instead of
//! misaligning every packet after it.

use embassy_time::{Duration, Instant};

use crate::types::{Event, EventKind, KeyFlags, Modifiers, Phase, TYPE_RELEASE};

/// Length of the largest packet.
pub const MAX_PACKET_LEN: usize = 5;

/// Compact packet length: `[keycode][modifier]`.
pub const COMPACT_PACKET_LEN: usize = 2;

/// Extended packet length: `[type][code_lo][code_hi][modifier][flags]`.
pub const EXTENDED_PACKET_LEN: usize = 5;

/// Which generation of the wire protocol a link speaks.
///
/// The two are incompatible and carry no version byte, so a build picks one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireFormat {
    /// Two bytes, press only; release is implied.
    Compact,
    /// Five bytes with kind, phase, 16-bit code and flags.
    Extended,
}

impl WireFormat {
    /// Number of bytes in one packet.
    #[inline]
    #[must_use]
    pub const fn packet_len(self) -> usize {
        match self {
            Self::Compact => COMPACT_PACKET_LEN,
            Self::Extended => EXTENDED_PACKET_LEN,
        }
    }
}

/// Counters for everything the decoder has seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecoderStats {
    /// Packets decoded into an event.
    pub packets: u32,
    /// Complete packets discarded for an unknown type nibble.
    pub malformed: u32,
    /// Partial packets discarded by the inter-byte timeout.
    pub timeouts: u32,
}

/// Byte-at-a-time packet decoder.
pub struct Decoder {
    format: WireFormat,
    timeout: Duration,
    buffer: [u8; MAX_PACKET_LEN],
    pos: usize,
    started_at: Instant,
    stats: DecoderStats,
}

impl Decoder {
    /// Create a decoder for `format` that drops partial packets older than `timeout`.
    #[must_use]
    pub const fn new(format: WireFormat, timeout: Duration) -> Self {
        Self {
            format,
            timeout,
            buffer: [0u8; MAX_PACKET_LEN],
            pos: 0,
            started_at: Instant::from_ticks(0),
            stats: DecoderStats {
                packets: 0,
                malformed: 0,
                timeouts: 0,
            },
        }
    }

    #[inline]
    #[must_use]
    pub const fn format(&self) -> WireFormat {
        self.format
    }

    /// Discard any partial packet.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Bytes of the current partial packet.
    #[inline]
    #[must_use]
    pub const fn pending_bytes(&self) -> usize {
        self.pos
    }

    /// True when waiting for the first byte of a packet.
    #[inline]
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.pos == 0
    }

    #[inline]
    #[must_use]
    pub const fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop a partial packet that has been pending longer than the timeout.
    ///
    /// Returns `true` if bytes were discarded. Called from [`Decoder::feed`]
    /// and also from idle loops so a stale fragment does not linger until the
    /// next byte arrives.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        if self.pos == 0 {
            return false;
        }
        if now.saturating_duration_since(self.started_at) > self.timeout {
            self.stats.timeouts = self.stats.timeouts.wrapping_add(1);
            self.reset();
            return true;
        }
        false
    }

    /// Feed one byte received at `now`.
    ///
    /// Returns `Some(event)` when this byte completes a valid packet.
    pub fn feed(&mut self, byte: u8, now: Instant) -> Option<Event> {
        self.poll_timeout(now);

        if self.pos == 0 {
            self.started_at = now;
        }
        self.buffer[self.pos] = byte;
        self.pos += 1;

        if self.pos < self.format.packet_len() {
            return None;
        }

        let event = match self.format {
            WireFormat::Compact => Some(self.decode_compact()),
            WireFormat::Extended => self.decode_extended(),
        };
        self.reset();

        match event {
            Some(_) => self.stats.packets = self.stats.packets.wrapping_add(1),
            None => self.stats.malformed = self.stats.malformed.wrapping_add(1),
        }
        event
    }

    fn decode_compact(&self) -> Event {
        Event::key_press(self.buffer[0], Modifiers(self.buffer[1]))
    }

    fn decode_extended(&self) -> Option<Event> {
        let [ty, code_lo, code_hi, modifier, flags] = self.buffer;
        let phase = if ty & TYPE_RELEASE != 0 {
            Phase::Release
        } else {
            Phase::Press
        };
        let usage = u16::from_le_bytes([code_lo, code_hi]);

        match EventKind::from_nibble(ty)? {
            EventKind::Keyboard => Some(Event::keyboard(
                phase,
                code_lo,
                Modifiers(modifier),
                KeyFlags(flags),
            )),
            EventKind::ConsumerControl => Some(Event::consumer(phase, usage)),
            EventKind::VendorControl => Some(Event::vendor(phase, usage)),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn ms(n: u64) -> Instant {
        Instant::from_millis(n)
    }

    fn feed_all(decoder: &mut Decoder, bytes: &[u8], now: Instant) -> Vec<Event> {
        bytes.iter().filter_map(|&b| decoder.feed(b, now)).collect()
    }

    #[test]
    fn test_compact_packets() {
        let mut decoder = Decoder::new(WireFormat::Compact, TIMEOUT);
        let events = feed_all(&mut decoder, &[0x04, 0x00, 0x04, 0x02, 0x1E, 0x08], ms(0));

        assert_eq!(
            events,
            [
                Event::key_press(0x04, Modifiers::NONE),
                Event::key_press(0x04, Modifiers::LEFT_SHIFT),
                Event::key_press(0x1E, Modifiers::LEFT_GUI),
            ]
        );
        assert_eq!(decoder.stats().packets, 3);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_extended_keyboard_press_and_release() {
        let mut decoder = Decoder::new(WireFormat::Extended, TIMEOUT);
        let events = feed_all(
            &mut decoder,
            &[0x00, 0x04, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00],
            ms(0),
        );

        assert_eq!(
            events,
            [
                Event::keyboard(Phase::Press, 0x04, Modifiers::NONE, KeyFlags::NONE),
                Event::keyboard(Phase::Release, 0x00, Modifiers::NONE, KeyFlags::NONE),
            ]
        );
    }

    #[test]
    fn test_extended_consumer_uses_full_usage() {
        let mut decoder = Decoder::new(WireFormat::Extended, TIMEOUT);
        // Volume up (0x00E9) with garbage in the modifier and flags bytes
        let events = feed_all(&mut decoder, &[0x01, 0xE9, 0x00, 0xFF, 0xFF], ms(0));
        assert_eq!(events, [Event::consumer(Phase::Press, 0x00E9)]);

        let events = feed_all(&mut decoder, &[0x82, 0x34, 0x12, 0x00, 0x00], ms(0));
        assert_eq!(events, [Event::vendor(Phase::Release, 0x1234)]);
    }

    #[test]
    fn test_keyboard_ignores_code_high_byte() {
        let mut decoder = Decoder::new(WireFormat::Extended, TIMEOUT);
        let events = feed_all(&mut decoder, &[0x00, 0x2C, 0x7F, 0x01, 0x01], ms(0));
        assert_eq!(
            events,
            [Event::keyboard(Phase::Press, 0x2C, Modifiers::LEFT_CTRL, KeyFlags::FN)]
        );
    }

    #[test]
    fn test_unknown_kind_discards_whole_packet() {
        let mut decoder = Decoder::new(WireFormat::Extended, TIMEOUT);
        let events = feed_all(
            &mut decoder,
            &[0x07, 0x04, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00],
            ms(0),
        );

        assert_eq!(
            events,
            [Event::keyboard(Phase::Press, 0x05, Modifiers::NONE, KeyFlags::NONE)]
        );
        assert_eq!(decoder.stats().malformed, 1);
        assert_eq!(decoder.stats().packets, 1);
    }

    #[test]
    fn test_timeout_discards_partial_packet() {
        let mut decoder = Decoder::new(WireFormat::Extended, TIMEOUT);
        assert_eq!(decoder.feed(0x00, ms(0)), None);
        assert_eq!(decoder.feed(0x09, ms(10)), None);
        assert_eq!(decoder.pending_bytes(), 2);

        let events = feed_all(&mut decoder, &[0x00, 0x04, 0x00, 0x02, 0x00], ms(500));
        assert_eq!(events, [Event::key_press(0x04, Modifiers::LEFT_SHIFT)]);
        assert_eq!(decoder.stats().timeouts, 1);
    }

    #[test]
    fn test_timeout_measured_from_first_byte() {
        let mut decoder = Decoder::new(WireFormat::Compact, TIMEOUT);
        assert_eq!(decoder.feed(0x04, ms(0)), None);
        // Exactly at the limit is still in time
        assert_eq!(
            decoder.feed(0x00, ms(200)),
            Some(Event::key_press(0x04, Modifiers::NONE))
        );

        assert_eq!(decoder.feed(0x05, ms(1000)), None);
        assert_eq!(decoder.feed(0x06, ms(1201)), None);
        assert_eq!(decoder.pending_bytes(), 1);
        assert_eq!(decoder.stats().timeouts, 1);
    }

    #[test]
    fn test_poll_timeout_when_idle() {
        let mut decoder = Decoder::new(WireFormat::Extended, TIMEOUT);
        assert!(!decoder.poll_timeout(ms(10_000)));

        decoder.feed(0x00, ms(0));
        assert!(!decoder.poll_timeout(ms(100)));
        assert!(decoder.poll_timeout(ms(300)));
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_reset_drops_partial() {
        let mut decoder = Decoder::new(WireFormat::Compact, TIMEOUT);
        decoder.feed(0x04, ms(0));
        decoder.reset();
        assert_eq!(decoder.feed(0x05, ms(1)), None);
        assert_eq!(
            decoder.feed(0x00, ms(2)),
            Some(Event::key_press(0x05, Modifiers::NONE))
        );
    }

    #[test]
    fn test_compact_zero_keycode_is_decoded() {
        // No-op suppression happens at emission, not here
        let mut decoder = Decoder::new(WireFormat::Compact, TIMEOUT);
        let events = feed_all(&mut decoder, &[0x00, 0x02], ms(0));
        assert_eq!(events.len(), 1);
        assert!(events[0].is_noop());
    }

    /// Feed `packet` split at every combination of byte boundaries, one chunk
    /// per instant, and check each split yields exactly `expected`.
    fn check_all_chunkings(format: WireFormat, packet: &[u8], expected: Event) {
        let splits = 1u32 << (packet.len() - 1);
        for mask in 0..splits {
            let mut decoder = Decoder::new(format, TIMEOUT);
            let mut events = Vec::new();
            let mut start = 0;
            let mut chunk = 0u64;
            for end in 1..=packet.len() {
                let cut_here = end == packet.len() || mask & (1 << (end - 1)) != 0;
                if cut_here {
                    events.extend(feed_all(&mut decoder, &packet[start..end], ms(chunk * 37)));
                    start = end;
                    chunk += 1;
                }
            }
            assert_eq!(events, [expected], "split mask {:#b}", mask);
            assert!(decoder.is_idle());
        }
    }

    #[test]
    fn test_extended_packet_any_chunking() {
        check_all_chunkings(
            WireFormat::Extended,
            &[0x00, 0x04, 0x00, 0x22, 0x01],
            Event::keyboard(Phase::Press, 0x04, Modifiers(0x22), KeyFlags::FN),
        );
        check_all_chunkings(
            WireFormat::Extended,
            &[0x82, 0xEF, 0xBE, 0x00, 0x00],
            Event::vendor(Phase::Release, 0xBEEF),
        );
    }

    #[test]
    fn test_compact_packet_any_chunking() {
        check_all_chunkings(
            WireFormat::Compact,
            &[0x1E, 0x08],
            Event::key_press(0x1E, Modifiers::LEFT_GUI),
        );
    }
}
