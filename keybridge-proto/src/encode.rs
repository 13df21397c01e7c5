//! Wire encoding for host tools and tests.

use crate::decoder::{WireFormat, COMPACT_PACKET_LEN, EXTENDED_PACKET_LEN};
use crate::types::{Event, EventKind, KeyFlags, Phase};

/// Encoding error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Output buffer shorter than one packet.
    BufferTooSmall,
    /// The wire format cannot represent this event.
    Unsupported,
}

/// Encode `event` as one extended packet.
#[must_use]
pub const fn encode_extended(event: &Event) -> [u8; EXTENDED_PACKET_LEN] {
    let [code_lo, code_hi] = event.code().to_le_bytes();
    let (modifier, flags) = match event.kind() {
        EventKind::Keyboard => (event.modifiers().raw(), event.flags().raw()),
        EventKind::ConsumerControl | EventKind::VendorControl => (0, 0),
    };
    [event.type_byte(), code_lo, code_hi, modifier, flags]
}

/// Encode `event` as one compact packet.
///
/// Only keyboard presses without flags fit; the receiver releases the key on
/// its own.
pub fn encode_compact(event: &Event) -> Result<[u8; COMPACT_PACKET_LEN], EncodeError> {
    if event.kind() != EventKind::Keyboard
        || event.phase() != Phase::Press
        || event.flags() != KeyFlags::NONE
    {
        return Err(EncodeError::Unsupported);
    }
    let [code, _] = event.code().to_le_bytes();
    Ok([code, event.modifiers().raw()])
}

/// Encode `event` into `buf` using `format`.
///
/// Returns the number of bytes written.
pub fn encode(event: &Event, format: WireFormat, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let len = format.packet_len();
    let out = buf.get_mut(..len).ok_or(EncodeError::BufferTooSmall)?;
    match format {
        WireFormat::Compact => out.copy_from_slice(&encode_compact(event)?),
        WireFormat::Extended => out.copy_from_slice(&encode_extended(event)),
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use embassy_time::{Duration, Instant};

    use super::*;
    use crate::decoder::Decoder;
    use crate::types::Modifiers;

    fn decode_one(format: WireFormat, bytes: &[u8]) -> Option<Event> {
        let mut decoder = Decoder::new(format, Duration::from_millis(200));
        let now = Instant::from_millis(0);
        let mut out = None;
        for &b in bytes {
            if let Some(event) = decoder.feed(b, now) {
                assert!(out.is_none(), "more than one event from one packet");
                out = Some(event);
            }
        }
        out
    }

    #[test]
    fn test_extended_layout() {
        let event = Event::keyboard(Phase::Release, 0x04, Modifiers::RIGHT_ALT, KeyFlags::FN);
        assert_eq!(encode_extended(&event), [0x80, 0x04, 0x00, 0x40, 0x01]);

        let event = Event::consumer(Phase::Press, 0x0223);
        assert_eq!(encode_extended(&event), [0x01, 0x23, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn test_compact_rejects_unrepresentable() {
        let cases = [
            Event::consumer(Phase::Press, 0xE9),
            Event::keyboard(Phase::Release, 0x04, Modifiers::NONE, KeyFlags::NONE),
            Event::keyboard(Phase::Press, 0x04, Modifiers::NONE, KeyFlags::FN),
        ];
        for event in cases {
            assert_eq!(encode_compact(&event), Err(EncodeError::Unsupported));
        }
    }

    #[test]
    fn test_buffer_too_small() {
        let event = Event::key_press(0x04, Modifiers::NONE);
        let mut buf = [0u8; 4];
        assert_eq!(
            encode(&event, WireFormat::Extended, &mut buf),
            Err(EncodeError::BufferTooSmall)
        );
        assert_eq!(encode(&event, WireFormat::Compact, &mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0x04, 0x00]);
    }

    #[test]
    fn test_decoder_accepts_encoded_events() {
        let events = [
            Event::key_press(0x1E, Modifiers::LEFT_GUI),
            Event::keyboard(Phase::Press, 0xE3, Modifiers(0xFF), KeyFlags::FN),
            Event::keyboard(Phase::Release, 0x00, Modifiers::NONE, KeyFlags::NONE),
            Event::consumer(Phase::Press, 0x00CD),
            Event::consumer(Phase::Release, 0x0000),
            Event::vendor(Phase::Press, 0xBEEF),
        ];
        let mut buf = [0u8; 8];
        for event in events {
            let n = encode(&event, WireFormat::Extended, &mut buf).unwrap();
            assert_eq!(decode_one(WireFormat::Extended, &buf[..n]), Some(event));

            if let Ok(n) = encode(&event, WireFormat::Compact, &mut buf) {
                assert_eq!(decode_one(WireFormat::Compact, &buf[..n]), Some(event));
            }
        }
    }

    #[test]
    fn test_every_keycode_survives_both_formats() {
        let modifiers = [
            Modifiers::NONE,
            Modifiers::LEFT_CTRL,
            Modifiers::LEFT_SHIFT | Modifiers::RIGHT_ALT,
            Modifiers::RIGHT_GUI,
            Modifiers(0xFF),
        ];
        let flags = [KeyFlags::NONE, KeyFlags::FN, KeyFlags(0xFE)];
        let mut buf = [0u8; 8];

        for code in 0..=u8::MAX {
            for &m in &modifiers {
                for &f in &flags {
                    for phase in [Phase::Press, Phase::Release] {
                        let event = Event::keyboard(phase, code, m, f);
                        let n = encode(&event, WireFormat::Extended, &mut buf).unwrap();
                        assert_eq!(decode_one(WireFormat::Extended, &buf[..n]), Some(event));
                    }
                }

                let event = Event::key_press(code, m);
                let n = encode(&event, WireFormat::Compact, &mut buf).unwrap();
                assert_eq!(decode_one(WireFormat::Compact, &buf[..n]), Some(event));
            }
        }
    }

    #[test]
    fn test_aux_usage_boundaries() {
        let mut buf = [0u8; 8];
        for usage in [0x0000, 0x0001, 0x00FF, 0x0100, 0x7FFF, 0x8000, 0xFFFE, 0xFFFF] {
            for phase in [Phase::Press, Phase::Release] {
                for event in [Event::consumer(phase, usage), Event::vendor(phase, usage)] {
                    let n = encode(&event, WireFormat::Extended, &mut buf).unwrap();
                    assert_eq!(decode_one(WireFormat::Extended, &buf[..n]), Some(event));
                    assert_eq!(
                        encode(&event, WireFormat::Compact, &mut buf),
                        Err(EncodeError::Unsupported)
                    );
                }
            }
        }
    }
}
