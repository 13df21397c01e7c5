//! HID report layouts.
//!
//! The keyboard interface uses the boot keyboard layout without a report id.
//! Consumer and vendor usages share the auxiliary interface and are told
//! apart by report id.

use crate::types::{Event, EventKind, Phase};

/// Report id of consumer control reports on the auxiliary interface.
pub const REPORT_ID_CONSUMER: u8 = 1;

/// Report id of vendor-defined reports on the auxiliary interface.
pub const REPORT_ID_VENDOR: u8 = 2;

/// Largest report in bytes.
pub const MAX_REPORT_SIZE: usize = KeyboardReport::SIZE;

/// USB HID interface a report travels on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HidInterface {
    Keyboard,
    Auxiliary,
}

impl HidInterface {
    /// Number of interfaces.
    pub const COUNT: usize = 2;

    /// Stable slot index for per-interface tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Keyboard => 0,
            Self::Auxiliary => 1,
        }
    }
}

/// Boot keyboard input report.
///
/// Byte 1 is reserved by the boot protocol; this device carries the
/// auxiliary function flags there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyboardReport {
    pub modifier: u8,
    pub flags: u8,
    pub keycodes: [u8; 6],
}

impl KeyboardReport {
    pub const SIZE: usize = 8;

    /// All keys up.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            modifier: 0,
            flags: 0,
            keycodes: [0; 6],
        }
    }

    /// A single key held, in rollover slot 0.
    #[must_use]
    pub const fn single(keycode: u8, modifier: u8, flags: u8) -> Self {
        Self {
            modifier,
            flags,
            keycodes: [keycode, 0, 0, 0, 0, 0],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifier == 0 && self.flags == 0 && self.keycodes.iter().all(|&k| k == 0)
    }

    #[must_use]
    pub const fn to_bytes(&self) -> [u8; Self::SIZE] {
        let k = self.keycodes;
        [self.modifier, self.flags, k[0], k[1], k[2], k[3], k[4], k[5]]
    }
}

/// Consumer or vendor usage report, prefixed by its report id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AuxReport {
    pub report_id: u8,
    pub usage: u16,
}

impl AuxReport {
    pub const SIZE: usize = 3;

    #[must_use]
    pub const fn new(report_id: u8, usage: u16) -> Self {
        Self { report_id, usage }
    }

    /// Usage 0, the key-up value.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.usage == 0
    }

    #[must_use]
    pub const fn to_bytes(&self) -> [u8; Self::SIZE] {
        let [lo, hi] = self.usage.to_le_bytes();
        [self.report_id, lo, hi]
    }
}

/// Any report the bridge emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Report {
    Keyboard(KeyboardReport),
    Aux(AuxReport),
}

impl Report {
    /// The press report for `event`.
    ///
    /// `None` for releases and for the keyboard no-op (keycode 0), neither of
    /// which produce a press.
    #[must_use]
    pub fn press_for(event: &Event) -> Option<Self> {
        if event.phase() == Phase::Release || event.is_noop() {
            return None;
        }
        Some(match event.kind() {
            EventKind::Keyboard => Self::Keyboard(KeyboardReport::single(
                event.code() as u8,
                event.modifiers().raw(),
                event.flags().raw(),
            )),
            EventKind::ConsumerControl => {
                Self::Aux(AuxReport::new(REPORT_ID_CONSUMER, event.code()))
            }
            EventKind::VendorControl => Self::Aux(AuxReport::new(REPORT_ID_VENDOR, event.code())),
        })
    }

    /// The all-zero release report on the interface and report id of `event`.
    #[must_use]
    pub const fn release_for(event: &Event) -> Self {
        match event.kind() {
            EventKind::Keyboard => Self::Keyboard(KeyboardReport::empty()),
            EventKind::ConsumerControl => Self::Aux(AuxReport::new(REPORT_ID_CONSUMER, 0)),
            EventKind::VendorControl => Self::Aux(AuxReport::new(REPORT_ID_VENDOR, 0)),
        }
    }

    #[must_use]
    pub const fn interface(&self) -> HidInterface {
        match self {
            Self::Keyboard(_) => HidInterface::Keyboard,
            Self::Aux(_) => HidInterface::Auxiliary,
        }
    }

    /// Report id on the wire, 0 for the keyboard interface which has none.
    #[must_use]
    pub const fn report_id(&self) -> u8 {
        match self {
            Self::Keyboard(_) => 0,
            Self::Aux(r) => r.report_id,
        }
    }

    /// True for the all-zero key-up report.
    ///
    /// This looks only at the bytes. An auxiliary press of usage 0 is
    /// identical on the wire to that report id's key-up, so it also reads as
    /// a release here; use the emitter's stage to tell them apart.
    #[must_use]
    pub fn is_release(&self) -> bool {
        match self {
            Self::Keyboard(r) => r.is_empty(),
            Self::Aux(r) => r.is_empty(),
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Keyboard(_) => KeyboardReport::SIZE,
            Self::Aux(_) => AuxReport::SIZE,
        }
    }

    /// Write the report into `buf`, returning bytes written.
    ///
    /// Returns 0 without writing if `buf` is too short.
    pub fn write_to(&self, buf: &mut [u8]) -> usize {
        let Some(out) = buf.get_mut(..self.len()) else {
            return 0;
        };
        match self {
            Self::Keyboard(r) => out.copy_from_slice(&r.to_bytes()),
            Self::Aux(r) => out.copy_from_slice(&r.to_bytes()),
        }
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeyFlags, Modifiers};

    #[test]
    fn test_keyboard_press_layout() {
        let event = Event::keyboard(Phase::Press, 0x04, Modifiers::LEFT_SHIFT, KeyFlags::FN);
        let report = Report::press_for(&event).unwrap();

        let mut buf = [0xAAu8; 16];
        assert_eq!(report.write_to(&mut buf), 8);
        assert_eq!(&buf[..8], &[0x02, 0x01, 0x04, 0, 0, 0, 0, 0]);
        assert_eq!(report.interface(), HidInterface::Keyboard);
        assert!(!report.is_release());
    }

    #[test]
    fn test_consumer_press_layout() {
        let event = Event::consumer(Phase::Press, 0x00E9);
        let report = Report::press_for(&event).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(report.write_to(&mut buf), 3);
        assert_eq!(&buf[..3], &[REPORT_ID_CONSUMER, 0xE9, 0x00]);
        assert_eq!(report.interface(), HidInterface::Auxiliary);
    }

    #[test]
    fn test_vendor_release_keeps_report_id() {
        let event = Event::vendor(Phase::Release, 0x1234);
        assert_eq!(Report::press_for(&event), None);

        let release = Report::release_for(&event);
        assert!(release.is_release());
        assert_eq!(release.report_id(), REPORT_ID_VENDOR);
        assert_eq!(release, Report::Aux(AuxReport::new(REPORT_ID_VENDOR, 0)));
    }

    #[test]
    fn test_zero_usage_press_matches_key_up_bytes() {
        let press = Event::consumer(Phase::Press, 0);
        let report = Report::press_for(&press).unwrap();
        assert_eq!(report, Report::release_for(&press));
        assert!(report.is_release());
    }

    #[test]
    fn test_noop_has_no_press_report() {
        assert_eq!(Report::press_for(&Event::key_press(0, Modifiers::LEFT_CTRL)), None);
    }

    #[test]
    fn test_write_to_short_buffer() {
        let report = Report::Keyboard(KeyboardReport::empty());
        let mut buf = [0u8; 4];
        assert_eq!(report.write_to(&mut buf), 0);
    }
}
