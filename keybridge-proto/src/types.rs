//! Core event types: EventKind, Phase, Modifiers, KeyFlags, Event.

use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use crate::report::HidInterface;

/// Extended packet type bit marking a release.
pub(crate) const TYPE_RELEASE: u8 = 0x80;

/// Extended packet type bits selecting the event kind.
pub(crate) const TYPE_KIND_MASK: u8 = 0x0F;

/// Which HID usage family an event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EventKind {
    /// Keyboard/keypad page (boot keyboard interface).
    Keyboard = 0,
    /// Consumer control page (media and system keys).
    ConsumerControl = 1,
    /// Vendor-defined page.
    VendorControl = 2,
}

impl EventKind {
    /// Decode the low nibble of an extended packet's type byte.
    ///
    /// Returns `None` for nibbles that do not name a kind.
    #[inline]
    #[must_use]
    pub const fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble & TYPE_KIND_MASK {
            0 => Some(Self::Keyboard),
            1 => Some(Self::ConsumerControl),
            2 => Some(Self::VendorControl),
            _ => None,
        }
    }
}

/// Key down or key up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Press,
    Release,
}

/// Keyboard modifier bitfield.
///
/// One bit per {Left, Right} x {Ctrl, Shift, Alt, GUI}, laid out exactly as
/// byte 0 of a boot keyboard report.
///
/// # Example
///
/// ```
/// use keybridge_proto::Modifiers;
///
/// let mods = Modifiers::LEFT_CTRL | Modifiers::LEFT_SHIFT;
/// assert!(mods.contains(Modifiers::LEFT_SHIFT));
/// assert!(!mods.contains(Modifiers::RIGHT_GUI));
/// assert_eq!(mods.raw(), 0x03);
/// ```
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const LEFT_CTRL: Self = Self(1 << 0);
    pub const LEFT_SHIFT: Self = Self(1 << 1);
    pub const LEFT_ALT: Self = Self(1 << 2);
    pub const LEFT_GUI: Self = Self(1 << 3);
    pub const RIGHT_CTRL: Self = Self(1 << 4);
    pub const RIGHT_SHIFT: Self = Self(1 << 5);
    pub const RIGHT_ALT: Self = Self(1 << 6);
    pub const RIGHT_GUI: Self = Self(1 << 7);

    /// No modifiers held.
    pub const NONE: Self = Self(0);

    /// Check if the given modifier(s) are all set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Modifiers) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Set or clear modifier(s).
    #[inline]
    pub fn set(&mut self, other: Modifiers, held: bool) {
        if held {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    /// Get the raw u8 value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Check if no modifiers are held.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Modifiers {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Modifiers {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for Modifiers {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for Modifiers {
    type Output = Self;

    #[inline]
    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

/// Auxiliary keyboard flags, carried in the vendor-reserved report byte.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyFlags(pub u8);

impl KeyFlags {
    /// Function ("Fn") modifier.
    pub const FN: Self = Self(1 << 0);

    pub const NONE: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn contains(self, other: KeyFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl BitOr for KeyFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// A single decoded key event.
///
/// Fields are private so the kind invariants always hold: consumer and
/// vendor events carry no modifiers or flags, and keyboard events never
/// carry a usage code above 0xFF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    kind: EventKind,
    phase: Phase,
    code: u16,
    modifiers: Modifiers,
    flags: KeyFlags,
}

impl Event {
    /// Keyboard event with a boot-page keycode.
    #[must_use]
    pub const fn keyboard(phase: Phase, code: u8, modifiers: Modifiers, flags: KeyFlags) -> Self {
        Self {
            kind: EventKind::Keyboard,
            phase,
            code: code as u16,
            modifiers,
            flags,
        }
    }

    /// Keyboard press without auxiliary flags (the compact protocol's only event).
    #[must_use]
    pub const fn key_press(code: u8, modifiers: Modifiers) -> Self {
        Self::keyboard(Phase::Press, code, modifiers, KeyFlags::NONE)
    }

    /// Consumer control event with a 16-bit usage.
    #[must_use]
    pub const fn consumer(phase: Phase, usage: u16) -> Self {
        Self::aux(EventKind::ConsumerControl, phase, usage)
    }

    /// Vendor control event with a 16-bit usage.
    #[must_use]
    pub const fn vendor(phase: Phase, usage: u16) -> Self {
        Self::aux(EventKind::VendorControl, phase, usage)
    }

    const fn aux(kind: EventKind, phase: Phase, usage: u16) -> Self {
        Self {
            kind,
            phase,
            code: usage,
            modifiers: Modifiers::NONE,
            flags: KeyFlags::NONE,
        }
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    #[must_use]
    pub const fn code(&self) -> u16 {
        self.code
    }

    #[inline]
    #[must_use]
    pub const fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> KeyFlags {
        self.flags
    }

    /// A keyboard press of keycode 0 means "no key" and must never reach USB.
    #[inline]
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self.kind, EventKind::Keyboard)
            && matches!(self.phase, Phase::Press)
            && self.code == 0
    }

    /// HID interface that carries this event's reports.
    #[inline]
    #[must_use]
    pub const fn interface(&self) -> HidInterface {
        match self.kind {
            EventKind::Keyboard => HidInterface::Keyboard,
            EventKind::ConsumerControl | EventKind::VendorControl => HidInterface::Auxiliary,
        }
    }

    /// Extended-protocol type byte for this event.
    #[inline]
    #[must_use]
    pub const fn type_byte(&self) -> u8 {
        let release = match self.phase {
            Phase::Press => 0,
            Phase::Release => TYPE_RELEASE,
        };
        self.kind as u8 | release
    }

    /// Pack the event into one machine word for the cross-context FIFO.
    ///
    /// Layout (little-endian bytes): `[code_lo][code_hi | modifier][flags][type]`.
    /// Keyboard codes never use the high byte and aux events never carry
    /// modifiers, so byte 1 is unambiguous once the type is known. A compact
    /// key press packs to `code | modifier << 8`.
    #[must_use]
    pub const fn to_word(&self) -> u32 {
        let [lo, hi] = self.code.to_le_bytes();
        let byte1 = match self.kind {
            EventKind::Keyboard => self.modifiers.0,
            EventKind::ConsumerControl | EventKind::VendorControl => hi,
        };
        u32::from_le_bytes([lo, byte1, self.flags.0, self.type_byte()])
    }

    /// Unpack a word produced by [`Event::to_word`].
    ///
    /// Returns `None` if the type byte names no known kind.
    #[must_use]
    pub const fn from_word(word: u32) -> Option<Self> {
        let [lo, byte1, flags, ty] = word.to_le_bytes();
        let phase = if ty & TYPE_RELEASE != 0 {
            Phase::Release
        } else {
            Phase::Press
        };
        match EventKind::from_nibble(ty) {
            Some(EventKind::Keyboard) => {
                Some(Self::keyboard(phase, lo, Modifiers(byte1), KeyFlags(flags)))
            }
            Some(kind) => Some(Self::aux(kind, phase, u16::from_le_bytes([lo, byte1]))),
            None => None,
        }
    }
}
