//! Staged HID report emission.
//!
//! HID keyboards report state, not keystrokes, so every press has to be
//! followed by an all-zero report or the host sees the key held forever.
//! The emitter keeps one [`Stage`] per interface and drives
//! press → hold → release → gap without ever blocking: each [`Emitter::poll`]
//! does whatever is due right now and returns.
//!
//! At most one event is taken from the source at a time. While it waits for
//! its interface the rest of the queue waits behind it, so reports leave in
//! wire order.

use embassy_time::{Duration, Instant};
use keybridge_proto::{Event, HidInterface, Phase, Report};

use crate::config::Config;
use crate::output::ReportSink;
use crate::queue::EventSource;

/// Per-interface emission state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    /// Nothing held. `released_at` is when the last key-up went out.
    Idle { released_at: Option<Instant> },
    /// A press report is on the wire; its release is owed.
    PressSent { event: Event, at: Instant },
}

impl Stage {
    const IDLE: Self = Self::Idle { released_at: None };
}

/// Emission counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EmitterStats {
    /// Press reports sent.
    pub presses: u32,
    /// Key-up reports sent, automatic and explicit.
    pub releases: u32,
    /// Keyboard no-op events discarded.
    pub noops: u32,
    /// Sends refused by the sink and retried later.
    pub retries: u32,
}

/// Turns events into paced press/release report pairs.
pub struct Emitter {
    stages: [Stage; HidInterface::COUNT],
    pending: Option<Event>,
    hold: Duration,
    gap: Duration,
    stats: EmitterStats,
}

impl Emitter {
    #[must_use]
    pub const fn new(config: &Config) -> Self {
        Self {
            stages: [Stage::IDLE; HidInterface::COUNT],
            pending: None,
            hold: config.press_hold,
            gap: config.release_gap,
            stats: EmitterStats {
                presses: 0,
                releases: 0,
                noops: 0,
                retries: 0,
            },
        }
    }

    #[must_use]
    pub fn stage(&self, interface: HidInterface) -> Stage {
        self.stages[interface.index()]
    }

    /// Event taken from the source but not yet emitted.
    #[must_use]
    pub fn pending(&self) -> Option<Event> {
        self.pending
    }

    #[must_use]
    pub fn stats(&self) -> EmitterStats {
        self.stats
    }

    /// True when no release is owed and no event is waiting.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.stages.iter().all(|s| matches!(s, Stage::Idle { .. }))
    }

    /// Do whatever emission work is due at `now`.
    ///
    /// Returns `true` if at least one report was sent.
    pub fn poll<S, K>(&mut self, source: &mut S, sink: &mut K, now: Instant) -> bool
    where
        S: EventSource + ?Sized,
        K: ReportSink + ?Sized,
    {
        let mut sent = self.release_due(sink, now);

        if self.pending.is_none() {
            self.pending = self.next_emittable(source);
        }

        if let Some(event) = self.pending {
            let done = match event.phase() {
                Phase::Press => self.try_press(&event, sink, now),
                Phase::Release => self.try_release(&event, sink, now),
            };
            if done {
                self.pending = None;
                sent = true;
            }
        }

        sent
    }

    /// Send automatic key-ups whose hold time has elapsed.
    fn release_due<K: ReportSink + ?Sized>(&mut self, sink: &mut K, now: Instant) -> bool {
        let mut sent = false;
        for iface in [HidInterface::Keyboard, HidInterface::Auxiliary] {
            if let Stage::PressSent { event, at } = self.stages[iface.index()] {
                if now.saturating_duration_since(at) >= self.hold
                    && self.send(sink, &Report::release_for(&event))
                {
                    self.stages[iface.index()] = Stage::Idle {
                        released_at: Some(now),
                    };
                    self.stats.releases = self.stats.releases.wrapping_add(1);
                    sent = true;
                }
            }
        }
        sent
    }

    /// Pop events until one that produces a report, discarding no-ops.
    fn next_emittable<S: EventSource + ?Sized>(&mut self, source: &mut S) -> Option<Event> {
        loop {
            let event = source.next_event()?;
            if !event.is_noop() {
                return Some(event);
            }
            self.stats.noops = self.stats.noops.wrapping_add(1);
            trace!("emitter: discarded no-op press");
        }
    }

    fn try_press<K: ReportSink + ?Sized>(&mut self, event: &Event, sink: &mut K, now: Instant) -> bool {
        let iface = event.interface();
        let Stage::Idle { released_at } = self.stages[iface.index()] else {
            return false;
        };
        if let Some(t) = released_at {
            if now.saturating_duration_since(t) < self.gap {
                return false;
            }
        }
        let Some(report) = Report::press_for(event) else {
            return true;
        };
        if !self.send(sink, &report) {
            return false;
        }
        self.stages[iface.index()] = Stage::PressSent { event: *event, at: now };
        self.stats.presses = self.stats.presses.wrapping_add(1);
        true
    }

    /// Explicit key-ups skip press pacing.
    ///
    /// One that targets the report id currently held also settles the
    /// automatic release, so the host sees a single key-up. One for a
    /// different report id on a busy interface waits for that interface.
    fn try_release<K: ReportSink + ?Sized>(&mut self, event: &Event, sink: &mut K, now: Instant) -> bool {
        let iface = event.interface();
        let report = Report::release_for(event);
        if let Stage::PressSent { event: held, .. } = self.stages[iface.index()] {
            if Report::release_for(&held).report_id() != report.report_id() {
                return false;
            }
        }
        if !self.send(sink, &report) {
            return false;
        }
        self.stages[iface.index()] = Stage::Idle {
            released_at: Some(now),
        };
        self.stats.releases = self.stats.releases.wrapping_add(1);
        true
    }

    fn send<K: ReportSink + ?Sized>(&mut self, sink: &mut K, report: &Report) -> bool {
        if !sink.is_ready(report.interface()) {
            return false;
        }
        match sink.try_send(report) {
            Ok(()) => true,
            Err(_e) => {
                self.stats.retries = self.stats.retries.wrapping_add(1);
                debug!("emitter: send refused, retrying");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::collections::VecDeque;
    use std::vec::Vec;

    use keybridge_proto::{AuxReport, KeyFlags, KeyboardReport, Modifiers, REPORT_ID_CONSUMER, REPORT_ID_VENDOR};

    use super::*;
    use crate::output::OutputError;

    struct MockSource(VecDeque<Event>);

    impl MockSource {
        fn new(events: &[Event]) -> Self {
            Self(events.iter().copied().collect())
        }
    }

    impl EventSource for MockSource {
        fn next_event(&mut self) -> Option<Event> {
            self.0.pop_front()
        }
    }

    #[derive(Default)]
    struct MockSink {
        sent: Vec<Report>,
        not_ready: [bool; 2],
        fail_next: bool,
    }

    impl ReportSink for MockSink {
        fn is_ready(&self, interface: HidInterface) -> bool {
            !self.not_ready[interface.index()]
        }

        fn try_send(&mut self, report: &Report) -> Result<(), OutputError> {
            if self.fail_next {
                self.fail_next = false;
                return Err(OutputError::Busy);
            }
            self.sent.push(*report);
            Ok(())
        }
    }

    fn ms(n: u64) -> Instant {
        Instant::from_millis(n)
    }

    fn kbd(code: u8, mods: Modifiers) -> Report {
        Report::Keyboard(KeyboardReport::single(code, mods.raw(), 0))
    }

    fn kbd_up() -> Report {
        Report::Keyboard(KeyboardReport::empty())
    }

    /// Poll once per millisecond from `start` until the emitter settles.
    fn run(emitter: &mut Emitter, source: &mut MockSource, sink: &mut MockSink, start: u64) -> u64 {
        let mut t = start;
        while !(emitter.is_idle() && source.0.is_empty()) {
            emitter.poll(source, sink, ms(t));
            t += 1;
            assert!(t < start + 10_000, "emitter did not settle");
        }
        t
    }

    #[test]
    fn test_press_then_release_after_hold() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[Event::key_press(0x04, Modifiers::NONE)]);
        let mut sink = MockSink::default();

        assert!(emitter.poll(&mut source, &mut sink, ms(0)));
        assert_eq!(sink.sent, [kbd(0x04, Modifiers::NONE)]);
        assert!(matches!(emitter.stage(HidInterface::Keyboard), Stage::PressSent { .. }));

        // Hold not yet elapsed
        assert!(!emitter.poll(&mut source, &mut sink, ms(1)));
        assert_eq!(sink.sent.len(), 1);

        assert!(emitter.poll(&mut source, &mut sink, ms(2)));
        assert_eq!(sink.sent, [kbd(0x04, Modifiers::NONE), kbd_up()]);
        assert_eq!(
            emitter.stage(HidInterface::Keyboard),
            Stage::Idle { released_at: Some(ms(2)) }
        );
    }

    #[test]
    fn test_never_two_presses_without_release() {
        let events: Vec<Event> = (4..12).map(|c| Event::key_press(c, Modifiers::NONE)).collect();
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&events);
        let mut sink = MockSink::default();

        run(&mut emitter, &mut source, &mut sink, 0);

        assert_eq!(sink.sent.len(), 16);
        for pair in sink.sent.chunks(2) {
            assert!(!pair[0].is_release());
            assert!(pair[1].is_release());
        }
    }

    #[test]
    fn test_release_gap_before_next_press() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[
            Event::key_press(0x04, Modifiers::NONE),
            Event::key_press(0x05, Modifiers::NONE),
        ]);
        let mut sink = MockSink::default();

        emitter.poll(&mut source, &mut sink, ms(0));
        emitter.poll(&mut source, &mut sink, ms(2));
        assert_eq!(sink.sent.len(), 2);

        // Released at 2 ms, second press must wait until 4 ms
        emitter.poll(&mut source, &mut sink, ms(3));
        assert_eq!(sink.sent.len(), 2);
        emitter.poll(&mut source, &mut sink, ms(4));
        assert_eq!(sink.sent[2], kbd(0x05, Modifiers::NONE));
    }

    #[test]
    fn test_noop_is_never_sent() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[
            Event::key_press(0, Modifiers::LEFT_SHIFT),
            Event::key_press(0, Modifiers::NONE),
        ]);
        let mut sink = MockSink::default();

        assert!(!emitter.poll(&mut source, &mut sink, ms(0)));
        assert!(sink.sent.is_empty());
        assert_eq!(emitter.stats().noops, 2);
        assert!(emitter.is_idle());
    }

    #[test]
    fn test_not_ready_retains_event() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[Event::key_press(0x04, Modifiers::NONE)]);
        let mut sink = MockSink {
            not_ready: [true, true],
            ..Default::default()
        };

        for t in 0..50 {
            assert!(!emitter.poll(&mut source, &mut sink, ms(t)));
        }
        assert_eq!(emitter.pending(), Some(Event::key_press(0x04, Modifiers::NONE)));

        sink.not_ready = [false, false];
        assert!(emitter.poll(&mut source, &mut sink, ms(50)));
        assert_eq!(sink.sent, [kbd(0x04, Modifiers::NONE)]);
    }

    #[test]
    fn test_release_waits_for_ready_endpoint() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[Event::key_press(0x04, Modifiers::NONE)]);
        let mut sink = MockSink::default();

        emitter.poll(&mut source, &mut sink, ms(0));
        sink.not_ready[HidInterface::Keyboard.index()] = true;
        emitter.poll(&mut source, &mut sink, ms(10));
        assert!(matches!(emitter.stage(HidInterface::Keyboard), Stage::PressSent { .. }));

        sink.not_ready[HidInterface::Keyboard.index()] = false;
        emitter.poll(&mut source, &mut sink, ms(11));
        assert_eq!(sink.sent, [kbd(0x04, Modifiers::NONE), kbd_up()]);
    }

    #[test]
    fn test_send_error_is_retried() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[Event::consumer(Phase::Press, 0x00E9)]);
        let mut sink = MockSink {
            fail_next: true,
            ..Default::default()
        };

        assert!(!emitter.poll(&mut source, &mut sink, ms(0)));
        assert_eq!(emitter.stats().retries, 1);
        assert!(emitter.poll(&mut source, &mut sink, ms(1)));
        assert_eq!(
            sink.sent,
            [Report::Aux(AuxReport::new(REPORT_ID_CONSUMER, 0x00E9))]
        );
    }

    #[test]
    fn test_explicit_release_coalesces_with_held_press() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[
            Event::keyboard(Phase::Press, 0x04, Modifiers::NONE, KeyFlags::NONE),
            Event::keyboard(Phase::Release, 0x00, Modifiers::NONE, KeyFlags::NONE),
        ]);
        let mut sink = MockSink::default();

        emitter.poll(&mut source, &mut sink, ms(0));
        emitter.poll(&mut source, &mut sink, ms(0));
        assert_eq!(sink.sent, [kbd(0x04, Modifiers::NONE), kbd_up()]);
        assert!(emitter.is_idle());

        // Nothing else owed
        emitter.poll(&mut source, &mut sink, ms(10));
        assert_eq!(sink.sent.len(), 2);
    }

    #[test]
    fn test_explicit_release_on_idle_interface_is_immediate() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[Event::consumer(Phase::Release, 0x00E9)]);
        let mut sink = MockSink::default();

        assert!(emitter.poll(&mut source, &mut sink, ms(0)));
        assert_eq!(sink.sent, [Report::Aux(AuxReport::new(REPORT_ID_CONSUMER, 0))]);
        assert!(matches!(emitter.stage(HidInterface::Auxiliary), Stage::Idle { .. }));
    }

    #[test]
    fn test_release_for_other_report_id_waits() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[
            Event::consumer(Phase::Press, 0x00CD),
            Event::vendor(Phase::Release, 0x0001),
        ]);
        let mut sink = MockSink::default();

        emitter.poll(&mut source, &mut sink, ms(0));
        emitter.poll(&mut source, &mut sink, ms(1));
        assert_eq!(sink.sent.len(), 1);

        emitter.poll(&mut source, &mut sink, ms(2));
        assert_eq!(
            sink.sent,
            [
                Report::Aux(AuxReport::new(REPORT_ID_CONSUMER, 0x00CD)),
                Report::Aux(AuxReport::new(REPORT_ID_CONSUMER, 0)),
                Report::Aux(AuxReport::new(REPORT_ID_VENDOR, 0)),
            ]
        );
    }

    #[test]
    fn test_interfaces_keep_wire_order() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[
            Event::key_press(0x04, Modifiers::NONE),
            Event::consumer(Phase::Press, 0x00E9),
        ]);
        let mut sink = MockSink::default();

        run(&mut emitter, &mut source, &mut sink, 0);

        let presses: Vec<_> = sink.sent.iter().filter(|r| !r.is_release()).collect();
        assert_eq!(presses.len(), 2);
        assert_eq!(presses[0].interface(), HidInterface::Keyboard);
        assert_eq!(presses[1].interface(), HidInterface::Auxiliary);
    }

    #[test]
    fn test_zero_usage_press_still_paced_by_stage() {
        let mut emitter = Emitter::new(&Config::DEFAULT);
        let mut source = MockSource::new(&[Event::consumer(Phase::Press, 0)]);
        let mut sink = MockSink::default();

        // Same bytes as a key-up, but the stage shows it as a held press
        emitter.poll(&mut source, &mut sink, ms(0));
        assert!(matches!(
            emitter.stage(HidInterface::Auxiliary),
            Stage::PressSent { .. }
        ));
        assert_eq!(emitter.stats().presses, 1);

        run(&mut emitter, &mut source, &mut sink, 1);
        assert_eq!(emitter.stats().releases, 1);
        assert_eq!(sink.sent.len(), 2);
    }
}
