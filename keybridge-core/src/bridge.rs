//! KeyBridge: the whole pipeline in one execution context.

use embassy_time::Instant;
use keybridge_proto::WireFormat;

use crate::config::Config;
use crate::diag::Diagnostics;
use crate::emitter::Emitter;
use crate::ingress::Ingress;
use crate::output::ReportSink;
use crate::queue::{split, EventConsumer, EventQueue};
use crate::supervisor::Heartbeat;

/// A bridge that turns serial bytes into HID reports on a report sink.
///
/// Bytes go in through [`KeyBridge::ingest`]; [`KeyBridge::service`] is
/// called once per loop iteration to emit whatever reports are due. Neither
/// ever blocks, so the caller's loop stays bounded.
pub struct KeyBridge<'a, O, const N: usize> {
    ingress: Ingress<'a, N>,
    events: EventConsumer<'a, N>,
    emitter: Emitter,
    output: O,
    heartbeat: Option<&'a Heartbeat>,
}

impl<'a, O: ReportSink, const N: usize> KeyBridge<'a, O, N> {
    /// Create a bridge over `queue` that emits to `output`.
    pub fn new(
        queue: &'a mut EventQueue<N>,
        format: WireFormat,
        output: O,
        config: &Config,
        log: &'a dyn Diagnostics,
    ) -> Self {
        let (producer, events) = split(queue);
        Self {
            ingress: Ingress::new(format, producer, config, log),
            events,
            emitter: Emitter::new(config),
            output,
            heartbeat: None,
        }
    }

    /// Stamp `heartbeat` on every [`KeyBridge::service`] call.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: &'a Heartbeat) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    /// Decode and queue bytes received at `now`.
    pub fn ingest(&mut self, bytes: &[u8], now: Instant) -> usize {
        self.ingress.receive(bytes, now)
    }

    /// One loop iteration: heartbeat, stale-fragment check, report emission.
    ///
    /// Returns `true` if a report was sent.
    pub fn service(&mut self, now: Instant) -> bool {
        if let Some(hb) = self.heartbeat {
            hb.beat(now);
        }
        self.ingress.poll_timeout(now);
        self.emitter.poll(&mut self.events, &mut self.output, now)
    }

    /// Bytes that may be read from the link right now.
    pub fn read_budget(&self) -> usize {
        self.ingress.read_budget()
    }

    /// Forward serial peer connect/disconnect.
    pub fn set_link_state(&mut self, up: bool) {
        self.ingress.set_link_state(up)
    }

    pub fn ingress(&self) -> &Ingress<'a, N> {
        &self.ingress
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Get a reference to the report sink.
    pub fn output(&self) -> &O {
        &self.output
    }

    /// Get a mutable reference to the report sink.
    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use keybridge_proto::{HidInterface, KeyboardReport, Report};

    use super::*;
    use crate::diag::LogChannel;
    use crate::output::OutputError;

    #[derive(Default)]
    struct MockOutput {
        sent: Vec<Report>,
        ready: bool,
    }

    impl ReportSink for MockOutput {
        fn is_ready(&self, _interface: HidInterface) -> bool {
            self.ready
        }

        fn try_send(&mut self, report: &Report) -> Result<(), OutputError> {
            self.sent.push(*report);
            Ok(())
        }
    }

    fn ms(n: u64) -> Instant {
        Instant::from_millis(n)
    }

    #[test]
    fn test_bridge_forwards_key() {
        let log: LogChannel<NoopRawMutex, 1024> = LogChannel::new();
        let mut queue: EventQueue<8> = EventQueue::new();
        let output = MockOutput {
            ready: true,
            ..Default::default()
        };
        let mut bridge = KeyBridge::new(&mut queue, WireFormat::Compact, output, &Config::DEFAULT, &log);

        bridge.ingest(&[0x04, 0x00], ms(0));
        for t in 0..5 {
            bridge.service(ms(t));
        }

        assert_eq!(
            bridge.output().sent,
            [
                Report::Keyboard(KeyboardReport::single(0x04, 0, 0)),
                Report::Keyboard(KeyboardReport::empty()),
            ]
        );
    }

    #[test]
    fn test_events_wait_for_enumeration() {
        let log: LogChannel<NoopRawMutex, 1024> = LogChannel::new();
        let mut queue: EventQueue<8> = EventQueue::new();
        let mut bridge =
            KeyBridge::new(&mut queue, WireFormat::Compact, MockOutput::default(), &Config::DEFAULT, &log);

        bridge.ingest(&[0x04, 0x00, 0x05, 0x00], ms(0));
        for t in 0..100 {
            assert!(!bridge.service(ms(t)));
        }
        assert!(bridge.output().sent.is_empty());

        bridge.output_mut().ready = true;
        for t in 100..120 {
            bridge.service(ms(t));
        }
        assert_eq!(bridge.output().sent.len(), 4);
    }

    #[test]
    fn test_service_beats_heartbeat() {
        let log: LogChannel<NoopRawMutex, 1024> = LogChannel::new();
        let hb = Heartbeat::new("bridge");
        let mut queue: EventQueue<8> = EventQueue::new();
        let mut bridge =
            KeyBridge::new(&mut queue, WireFormat::Extended, MockOutput::default(), &Config::DEFAULT, &log)
                .with_heartbeat(&hb);

        assert_eq!(hb.last_seen(), None);
        bridge.service(ms(42));
        assert_eq!(hb.last_seen(), Some(ms(42)));
    }
}
