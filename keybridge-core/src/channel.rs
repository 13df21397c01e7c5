//! Cross-context event channel.
//!
//! When emission runs in its own execution context the two sides share only
//! a small word FIFO. The ingress side packs each event into one `u32` with
//! [`Event::to_word`] and pushes it; the emission side pops and unpacks.
//!
//! A push that cannot complete within the configured timeout drops the
//! event, the same way a full queue does. Retrying it later would let newer
//! events overtake it.

use embassy_time::Instant;
use keybridge_proto::Event;

use crate::config::Config;
use crate::diag::Diagnostics;
use crate::queue::EventSource;

/// Sending half of a word FIFO.
pub trait FifoTx {
    /// Push `word` if there is room right now.
    fn try_push(&mut self, word: u32) -> bool;
}

/// Receiving half of a word FIFO.
pub trait FifoRx {
    fn try_pop(&mut self) -> Option<u32>;
}

impl<T: FifoTx + ?Sized> FifoTx for &mut T {
    fn try_push(&mut self, word: u32) -> bool {
        (**self).try_push(word)
    }
}

impl<T: FifoRx + ?Sized> FifoRx for &mut T {
    fn try_pop(&mut self) -> Option<u32> {
        (**self).try_pop()
    }
}

/// Sender statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelStats {
    /// Words accepted by the FIFO.
    pub sent: u32,
    /// Events dropped after the push timeout.
    pub dropped: u32,
}

/// Moves events from a local source into the FIFO.
pub struct CrossContextSender<'a> {
    pending: Option<(u32, Instant)>,
    config: Config,
    stats: ChannelStats,
    log: &'a dyn Diagnostics,
}

impl<'a> CrossContextSender<'a> {
    pub fn new(config: &Config, log: &'a dyn Diagnostics) -> Self {
        Self {
            pending: None,
            config: *config,
            stats: ChannelStats::default(),
            log,
        }
    }

    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// True while a word is waiting for FIFO room.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.pending.is_some()
    }

    /// Push as many events as the FIFO takes right now.
    ///
    /// A word the FIFO refuses is kept and retried on later polls until the
    /// push timeout runs out, then dropped. Returns the number of words
    /// pushed by this call.
    pub fn poll<S, F>(&mut self, source: &mut S, fifo: &mut F, now: Instant) -> usize
    where
        S: EventSource + ?Sized,
        F: FifoTx + ?Sized,
    {
        let mut pushed = 0;
        loop {
            let (word, since) = match self.pending {
                Some(p) => p,
                None => match source.next_event() {
                    Some(event) => (event.to_word(), now),
                    None => break,
                },
            };

            if fifo.try_push(word) {
                self.pending = None;
                self.stats.sent = self.stats.sent.wrapping_add(1);
                pushed += 1;
                continue;
            }

            if now.saturating_duration_since(since) >= self.config.fifo_push_timeout {
                self.pending = None;
                self.stats.dropped = self.stats.dropped.wrapping_add(1);
                if self.config.should_log_drop(self.stats.dropped) {
                    crate::diag_warn!(
                        self.log,
                        "fifo push timeout, dropped {} events",
                        self.stats.dropped
                    );
                }
            } else {
                self.pending = Some((word, since));
            }
            break;
        }
        pushed
    }
}

/// Emission-side adapter: unpacks FIFO words into events.
pub struct FifoEventSource<F> {
    fifo: F,
    invalid: u32,
}

impl<F: FifoRx> FifoEventSource<F> {
    pub const fn new(fifo: F) -> Self {
        Self { fifo, invalid: 0 }
    }

    /// Words discarded because they named no known event kind.
    #[must_use]
    pub fn invalid(&self) -> u32 {
        self.invalid
    }
}

impl<F: FifoRx> EventSource for FifoEventSource<F> {
    fn next_event(&mut self) -> Option<Event> {
        loop {
            let word = self.fifo.try_pop()?;
            match Event::from_word(word) {
                Some(event) => return Some(event),
                None => {
                    self.invalid = self.invalid.wrapping_add(1);
                    trace!("fifo: discarded invalid word {}", word);
                }
            }
        }
    }
}
