//! Bounded event queue with drop-newest overflow.
//!
//! A single-producer/single-consumer ring from `heapless`. The producer half
//! lives with the decoder, the consumer half with the emitter; index updates
//! are published with acquire/release ordering so neither side needs a lock.
//!
//! When the ring is full the event being pushed is discarded and counted.
//! Events already queued are never evicted, so everything that does get
//! through keeps wire order.

use heapless::spsc::{Consumer, Producer, Queue};
use keybridge_proto::Event;

/// Backing storage for the event queue.
///
/// `heapless` reserves one slot to tell full from empty, so the usable
/// capacity is `N - 1`.
pub type EventQueue<const N: usize> = Queue<Event, N>;

/// Anything the emitter can pull events from.
pub trait EventSource {
    /// Take the next event, if any.
    fn next_event(&mut self) -> Option<Event>;
}

impl<T: EventSource + ?Sized> EventSource for &mut T {
    fn next_event(&mut self) -> Option<Event> {
        (**self).next_event()
    }
}

/// Split `queue` into its producer and consumer halves.
pub fn split<const N: usize>(
    queue: &mut EventQueue<N>,
) -> (EventProducer<'_, N>, EventConsumer<'_, N>) {
    let (producer, consumer) = queue.split();
    (
        EventProducer {
            inner: producer,
            dropped: 0,
        },
        EventConsumer { inner: consumer },
    )
}

/// Producing half, owned by the ingress context.
pub struct EventProducer<'a, const N: usize> {
    inner: Producer<'a, Event>,
    dropped: u32,
}

impl<const N: usize> EventProducer<'_, N> {
    /// Enqueue `event`.
    ///
    /// Returns `false` if the queue was full; the event is discarded and the
    /// drop counter incremented.
    pub fn push(&mut self, event: Event) -> bool {
        match self.inner.enqueue(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped = self.dropped.wrapping_add(1);
                false
            }
        }
    }

    /// Slots currently free.
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.inner.capacity() - self.inner.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Total events discarded because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

/// Consuming half, owned by the emission context.
pub struct EventConsumer<'a, const N: usize> {
    inner: Consumer<'a, Event>,
}

impl<const N: usize> EventConsumer<'_, N> {
    pub fn pop(&mut self) -> Option<Event> {
        self.inner.dequeue()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

impl<const N: usize> EventSource for EventConsumer<'_, N> {
    fn next_event(&mut self) -> Option<Event> {
        self.pop()
    }
}
