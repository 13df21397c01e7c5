//! Inter-core word FIFO.
//!
//! A small static channel shared by both cores. The critical section
//! implementation on RP2040 takes a hardware spinlock, so the channel is
//! safe across cores.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use keybridge_core::{FifoRx, FifoTx, FIFO_DEPTH};

pub type WordChannel = Channel<CriticalSectionRawMutex, u32, FIFO_DEPTH>;

static EVENT_WORDS: WordChannel = Channel::new();

/// Core 0 side.
pub struct CoreFifoTx;

/// Core 1 side.
pub struct CoreFifoRx;

impl FifoTx for CoreFifoTx {
    fn try_push(&mut self, word: u32) -> bool {
        EVENT_WORDS.try_send(word).is_ok()
    }
}

impl FifoRx for CoreFifoRx {
    fn try_pop(&mut self) -> Option<u32> {
        EVENT_WORDS.try_receive().ok()
    }
}
