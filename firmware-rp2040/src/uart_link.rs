//! Serial link plumbing.
//!
//! # Pins
//!
//! Uses UART1:
//! - GPIO 8: TX (diagnostic text to the host)
//! - GPIO 9: RX (key packets from the host)
//!
//! The RX side is read one byte at a time by the ingress loop. The TX side
//! carries only diagnostic lines, and only after the peer has shown it is
//! there by sending something; before that, lines wait in the log ring.

use embassy_rp::uart::{Async, UartTx};
use heapless::Vec;
use keybridge_core::LogLink;
use portable_atomic::{AtomicBool, Ordering};

/// Staging buffer size for one UART write.
pub const TX_CHUNK: usize = 64;

static LINK_READY: AtomicBool = AtomicBool::new(false);

/// Mark the link as opened by a peer.
pub fn mark_link_ready() {
    if !LINK_READY.swap(true, Ordering::AcqRel) {
        defmt::info!("serial peer detected, log output enabled");
    }
}

/// Mark the peer as gone; logs wait in the ring until it is back.
pub fn mark_link_down() {
    if LINK_READY.swap(false, Ordering::AcqRel) {
        defmt::warn!("serial break, log output paused");
    }
}

pub fn link_ready() -> bool {
    LINK_READY.load(Ordering::Acquire)
}

/// [`LogLink`] that stages bytes for the next async UART write.
pub struct UartLogLink {
    tx: UartTx<'static, Async>,
    staged: Vec<u8, TX_CHUNK>,
}

impl UartLogLink {
    pub fn new(tx: UartTx<'static, Async>) -> Self {
        Self {
            tx,
            staged: Vec::new(),
        }
    }

    /// Write out whatever the last flush staged.
    pub async fn drain(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        if let Err(e) = self.tx.write(&self.staged).await {
            defmt::warn!("UART TX error: {}", e);
        }
        self.staged.clear();
    }

    pub fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }
}

impl LogLink for UartLogLink {
    fn is_ready(&self) -> bool {
        link_ready()
    }

    fn write_available(&self) -> usize {
        self.staged.capacity() - self.staged.len()
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.write_available());
        // Cannot fail: n is bounded by the remaining capacity
        let _ = self.staged.extend_from_slice(&bytes[..n]);
        n
    }
}
