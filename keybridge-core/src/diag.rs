//! Diagnostic log channel.
//!
//! Text lines for whoever is on the other end of the serial link. Any
//! context may write; one flush path drains the ring into the link, and only
//! while the link is open. Bytes that do not fit are counted, and once the
//! backlog drains a single overflow notice reports how many were lost.
//!
//! ```text
//! any context           LogChannel              flush task
//! ───────────           ──────────              ──────────
//! diag_info!() ──lock──▶ [ring, N bytes] ──lock──▶ LogLink (UART TX)
//!                        dropped: u32
//! ```
//!
//! The lock is held only across the byte copy, never across link I/O.

use core::cell::RefCell;
use core::fmt::{self, Write as _};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::String;
use portable_atomic::{AtomicU8, Ordering};

use crate::config::{LOG_BUFFER_SIZE, LOG_LINE_MAX};

/// Bytes moved per flush step.
const FLUSH_CHUNK: usize = 64;

/// Diagnostic line severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl Level {
    /// Line prefix, including the trailing separator.
    pub const fn prefix(self) -> &'static str {
        match self {
            Level::Error => "ERROR: ",
            Level::Warn => "WARN: ",
            Level::Info => "INFO: ",
            Level::Debug => "DEBUG: ",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            _ => Level::Debug,
        }
    }
}

/// Something components can narrate to.
pub trait Diagnostics {
    /// Whether lines at `level` are currently kept.
    fn enabled(&self, level: Level) -> bool;

    /// Append one formatted line at `level`.
    fn line(&self, level: Level, args: fmt::Arguments<'_>);
}

/// Transmit side of the serial link, as seen by the flush path.
pub trait LogLink {
    /// True once a peer has opened the link.
    fn is_ready(&self) -> bool;

    /// Bytes the link can take without blocking.
    fn write_available(&self) -> usize;

    /// Write up to `bytes.len()` bytes, returning how many were taken.
    fn write(&mut self, bytes: &[u8]) -> usize;
}

struct Ring<const N: usize> {
    buf: [u8; N],
    head: usize,
    len: usize,
    dropped: u32,
}

impl<const N: usize> Ring<N> {
    const fn new() -> Self {
        Self {
            buf: [0; N],
            head: 0,
            len: 0,
            dropped: 0,
        }
    }

    /// Store all of `data` or none of it.
    fn push(&mut self, data: &[u8]) {
        if data.len() > N - self.len {
            self.dropped = self.dropped.saturating_add(data.len() as u32);
            return;
        }

        let mut tail = (self.head + self.len) % N;
        for &b in data {
            self.buf[tail] = b;
            tail = (tail + 1) % N;
        }
        self.len += data.len();
    }

    fn pop(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.len);
        for slot in &mut out[..count] {
            *slot = self.buf[self.head];
            self.head = (self.head + 1) % N;
        }
        self.len -= count;
        count
    }
}

/// Bounded multi-writer log ring.
pub struct LogChannel<M: RawMutex, const N: usize = LOG_BUFFER_SIZE> {
    ring: Mutex<M, RefCell<Ring<N>>>,
    min_level: AtomicU8,
}

impl<M: RawMutex, const N: usize> LogChannel<M, N> {
    /// Empty channel keeping everything up to `Debug`.
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(Ring::new())),
            min_level: AtomicU8::new(Level::Debug as u8),
        }
    }

    /// Keep only lines at `level` or more severe.
    pub fn set_level(&self, level: Level) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.min_level.load(Ordering::Relaxed))
    }

    /// Append raw bytes as one unit.
    ///
    /// If they do not all fit, none are stored and every byte is counted as
    /// dropped, so the link never sees a partial line.
    pub fn write(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.ring.lock(|ring| ring.borrow_mut().push(data));
    }

    /// Format one CRLF-terminated line with its level prefix.
    ///
    /// Lines longer than the line limit are truncated.
    pub fn line(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        let mut line = LineBuf(String::new());
        let _ = line.write_str(level.prefix());
        let _ = line.write_fmt(args);
        let _ = line.0.push_str("\r\n");
        self.write(line.0.as_bytes());
    }

    /// Move up to `out.len()` buffered bytes into `out`.
    pub fn pop_chunk(&self, out: &mut [u8]) -> usize {
        self.ring.lock(|ring| ring.borrow_mut().pop(out))
    }

    /// Bytes waiting to be flushed.
    pub fn len(&self) -> usize {
        self.ring.lock(|ring| ring.borrow().len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes lost to overflow and not yet reported.
    pub fn dropped_bytes(&self) -> u32 {
        self.ring.lock(|ring| ring.borrow().dropped)
    }

    /// Drain as much as `link` can take right now.
    ///
    /// Does nothing until the link is ready. After the backlog, writes the
    /// overflow notice if anything was dropped and the whole notice fits;
    /// otherwise the notice is retried on the next flush. Returns bytes
    /// written to the link.
    pub fn flush<L: LogLink + ?Sized>(&self, link: &mut L) -> usize {
        if !link.is_ready() {
            return 0;
        }

        let dropped = self.dropped_bytes();
        let mut written = 0;
        let mut chunk = [0u8; FLUSH_CHUNK];
        loop {
            let available = link.write_available().min(FLUSH_CHUNK);
            if available == 0 {
                break;
            }
            let count = self.pop_chunk(&mut chunk[..available]);
            if count == 0 {
                break;
            }
            written += link.write(&chunk[..count]);
        }

        if dropped > 0 {
            let mut notice: String<64> = String::new();
            let _ = write!(notice, "WARN: log buffer overflow ({} bytes dropped)\r\n", dropped);
            if link.write_available() >= notice.len() {
                written += link.write(notice.as_bytes());
                self.ring.lock(|ring| {
                    let mut ring = ring.borrow_mut();
                    ring.dropped = ring.dropped.saturating_sub(dropped);
                });
            }
        }
        written
    }
}

impl<M: RawMutex, const N: usize> Default for LogChannel<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> Diagnostics for LogChannel<M, N> {
    fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.min_level.load(Ordering::Relaxed)
    }

    fn line(&self, level: Level, args: fmt::Arguments<'_>) {
        LogChannel::line(self, level, args)
    }
}

/// Truncating line formatter that always leaves room for CRLF.
struct LineBuf(String<LOG_LINE_MAX>);

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.len() + c.len_utf8() > LOG_LINE_MAX - 2 {
                break;
            }
            let _ = self.0.push(c);
        }
        Ok(())
    }
}

/// Write a diagnostic line at an explicit level.
///
/// # Example
///
/// ```ignore
/// diag!(log, Level::Info, "queue depth {}", depth);
/// ```
#[macro_export]
macro_rules! diag {
    ($log:expr, $level:expr, $($arg:tt)*) => {
        $crate::diag::Diagnostics::line($log, $level, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! diag_error {
    ($log:expr, $($arg:tt)*) => {
        $crate::diag!($log, $crate::diag::Level::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! diag_warn {
    ($log:expr, $($arg:tt)*) => {
        $crate::diag!($log, $crate::diag::Level::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! diag_info {
    ($log:expr, $($arg:tt)*) => {
        $crate::diag!($log, $crate::diag::Level::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! diag_debug {
    ($log:expr, $($arg:tt)*) => {
        $crate::diag!($log, $crate::diag::Level::Debug, $($arg)*)
    };
}
