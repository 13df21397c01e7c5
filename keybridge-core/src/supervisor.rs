//! Liveness-gated watchdog supervision.
//!
//! Every execution context owns a [`Heartbeat`] and stamps it once per loop
//! iteration. The [`Supervisor`] runs in the context that owns the hardware
//! watchdog and pets it only while every heartbeat is fresh. A wedged
//! context therefore turns into a hardware reset after at most the watchdog
//! timeout, without the wedged code having to notice anything.
//!
//! ```text
//! Booting ──all beating──▶ Running ──one silent > window──▶ Stalled ──timeout──▶ reset
//!    │                                                         ▲
//!    └──────────────── no first beat within boot grace ────────┘
//! ```

use embassy_time::{Duration, Instant};
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::Config;
use crate::diag::Diagnostics;

/// Hardware (or simulated) reset timer.
pub trait WatchdogTimer {
    /// Arm the timer.
    fn start(&mut self, timeout: Duration);

    /// Restart the countdown.
    fn pet(&mut self);
}

impl<T: WatchdogTimer + ?Sized> WatchdogTimer for &mut T {
    fn start(&mut self, timeout: Duration) {
        (**self).start(timeout)
    }

    fn pet(&mut self) {
        (**self).pet()
    }
}

/// Per-context "last seen" stamp, shareable across cores.
pub struct Heartbeat {
    name: &'static str,
    last_seen: AtomicU64,
    started: AtomicBool,
}

impl Heartbeat {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            last_seen: AtomicU64::new(0),
            started: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Record that the owning context is alive at `now`.
    pub fn beat(&self, now: Instant) {
        self.last_seen.store(now.as_ticks(), Ordering::Release);
        self.started.store(true, Ordering::Release);
    }

    /// When the context last beat, or `None` if it never has.
    pub fn last_seen(&self) -> Option<Instant> {
        if !self.started.load(Ordering::Acquire) {
            return None;
        }
        Some(Instant::from_ticks(self.last_seen.load(Ordering::Acquire)))
    }
}

/// Supervisor health summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorState {
    /// Some context has not beaten yet but is still inside its boot grace.
    Booting,
    /// Every context is beating.
    Running,
    /// A context went silent; the watchdog is no longer petted.
    Stalled,
}

/// Pets the watchdog only while every supervised context is alive.
pub struct Supervisor<'a, W> {
    timer: W,
    contexts: &'a [&'a Heartbeat],
    liveness_window: Duration,
    boot_grace: Duration,
    booted_at: Instant,
    state: SupervisorState,
    pets: u32,
    log: &'a dyn Diagnostics,
}

impl<'a, W: WatchdogTimer> Supervisor<'a, W> {
    /// Arm `timer` and start supervising `contexts`, booted at `now`.
    pub fn new(
        mut timer: W,
        contexts: &'a [&'a Heartbeat],
        config: &Config,
        now: Instant,
        log: &'a dyn Diagnostics,
    ) -> Self {
        timer.start(config.watchdog_timeout);
        Self {
            timer,
            contexts,
            liveness_window: config.liveness_window,
            boot_grace: config.boot_grace,
            booted_at: now,
            state: SupervisorState::Booting,
            pets: 0,
            log,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// How many times the watchdog has been petted.
    pub fn pets(&self) -> u32 {
        self.pets
    }

    pub fn timer(&self) -> &W {
        &self.timer
    }

    /// Check every context and pet the watchdog if all are healthy.
    pub fn poll(&mut self, now: Instant) -> SupervisorState {
        let mut booting = false;
        let mut stalled: Option<&'static str> = None;

        for hb in self.contexts {
            match hb.last_seen() {
                None if now.saturating_duration_since(self.booted_at) <= self.boot_grace => {
                    booting = true;
                }
                None => {
                    stalled.get_or_insert(hb.name());
                }
                Some(seen) => {
                    if now.saturating_duration_since(seen) > self.liveness_window {
                        stalled.get_or_insert(hb.name());
                    }
                }
            }
        }

        let next = match (stalled, booting) {
            (Some(_), _) => SupervisorState::Stalled,
            (None, true) => SupervisorState::Booting,
            (None, false) => SupervisorState::Running,
        };

        if next != SupervisorState::Stalled {
            self.timer.pet();
            self.pets = self.pets.wrapping_add(1);
        }

        if next != self.state {
            match (self.state, next, stalled) {
                (_, SupervisorState::Stalled, Some(name)) => {
                    crate::diag_error!(self.log, "{} context stalled, withholding watchdog", name);
                    error!("supervisor: context stalled");
                }
                (SupervisorState::Stalled, _, _) => {
                    crate::diag_warn!(self.log, "all contexts alive again");
                }
                (SupervisorState::Booting, SupervisorState::Running, _) => {
                    crate::diag_info!(self.log, "all contexts running");
                }
                _ => {}
            }
            self.state = next;
        }

        next
    }
}
