//! Audio-driven session clock
//!
//! The clock is a `(pts, host_time, rate)` triple updated every time the audio
//! output consumes a frame. Between updates it extrapolates:
//!
//! ```text
//! now = pts + (host_now - host_time) * rate      (running)
//! now = pts                                      (paused)
//! ```
//!
//! ## Concurrency
//!
//! Writers are the audio output callback (`on_frame_consumed`) and the
//! playback engine (`pause`, `resume`, `reset`, `set_rate`). Readers are the
//! presentation task and diagnostics. Fields live in atomics guarded by a
//! sequence counter:
//! - writers make the counter odd, store, then make it even again
//! - readers retry while the counter is odd or changed during the read
//!
//! so no reader ever sees a `pts` paired with another update's host time.
//! Writers exclude each other by claiming the odd counter value with a CAS;
//! a write is a handful of stores, so contention is a few spins at most.
//!
//! Reads are also clamped to never go backwards within one seek epoch: if the
//! device pulls late and the next frame's pts lands behind the extrapolated
//! value, readers keep returning the highest value seen until the clock
//! catches up.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use vfp_common::timing::nanos_to_secs;

/// Source of monotonic host time in nanoseconds
pub trait HostClock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Host time measured from an `Instant` captured at construction
#[derive(Debug, Clone)]
pub struct SystemHostClock {
    origin: Instant,
}

impl SystemHostClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemHostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock for SystemHostClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Host time advanced explicitly; used to drive the pipeline deterministically
#[derive(Debug, Default)]
pub struct ManualHostClock {
    now_ns: AtomicU64,
}

impl ManualHostClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ns(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.fetch_add(nanos, Ordering::AcqRel);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(vfp_common::timing::secs_to_duration(secs));
    }
}

impl HostClock for ManualHostClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Acquire)
    }
}

/// Consistent view of the clock fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClockSnapshot {
    /// Stream time at `host_ns`
    pub pts: f64,
    pub host_ns: u64,
    pub rate: f64,
    pub running: bool,
    /// Advanced by every reset
    pub epoch: u64,
}

impl ClockSnapshot {
    /// Extrapolated stream time at `host_now`; never extrapolates backwards
    pub fn time_at(&self, host_now: u64) -> f64 {
        if !self.running {
            return self.pts;
        }
        let elapsed = nanos_to_secs(host_now.saturating_sub(self.host_ns));
        self.pts + elapsed * self.rate
    }
}

/// Highest value handed out to readers in the current epoch
struct ReadFloor {
    epoch: u64,
    value: f64,
}

/// Session clock derived from audio consumption
pub struct AudioClock {
    seq: AtomicU64,
    pts_bits: AtomicU64,
    host_ns: AtomicU64,
    rate_bits: AtomicU64,
    running: AtomicU64,
    epoch: AtomicU64,
    floor: Mutex<ReadFloor>,
}

impl std::fmt::Debug for AudioClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioClock")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock {
    /// Stopped clock at zero, rate 1.0
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            pts_bits: AtomicU64::new(0f64.to_bits()),
            host_ns: AtomicU64::new(0),
            rate_bits: AtomicU64::new(1f64.to_bits()),
            running: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            floor: Mutex::new(ReadFloor {
                epoch: 0,
                value: 0.0,
            }),
        }
    }

    /// Audio output consumed a frame with `frame_pts` at `host_now`.
    ///
    /// Lock-free apart from writer exclusion; called from the output callback.
    pub fn on_frame_consumed(&self, frame_pts: f64, host_now: u64) {
        if !frame_pts.is_finite() {
            return;
        }
        self.write(|current| ClockSnapshot {
            pts: frame_pts,
            host_ns: host_now,
            ..current
        });
    }

    /// Current stream time.
    ///
    /// Successive reads within one epoch never decrease.
    pub fn current_time(&self, host_now: u64) -> f64 {
        let snapshot = self.snapshot();
        let value = snapshot.time_at(host_now);

        let mut floor = self.floor.lock();
        if snapshot.epoch > floor.epoch {
            floor.epoch = snapshot.epoch;
            floor.value = value;
            value
        } else if snapshot.epoch == floor.epoch {
            floor.value = floor.value.max(value);
            floor.value
        } else {
            // Read overlapped a reset; report the raw value
            value
        }
    }

    /// Freeze the clock at its current value
    pub fn pause(&self, host_now: u64) {
        self.write(|current| ClockSnapshot {
            pts: current.time_at(host_now),
            host_ns: host_now,
            running: false,
            ..current
        });
    }

    /// Restart extrapolation from the frozen value
    pub fn resume(&self, host_now: u64) {
        self.write(|current| ClockSnapshot {
            pts: current.time_at(host_now),
            host_ns: host_now,
            running: true,
            ..current
        });
    }

    /// Jump to `target` (seek). Starts a new monotonic epoch; running state is kept.
    pub fn reset(&self, target: f64, host_now: u64) -> Result<()> {
        if !target.is_finite() || target < 0.0 {
            return Err(Error::InvalidInput(format!(
                "clock target must be finite and non-negative (got {})",
                target
            )));
        }
        self.write(|current| ClockSnapshot {
            pts: target,
            host_ns: host_now,
            epoch: current.epoch.wrapping_add(1),
            ..current
        });
        Ok(())
    }

    /// Change the playback rate, rebasing at `host_now` so time stays continuous
    pub fn set_rate(&self, rate: f64, host_now: u64) -> Result<()> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(Error::InvalidInput(format!(
                "clock rate must be finite and non-negative (got {})",
                rate
            )));
        }
        self.write(|current| ClockSnapshot {
            pts: current.time_at(host_now),
            host_ns: host_now,
            rate,
            ..current
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.snapshot().running
    }

    pub fn rate(&self) -> f64 {
        self.snapshot().rate
    }

    /// Consistent copy of every field
    pub fn snapshot(&self) -> ClockSnapshot {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let snapshot = self.load_fields();
            fence(Ordering::Acquire);

            if self.seq.load(Ordering::Relaxed) == before {
                return snapshot;
            }
            std::hint::spin_loop();
        }
    }

    fn load_fields(&self) -> ClockSnapshot {
        ClockSnapshot {
            pts: f64::from_bits(self.pts_bits.load(Ordering::Relaxed)),
            host_ns: self.host_ns.load(Ordering::Relaxed),
            rate: f64::from_bits(self.rate_bits.load(Ordering::Relaxed)),
            running: self.running.load(Ordering::Relaxed) != 0,
            epoch: self.epoch.load(Ordering::Relaxed),
        }
    }

    /// Run `update` against the current fields and publish the result as one step
    fn write<F>(&self, update: F)
    where
        F: FnOnce(ClockSnapshot) -> ClockSnapshot,
    {
        let odd = loop {
            let seq = self.seq.load(Ordering::Relaxed);
            if seq & 1 == 0
                && self
                    .seq
                    .compare_exchange_weak(seq, seq + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                break seq + 1;
            }
            std::hint::spin_loop();
        };
        fence(Ordering::Release);

        let next = update(self.load_fields());
        self.pts_bits.store(next.pts.to_bits(), Ordering::Relaxed);
        self.host_ns.store(next.host_ns, Ordering::Relaxed);
        self.rate_bits.store(next.rate.to_bits(), Ordering::Relaxed);
        self.running.store(next.running as u64, Ordering::Relaxed);
        self.epoch.store(next.epoch, Ordering::Relaxed);

        self.seq.store(odd.wrapping_add(1), Ordering::Release);
    }
}
