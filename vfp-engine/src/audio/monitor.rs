//! Underrun reporting for the audio output path
//!
//! The output callback only bumps counters. This monitor runs on a normal
//! tokio task, compares successive snapshots and logs starvation summaries,
//! so nothing on the real-time path ever formats a log line.

use crate::audio::renderer::{OutputCounters, OutputStats};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default reporting period
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic underrun reporter
pub struct UnderrunMonitor {
    counters: Arc<OutputCounters>,
    active: Arc<AtomicBool>,
    last: OutputStats,
}

impl UnderrunMonitor {
    pub fn new(counters: Arc<OutputCounters>, active: Arc<AtomicBool>) -> Self {
        let last = counters.snapshot();
        Self {
            counters,
            active,
            last,
        }
    }

    /// Compare against the previous check and log any new starvation.
    ///
    /// Returns the underruns seen since the previous check.
    pub fn check(&mut self) -> u64 {
        let now = self.counters.snapshot();
        let underruns = now.underruns.saturating_sub(self.last.underruns);
        let silence = now.silence_frames.saturating_sub(self.last.silence_frames);
        let callbacks = now.callbacks.saturating_sub(self.last.callbacks);
        self.last = now;

        if underruns > 0 && self.active.load(Ordering::Relaxed) {
            warn!(
                "Audio starvation: {} of {} callbacks underran ({} silent frames, {} total underruns)",
                underruns, callbacks, silence, now.underruns
            );
        } else if callbacks > 0 {
            debug!("Audio output: {} callbacks, no underruns", callbacks);
        }
        underruns
    }

    /// Run [`UnderrunMonitor::check`] every `interval` until aborted
    pub fn spawn(mut self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.check();
            }
        })
    }
}
