//! Video presentation against the audio clock
//!
//! [`SyncController::evaluate`] looks at the head of the video queue and
//! decides, for the current clock time `t` and `delta = pts - t`:
//!
//! | condition                         | decision                                 |
//! |-----------------------------------|------------------------------------------|
//! | queue empty                       | `Idle` (starvation, not an error)        |
//! | `delta > present_tolerance`       | `Wait(min(delta, max_wait))`, keep frame |
//! | `delta >= -drop_threshold`        | pop and present                          |
//! | `delta < -drop_threshold`         | pop and drop, look at the next frame     |
//!
//! At most `max_drops_per_cycle` frames are dropped per evaluation. If the
//! bound is reached and the next frame is still stale, the video is
//! persistently behind: a clock desync warning is logged, counted and
//! published as [`PlayerEvent::SyncWarning`].
//!
//! Frames whose pts is lower than the last presented pts are dropped, so
//! presentation order never goes backwards. [`SyncController::reset`] clears
//! that memory after a seek.
//!
//! [`PresentationTask`] runs the controller on its own tokio task, sleeping
//! for the tick interval or the requested wait, and wakes immediately when
//! stopped.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::playback::clock::{AudioClock, HostClock};
use crate::playback::frame_queue::FrameQueue;
use crate::render::VideoRenderer;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vfp_common::human_time::{format_drift, format_position};
use vfp_common::timing::secs_to_duration;
use vfp_common::{EventBus, PlayerEvent};

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncDecision {
    /// Head frame handed to the renderer (after `dropped` stale frames)
    Presented { pts: f64, dropped: u32 },
    /// Head frame is early; evaluate again after `delay`
    Wait { delay: Duration, dropped: u32 },
    /// Only stale frames were examined
    Dropped { count: u32 },
    /// Nothing queued
    Idle,
}

/// Presentation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SyncMetrics {
    pub frames_presented: u64,
    /// Stale frames dropped behind the clock
    pub frames_dropped: u64,
    /// Frames dropped for arriving below the last presented pts
    pub frames_out_of_order: u64,
    /// Drop cycles that hit the bound with video still behind
    pub desync_events: u64,
    /// Evaluations that found the queue empty
    pub starved_evaluations: u64,
    /// `pts - clock` of the last presented frame (seconds)
    pub last_drift_secs: f64,
    /// Largest lateness of any presented frame (seconds)
    pub max_late_secs: f64,
    pub last_presented_pts: Option<f64>,
}

/// Present/wait/drop policy for the video queue
pub struct SyncController {
    queue: Arc<FrameQueue>,
    renderer: Arc<dyn VideoRenderer>,
    config: SyncConfig,
    last_presented_pts: Option<f64>,
    metrics: SyncMetrics,
    events: Option<(EventBus, Uuid)>,
}

impl SyncController {
    pub fn new(queue: Arc<FrameQueue>, renderer: Arc<dyn VideoRenderer>, config: SyncConfig) -> Self {
        Self {
            queue,
            renderer,
            config,
            last_presented_pts: None,
            metrics: SyncMetrics::default(),
            events: None,
        }
    }

    /// Publish desync warnings for `session_id` on `bus`
    pub fn with_events(mut self, bus: EventBus, session_id: Uuid) -> Self {
        self.events = Some((bus, session_id));
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn metrics(&self) -> SyncMetrics {
        self.metrics
    }

    /// Forget presentation history (after a seek)
    pub fn reset(&mut self) {
        self.last_presented_pts = None;
        self.metrics.last_presented_pts = None;
    }

    /// Decide what to do with the head frame at clock time `clock_time`
    pub fn evaluate(&mut self, clock_time: f64) -> SyncDecision {
        let mut dropped = 0u32;

        loop {
            let Some((pts, _)) = self.queue.peek_timing() else {
                if dropped > 0 {
                    return SyncDecision::Dropped { count: dropped };
                }
                self.metrics.starved_evaluations += 1;
                return SyncDecision::Idle;
            };

            let behind_last = self.last_presented_pts.is_some_and(|last| pts < last);
            let delta = pts - clock_time;

            if !behind_last && delta > self.config.present_tolerance {
                let delay = secs_to_duration(delta.min(self.config.max_wait));
                return SyncDecision::Wait { delay, dropped };
            }

            if !behind_last && delta >= -self.config.drop_threshold {
                // Raced with a flush: nothing to present
                let Some(frame) = self.queue.try_pop() else {
                    return SyncDecision::Idle;
                };
                self.record_presented(pts, delta);
                self.renderer.render(frame);
                return SyncDecision::Presented { pts, dropped };
            }

            if self.queue.try_pop().is_none() {
                return SyncDecision::Dropped { count: dropped };
            }
            dropped += 1;
            if behind_last {
                self.metrics.frames_out_of_order += 1;
                debug!("Dropped out-of-order frame at {}", format_position(pts));
            } else {
                self.metrics.frames_dropped += 1;
                debug!(
                    "Dropped stale frame at {} ({} behind clock)",
                    format_position(pts),
                    format_drift(-delta)
                );
            }

            if dropped >= self.config.max_drops_per_cycle {
                self.check_desync(clock_time, dropped);
                return SyncDecision::Dropped { count: dropped };
            }
        }
    }

    fn record_presented(&mut self, pts: f64, delta: f64) {
        self.last_presented_pts = Some(pts);
        self.metrics.frames_presented += 1;
        self.metrics.last_drift_secs = delta;
        self.metrics.last_presented_pts = Some(pts);
        if delta < 0.0 {
            self.metrics.max_late_secs = self.metrics.max_late_secs.max(-delta);
        }
    }

    /// Drop bound reached: warn if the next frame is still beyond the threshold
    fn check_desync(&mut self, clock_time: f64, dropped: u32) {
        let Some((next_pts, _)) = self.queue.peek_timing() else {
            return;
        };
        let behind = clock_time - next_pts;
        if behind <= self.config.drop_threshold {
            return;
        }

        self.metrics.desync_events += 1;
        warn!(
            "Clock desync: video {} behind at {} after dropping {} frames",
            format_drift(behind),
            format_position(clock_time),
            dropped
        );

        if let Some((bus, session_id)) = &self.events {
            bus.emit_lossy(PlayerEvent::SyncWarning {
                session_id: *session_id,
                behind_secs: behind,
                dropped,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

/// Presentation loop running a shared [`SyncController`]
pub struct PresentationTask {
    stop_signal: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl PresentationTask {
    pub fn spawn(
        controller: Arc<Mutex<SyncController>>,
        clock: Arc<AudioClock>,
        host: Arc<dyn HostClock>,
    ) -> Self {
        let stop_signal = Arc::new(Notify::new());
        let stop = Arc::clone(&stop_signal);
        let tick = secs_to_duration(controller.lock().config().tick_interval);

        let handle = tokio::spawn(async move {
            info!("Presentation task started (tick {:?})", tick);
            loop {
                let now = clock.current_time(host.now_ns());
                let decision = controller.lock().evaluate(now);

                let pause = match decision {
                    SyncDecision::Wait { delay, .. } => delay,
                    _ => tick,
                };

                tokio::select! {
                    _ = stop.notified() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
            info!("Presentation task stopped");
        });

        Self {
            stop_signal,
            handle,
        }
    }

    /// Ask the loop to exit without waiting for it
    pub fn request_stop(&self) {
        // notify_one stores a permit if the loop is between selects
        self.stop_signal.notify_one();
    }

    /// Wake the loop and wait for it to exit
    pub async fn stop(self) -> Result<()> {
        self.request_stop();
        self.handle
            .await
            .map_err(|e| Error::Internal(format!("presentation task panicked: {}", e)))
    }
}
