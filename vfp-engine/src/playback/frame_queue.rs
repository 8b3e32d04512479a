//! Duration-bounded frame queue between a decode worker and its consumer
//!
//! Each stream (audio, video) has one `FrameQueue`. The decode worker pushes
//! decoded frames in presentation order; the audio callback or the
//! presentation task takes them from the head.
//!
//! ## Capacity
//!
//! Capacity is measured in buffered *duration*, not frame count:
//! - `push()` suspends once buffered duration reaches `max_buffered`
//! - it stays suspended until the consumer drains below `min_buffered`
//! - an empty queue always accepts one frame, so a single frame longer than
//!   `max_buffered` cannot wedge the pipeline
//!
//! The same high/low water marks drive [`FrameQueue::should_decoder_pause`],
//! which the worker checks before reading the next packet.
//!
//! ```text
//! buffered ──────────────────────────────────────────────
//!  max ─ ─ ─ ─ ─ ─ ─ /\ ─ ─ ─ ─ ─ ─ ─ ─/\ ─ ─ ─  pause set
//!                   /   \               /   \
//!  min ─ ─ ─ ─ ─ ─ / ─ ─ \ ─ ─ ─ ─ ─ ─ / ─ ─ \ ─  pause cleared
//!                /        \__________/
//! ```
//!
//! ## Flush
//!
//! `flush()` drops every queued frame and advances a generation counter.
//! Callers suspended in `push()` see the new generation and discard the frame
//! they were holding; callers suspended in `pop()` return `None`. Both wake
//! immediately, without polling.
//!
//! ## Thread Safety
//!
//! State lives behind a `parking_lot::Mutex` that is never held across an
//! await point. Wakeups go through two `tokio::sync::Notify` handles; waiters
//! register before checking state so a notification between the check and
//! the await is never lost.

use crate::media::Frame;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::debug;
use vfp_common::StreamKind;

/// Slack for float accumulation when comparing buffered duration to the marks
const DURATION_EPSILON: f64 = 1e-9;

/// Result of [`FrameQueue::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame appended
    Queued,
    /// Queue was flushed while the push waited; the frame was dropped
    Discarded,
    /// Queue is closed; the frame was dropped
    Closed,
}

/// Snapshot of queue counters for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueueStats {
    pub stream: StreamKind,
    /// Frames currently queued
    pub len: usize,
    /// Seconds of media currently queued
    pub buffered_secs: f64,
    pub total_pushed: u64,
    pub total_popped: u64,
    /// Frames dropped by flush or by a push that lost a flush race
    pub total_discarded: u64,
    pub flushes: u64,
    pub end_of_stream: bool,
    pub decoder_should_pause: bool,
    pub closed: bool,
}

struct QueueState {
    frames: VecDeque<Frame>,

    /// Sum of queued frame durations, never negative
    buffered: f64,

    /// Advanced by every flush
    generation: u64,

    /// Producer has delivered its last frame
    end_of_stream: bool,

    /// No further pushes accepted; waiters released
    closed: bool,

    /// Set when buffered reaches max, cleared when it drops below min
    decoder_should_pause: bool,

    total_pushed: u64,
    total_popped: u64,
    total_discarded: u64,
    flushes: u64,
}

/// Bounded FIFO of decoded frames for one stream
pub struct FrameQueue {
    stream: StreamKind,
    min_buffered: f64,
    max_buffered: f64,
    state: Mutex<QueueState>,

    /// Woken when the pause flag clears, on flush and on close
    space_available: Notify,

    /// Woken when a frame is queued, on end of stream, flush and close
    frame_available: Notify,
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FrameQueue")
            .field("stream", &self.stream)
            .field("min_buffered", &self.min_buffered)
            .field("max_buffered", &self.max_buffered)
            .field("len", &state.frames.len())
            .field("buffered", &state.buffered)
            .field("generation", &state.generation)
            .field("end_of_stream", &state.end_of_stream)
            .field("closed", &state.closed)
            .finish()
    }
}

impl FrameQueue {
    /// Create an empty queue with the given water marks (seconds).
    ///
    /// The marks are expected to come from a validated
    /// [`crate::config::PlayerConfig`]; a reversed pair is tolerated by
    /// treating `max` as `min`.
    pub fn new(stream: StreamKind, min_buffered: f64, max_buffered: f64) -> Self {
        Self {
            stream,
            min_buffered,
            max_buffered: max_buffered.max(min_buffered),
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                buffered: 0.0,
                generation: 0,
                end_of_stream: false,
                closed: false,
                decoder_should_pause: false,
                total_pushed: 0,
                total_popped: 0,
                total_discarded: 0,
                flushes: 0,
            }),
            space_available: Notify::new(),
            frame_available: Notify::new(),
        }
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn min_buffered(&self) -> f64 {
        self.min_buffered
    }

    pub fn max_buffered(&self) -> f64 {
        self.max_buffered
    }

    /// Append a frame, suspending while the queue is above its high-water mark.
    pub async fn push(&self, frame: Frame) -> PushOutcome {
        let mut start_generation = None;

        loop {
            let space = self.space_available.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return PushOutcome::Closed;
                }

                let generation = *start_generation.get_or_insert(state.generation);
                if state.generation != generation {
                    state.total_discarded += 1;
                    return PushOutcome::Discarded;
                }

                let overflows =
                    state.buffered + frame.duration() > self.max_buffered + DURATION_EPSILON;

                if state.frames.is_empty() || !(state.decoder_should_pause || overflows) {
                    state.buffered += frame.duration();
                    state.frames.push_back(frame);
                    state.total_pushed += 1;

                    if !state.decoder_should_pause
                        && state.buffered + DURATION_EPSILON >= self.max_buffered
                    {
                        state.decoder_should_pause = true;
                        debug!(
                            "{} queue reached {:.3}s (max {:.3}s), decoder should pause",
                            self.stream, state.buffered, self.max_buffered
                        );
                    }
                    drop(state);

                    self.frame_available.notify_waiters();
                    return PushOutcome::Queued;
                }

                if !state.decoder_should_pause {
                    state.decoder_should_pause = true;
                    debug!(
                        "{} queue full at {:.3}s (max {:.3}s), push waiting",
                        self.stream, state.buffered, self.max_buffered
                    );
                }
            }

            space.await;
        }
    }

    /// Take the head frame, suspending while the queue is empty.
    ///
    /// Returns `None` when the queue is flushed during the wait, or once it is
    /// empty and either closed or at end of stream.
    pub async fn pop(&self) -> Option<Frame> {
        let mut start_generation = None;

        loop {
            let available = self.frame_available.notified();
            tokio::pin!(available);
            available.as_mut().enable();

            {
                let mut state = self.state.lock();
                let generation = *start_generation.get_or_insert(state.generation);
                if state.generation != generation {
                    return None;
                }

                if let Some(frame) = self.take_front(&mut state) {
                    return Some(frame);
                }

                if state.closed || state.end_of_stream {
                    return None;
                }
            }

            available.await;
        }
    }

    /// Take the head frame if one is queued.
    ///
    /// Never suspends and never logs; safe to call from the audio output
    /// callback.
    pub fn try_pop(&self) -> Option<Frame> {
        let mut state = self.state.lock();
        self.take_front(&mut state)
    }

    /// `(pts, duration)` of the head frame without removing it
    pub fn peek_timing(&self) -> Option<(f64, f64)> {
        let state = self.state.lock();
        state.frames.front().map(|f| (f.pts(), f.duration()))
    }

    /// Drop every queued frame and release all waiters.
    ///
    /// Clears end of stream and the pause flag. Returns the number of frames
    /// dropped.
    pub fn flush(&self) -> usize {
        let dropped = {
            let mut state = self.state.lock();
            let dropped = state.frames.len();
            state.frames.clear();
            state.buffered = 0.0;
            state.generation = state.generation.wrapping_add(1);
            state.end_of_stream = false;
            state.decoder_should_pause = false;
            state.total_discarded += dropped as u64;
            state.flushes += 1;
            dropped
        };

        self.space_available.notify_waiters();
        self.frame_available.notify_waiters();

        debug!("{} queue flushed, {} frames dropped", self.stream, dropped);
        dropped
    }

    /// Producer has no more frames; `pop` on an empty queue returns `None`
    pub fn mark_end_of_stream(&self) {
        self.state.lock().end_of_stream = true;
        self.frame_available.notify_waiters();
        debug!("{} queue marked end of stream", self.stream);
    }

    /// Stop accepting frames and release every waiter
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.space_available.notify_waiters();
        self.frame_available.notify_waiters();
    }

    /// Accept frames again after [`FrameQueue::close`]
    pub fn reopen(&self) {
        self.state.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// End of stream reached and every frame consumed
    pub fn is_exhausted(&self) -> bool {
        let state = self.state.lock();
        state.end_of_stream && state.frames.is_empty()
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.state.lock().end_of_stream
    }

    /// Whether the producer should stop decoding (hysteresis between the marks)
    pub fn should_decoder_pause(&self) -> bool {
        self.state.lock().decoder_should_pause
    }

    /// Suspend until the pause flag clears, or the queue is flushed or closed
    pub async fn wait_for_refill(&self) {
        let mut start_generation = None;

        loop {
            let space = self.space_available.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let state = self.state.lock();
                let generation = *start_generation.get_or_insert(state.generation);
                if !state.decoder_should_pause || state.closed || state.generation != generation {
                    return;
                }
            }

            space.await;
        }
    }

    /// Flush generation; changes whenever [`FrameQueue::flush`] runs
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn buffered_duration(&self) -> f64 {
        self.state.lock().buffered
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            stream: self.stream,
            len: state.frames.len(),
            buffered_secs: state.buffered,
            total_pushed: state.total_pushed,
            total_popped: state.total_popped,
            total_discarded: state.total_discarded,
            flushes: state.flushes,
            end_of_stream: state.end_of_stream,
            decoder_should_pause: state.decoder_should_pause,
            closed: state.closed,
        }
    }

    /// Remove the head frame, keep the accounting straight and wake a paused
    /// producer once the low-water mark is crossed
    fn take_front(&self, state: &mut QueueState) -> Option<Frame> {
        let frame = state.frames.pop_front()?;
        state.total_popped += 1;

        if state.frames.is_empty() {
            state.buffered = 0.0;
        } else {
            state.buffered = (state.buffered - frame.duration()).max(0.0);
        }

        if state.decoder_should_pause
            && (state.frames.is_empty() || state.buffered < self.min_buffered)
        {
            state.decoder_should_pause = false;
            self.space_available.notify_waiters();
        }

        Some(frame)
    }
}
