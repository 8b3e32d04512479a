//! Per-stream decode worker
//!
//! One tokio task per stream pulls packets from a [`StreamDecoder`], decodes
//! them and pushes the frames into the stream's [`FrameQueue`].
//!
//! **Loop:**
//! 1. Queue above its high-water mark → suspend in `wait_for_refill()` until
//!    it drains below the low-water mark
//! 2. Read a packet; end of stream marks the queue and ends the task
//! 3. Decode; a failed packet is skipped and counted
//! 4. Push every frame in order; a closed queue ends the task
//!
//! **Errors:**
//! - A run of consecutive decode failures longer than the configured limit,
//!   or an unreadable source, is reported once on the fatal channel and ends
//!   the task. Any successful decode resets the run.
//!
//! **Shutdown:** `stop()` raises the stop flag and closes the queue, which
//! releases a worker suspended in push or refill. The decoder is handed back
//! on join so the session can reposition it and start a new worker.

use crate::error::{Error, Result};
use crate::playback::frame_queue::{FrameQueue, PushOutcome};
use crate::source::StreamDecoder;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vfp_common::StreamKind;

/// Stream failed beyond recovery; sent to the playback engine
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{stream} stream fatal: {reason}")]
pub struct StreamFatalError {
    pub stream: StreamKind,
    pub reason: String,
}

/// Why a worker task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExit {
    /// Decoder reported end of stream; queue marked
    EndOfStream,
    /// Stop flag raised or queue closed
    Stopped,
    /// Error threshold exceeded or source unreadable; reported on the fatal channel
    Fatal,
}

/// Counters shared between a worker and diagnostics
#[derive(Debug, Default)]
pub struct DecodeCounters {
    packets_read: AtomicU64,
    frames_queued: AtomicU64,
    frames_discarded: AtomicU64,
    decode_errors: AtomicU64,
}

/// Snapshot of [`DecodeCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    pub packets_read: u64,
    pub frames_queued: u64,
    pub frames_discarded: u64,
    pub decode_errors: u64,
}

impl DecodeCounters {
    pub fn snapshot(&self) -> DecodeStats {
        DecodeStats {
            packets_read: self.packets_read.load(Ordering::Relaxed),
            frames_queued: self.frames_queued.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Decoder returned from a finished worker
pub struct WorkerOutcome {
    pub decoder: Box<dyn StreamDecoder>,
    pub exit: WorkerExit,
}

impl std::fmt::Debug for WorkerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerOutcome")
            .field("stream", &self.decoder.stream())
            .field("exit", &self.exit)
            .finish()
    }
}

/// Handle to a running decode task
pub struct DecodeWorker {
    stream: StreamKind,
    queue: Arc<FrameQueue>,
    stop_flag: Arc<AtomicBool>,
    handle: JoinHandle<WorkerOutcome>,
}

impl DecodeWorker {
    /// Spawn the worker loop for `decoder`'s stream
    pub fn spawn(
        decoder: Box<dyn StreamDecoder>,
        queue: Arc<FrameQueue>,
        max_consecutive_errors: u32,
        counters: Arc<DecodeCounters>,
        fatal_tx: mpsc::UnboundedSender<StreamFatalError>,
    ) -> Self {
        let stream = decoder.stream();
        let stop_flag = Arc::new(AtomicBool::new(false));

        let task = WorkerTask {
            stream,
            queue: Arc::clone(&queue),
            stop_flag: Arc::clone(&stop_flag),
            max_consecutive_errors,
            counters,
            fatal_tx,
        };

        let handle = tokio::spawn(async move {
            info!("{} decode worker started", stream);
            let outcome = task.run(decoder).await;
            info!("{} decode worker stopped ({:?})", stream, outcome.exit);
            outcome
        });

        Self {
            stream,
            queue,
            stop_flag,
            handle,
        }
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task to stop without waiting for it
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.queue.close();
    }

    /// Signal the task to stop, release it from any suspension and join it.
    ///
    /// Leaves the queue closed; the caller reopens it before restarting.
    pub async fn stop(self) -> Result<WorkerOutcome> {
        self.request_stop();
        self.join().await
    }

    /// Wait for the task to end on its own
    pub async fn join(self) -> Result<WorkerOutcome> {
        let stream = self.stream;
        self.handle
            .await
            .map_err(|e| Error::Internal(format!("{} decode worker panicked: {}", stream, e)))
    }
}

struct WorkerTask {
    stream: StreamKind,
    queue: Arc<FrameQueue>,
    stop_flag: Arc<AtomicBool>,
    max_consecutive_errors: u32,
    counters: Arc<DecodeCounters>,
    fatal_tx: mpsc::UnboundedSender<StreamFatalError>,
}

impl WorkerTask {
    async fn run(self, mut decoder: Box<dyn StreamDecoder>) -> WorkerOutcome {
        let mut consecutive_errors = 0u32;

        let exit = 'decode: loop {
            if self.stop_flag.load(Ordering::Acquire) {
                break WorkerExit::Stopped;
            }

            // Hysteresis: stay idle from max until the queue drains below min
            if self.queue.should_decoder_pause() {
                debug!(
                    "{} decode worker pausing, {:.3}s buffered",
                    self.stream,
                    self.queue.buffered_duration()
                );
                self.queue.wait_for_refill().await;
                debug!(
                    "{} decode worker resuming, {:.3}s buffered",
                    self.stream,
                    self.queue.buffered_duration()
                );
                continue;
            }

            let packet = match decoder.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    self.queue.mark_end_of_stream();
                    info!("{} stream reached end of stream", self.stream);
                    break WorkerExit::EndOfStream;
                }
                Err(e) => {
                    self.report_fatal(format!("source unreadable: {}", e));
                    break WorkerExit::Fatal;
                }
            };
            self.counters.packets_read.fetch_add(1, Ordering::Relaxed);

            match decoder.decode(packet) {
                Ok(frames) => {
                    consecutive_errors = 0;
                    for frame in frames {
                        match self.queue.push(frame).await {
                            PushOutcome::Queued => {
                                self.counters.frames_queued.fetch_add(1, Ordering::Relaxed);
                            }
                            PushOutcome::Discarded => {
                                // Queue flushed underneath us: rest of this packet is stale too
                                self.counters
                                    .frames_discarded
                                    .fetch_add(1, Ordering::Relaxed);
                                debug!("{} frame discarded by flush", self.stream);
                                break;
                            }
                            PushOutcome::Closed => break 'decode WorkerExit::Stopped,
                        }
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "{} decode error ({} consecutive, limit {}): {}",
                        self.stream, consecutive_errors, self.max_consecutive_errors, e
                    );

                    if consecutive_errors > self.max_consecutive_errors {
                        self.report_fatal(format!(
                            "{} consecutive decode errors, last: {}",
                            consecutive_errors, e
                        ));
                        break WorkerExit::Fatal;
                    }
                }
            }

            // Decoding is synchronous; give the rest of the runtime a turn
            tokio::task::yield_now().await;
        };

        WorkerOutcome { decoder, exit }
    }

    fn report_fatal(&self, reason: String) {
        error!("{} stream fatal: {}", self.stream, reason);
        let fatal = StreamFatalError {
            stream: self.stream,
            reason,
        };
        if self.fatal_tx.send(fatal).is_err() {
            warn!("{} fatal error dropped: engine no longer listening", self.stream);
        }
    }
}
