//! Audio output callback body
//!
//! [`AudioRenderer::fill`] runs inside the device callback. It copies
//! queued PCM into the device buffer, keeping a partially consumed frame
//! between calls, and updates the [`AudioClock`] each time it starts a frame.
//!
//! **REAL-TIME SAFE:** no logging, no awaiting and no allocation; the queue
//! lock is held only for a single `try_pop`. When the queue runs dry the
//! remainder of the buffer is silence and the underrun counters are bumped;
//! [`crate::audio::monitor`] reports them off the audio thread.

use crate::audio::manager::OutputFormat;
use crate::media::{Frame, FramePayload};
use crate::playback::clock::{AudioClock, HostClock};
use crate::playback::frame_queue::FrameQueue;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use vfp_common::timing::{frames_to_secs, secs_to_nanos};

/// Counters written by the callback, read by the monitor and diagnostics
#[derive(Debug, Default)]
pub struct OutputCounters {
    callbacks: AtomicU64,
    frames_rendered: AtomicU64,
    silence_frames: AtomicU64,
    underruns: AtomicU64,
}

/// Snapshot of [`OutputCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutputStats {
    pub callbacks: u64,
    /// PCM frames copied from the queue
    pub frames_rendered: u64,
    /// PCM frames of silence written while active
    pub silence_frames: u64,
    /// Callbacks that ran out of queued audio while active
    pub underruns: u64,
}

impl OutputCounters {
    pub fn snapshot(&self) -> OutputStats {
        OutputStats {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            silence_frames: self.silence_frames.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}

/// Frame being played out across callbacks
struct HeldFrame {
    pts: f64,
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    /// PCM frames already written
    offset: usize,
}

impl HeldFrame {
    fn from_frame(frame: Frame) -> Option<Self> {
        let pts = frame.pts();
        match frame.into_payload() {
            FramePayload::Audio {
                samples,
                channels,
                sample_rate,
            } => Some(Self {
                pts,
                samples,
                channels: channels as usize,
                sample_rate,
                offset: 0,
            }),
            FramePayload::Video { .. } => None,
        }
    }

    fn remaining(&self) -> usize {
        self.samples.len() / self.channels - self.offset
    }

    /// Stream time at the current read position
    fn position_pts(&self) -> f64 {
        self.pts + frames_to_secs(self.offset as u64, self.sample_rate)
    }
}

/// Pulls audio frames from the queue into device buffers
pub struct AudioRenderer {
    queue: Arc<FrameQueue>,
    clock: Arc<AudioClock>,
    host: Arc<dyn HostClock>,
    format: OutputFormat,
    active: Arc<AtomicBool>,
    counters: Arc<OutputCounters>,
    held: Option<HeldFrame>,
    generation: u64,
}

impl AudioRenderer {
    pub fn new(
        queue: Arc<FrameQueue>,
        clock: Arc<AudioClock>,
        host: Arc<dyn HostClock>,
        format: OutputFormat,
        active: Arc<AtomicBool>,
        counters: Arc<OutputCounters>,
    ) -> Self {
        let generation = queue.generation();
        Self {
            queue,
            clock,
            host,
            format,
            active,
            counters,
            held: None,
            generation,
        }
    }

    /// Fill an interleaved buffer of `out.len() / channels` PCM frames.
    ///
    /// Writes silence while inactive (paused, seeking, stopped) without
    /// touching the queue or the clock.
    pub fn fill(&mut self, out: &mut [f32]) {
        let out_channels = (self.format.channels as usize).max(1);
        let total = out.len() / out_channels;
        self.counters.callbacks.fetch_add(1, Ordering::Relaxed);

        if !self.active.load(Ordering::Acquire) {
            out.fill(0.0);
            return;
        }

        // A flush invalidates whatever we were holding
        let generation = self.queue.generation();
        if generation != self.generation {
            self.generation = generation;
            self.held = None;
        }

        let host_now = self.host.now_ns();
        let mut written = 0usize;

        if let Some(held) = &self.held {
            self.clock.on_frame_consumed(held.position_pts(), host_now);
        }

        while written < total {
            if self.held.is_none() {
                let Some(frame) = self.queue.try_pop() else {
                    break;
                };
                let Some(held) = HeldFrame::from_frame(frame) else {
                    continue;
                };
                if held.remaining() == 0 {
                    continue;
                }
                let offset_ns =
                    secs_to_nanos(frames_to_secs(written as u64, self.format.sample_rate));
                self.clock
                    .on_frame_consumed(held.pts, host_now.saturating_add(offset_ns));
                self.held = Some(held);
            }

            let Some(held) = self.held.as_mut() else {
                break;
            };
            let count = held.remaining().min(total - written);
            let dst = &mut out[written * out_channels..(written + count) * out_channels];
            let start = held.offset * held.channels;
            let src = &held.samples[start..start + count * held.channels];
            remap_channels(src, held.channels, dst, out_channels);

            held.offset += count;
            written += count;
            if held.remaining() == 0 {
                self.held = None;
            }
        }

        // Also covers a trailing partial frame when the buffer length is not
        // a multiple of the channel count
        out[written * out_channels..].fill(0.0);
        if written < total {
            self.counters
                .silence_frames
                .fetch_add((total - written) as u64, Ordering::Relaxed);
            self.counters.underruns.fetch_add(1, Ordering::Relaxed);
        }
        self.counters
            .frames_rendered
            .fetch_add(written as u64, Ordering::Relaxed);
    }
}

/// Copy interleaved PCM between channel layouts.
///
/// Mono is duplicated to every output channel, many-to-mono averages, and
/// otherwise channels map by index with missing outputs silent.
fn remap_channels(src: &[f32], src_channels: usize, dst: &mut [f32], dst_channels: usize) {
    for (in_frame, out_frame) in src
        .chunks_exact(src_channels)
        .zip(dst.chunks_exact_mut(dst_channels))
    {
        if src_channels == dst_channels {
            out_frame.copy_from_slice(in_frame);
        } else if src_channels == 1 {
            out_frame.fill(in_frame[0]);
        } else if dst_channels == 1 {
            out_frame[0] = in_frame.iter().sum::<f32>() / src_channels as f32;
        } else {
            for (ch, sample) in out_frame.iter_mut().enumerate() {
                *sample = in_frame.get(ch).copied().unwrap_or(0.0);
            }
        }
    }
}
