//! Video presentation surface interface

use crate::media::{Frame, FramePayload};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Paints presented video frames.
///
/// Called from the presentation task, never from the audio path. The frame
/// is handed over by value; the renderer owns and eventually drops it.
pub trait VideoRenderer: Send + Sync {
    fn render(&self, frame: Frame);
}

/// Renderer that only counts and traces frames (headless operation)
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    frames: AtomicU64,
    last_pts_bits: AtomicU64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn last_pts(&self) -> Option<f64> {
        if self.frames_rendered() == 0 {
            return None;
        }
        Some(f64::from_bits(self.last_pts_bits.load(Ordering::Relaxed)))
    }
}

impl VideoRenderer for HeadlessRenderer {
    fn render(&self, frame: Frame) {
        if let FramePayload::Video {
            width,
            height,
            format,
            ..
        } = frame.payload()
        {
            trace!(
                "Render {}x{} {:?} frame at {:.3}s",
                width,
                height,
                format,
                frame.pts()
            );
        }
        self.last_pts_bits
            .store(frame.pts().to_bits(), Ordering::Relaxed);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}
