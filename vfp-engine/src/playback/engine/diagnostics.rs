//! Diagnostics module
//!
//! **Responsibilities:**
//! - Status accessors (queue, decode, output and sync counters)
//! - Point-in-time [`PlaybackDiagnostics`] snapshot for logs and tooling

use super::core::PlaybackEngine;
use crate::audio::OutputStats;
use crate::playback::clock::ClockSnapshot;
use crate::playback::decode_worker::DecodeStats;
use crate::playback::frame_queue::QueueStats;
use crate::playback::sync::SyncMetrics;
use serde::Serialize;
use uuid::Uuid;
use vfp_common::{PlaybackState, StreamKind};

/// Pipeline state for one stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamDiagnostics {
    pub queue: QueueStats,
    pub decode: DecodeStats,
}

/// Whole-session snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackDiagnostics {
    pub session_id: Uuid,
    pub state: PlaybackState,
    pub position_secs: f64,
    pub clock: ClockSnapshot,
    pub audio: Option<StreamDiagnostics>,
    pub video: Option<StreamDiagnostics>,
    pub output: OutputStats,
    pub sync: SyncMetrics,
}

impl PlaybackEngine {
    /// Queue statistics for `stream`
    pub fn queue_stats(&self, stream: StreamKind) -> QueueStats {
        match stream {
            StreamKind::Audio => self.inner.audio_queue.stats(),
            StreamKind::Video => self.inner.video_queue.stats(),
        }
    }

    /// Decode counters for `stream`
    pub fn decode_stats(&self, stream: StreamKind) -> DecodeStats {
        match stream {
            StreamKind::Audio => self.inner.audio_decode.snapshot(),
            StreamKind::Video => self.inner.video_decode.snapshot(),
        }
    }

    pub fn output_stats(&self) -> OutputStats {
        self.inner.output_counters.snapshot()
    }

    pub fn sync_metrics(&self) -> SyncMetrics {
        self.inner.sync.lock().metrics()
    }

    /// Collect every counter into one serializable snapshot
    pub fn diagnostics(&self) -> PlaybackDiagnostics {
        let stream = |kind: StreamKind| StreamDiagnostics {
            queue: self.queue_stats(kind),
            decode: self.decode_stats(kind),
        };

        PlaybackDiagnostics {
            session_id: self.inner.session_id,
            state: self.state(),
            position_secs: self.position(),
            clock: self.inner.clock.snapshot(),
            audio: self.inner.has_audio.then(|| stream(StreamKind::Audio)),
            video: self.inner.has_video.then(|| stream(StreamKind::Video)),
            output: self.output_stats(),
            sync: self.sync_metrics(),
        }
    }
}
