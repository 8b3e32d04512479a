//! Test helpers for vfp-engine integration tests
//!
//! Provides reusable test infrastructure components:
//! - ScriptedDecoder: deterministic decoder with injectable failures
//! - RecordingRenderer: keeps the pts of every presented frame
//! - TestSession: engine wired to a manual host clock and manual audio output
//! - CountingAudioManager: manual output that counts session calls

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vfp_engine::audio::{AudioManager, ManualAudioManager, OutputCallback, OutputFormat};
use vfp_engine::playback::ManualHostClock;
use vfp_engine::{
    DecodeError, Frame, PixelFormat, PlaybackEngine, PlayerConfig, PlayerEvent, Plane,
    SourceError, StreamDecoder, StreamKind, VideoRenderer,
};
use vfp_engine::source::Packet;

pub const SAMPLE_RATE: u32 = 1_000;
pub const CHANNELS: u16 = 2;

/// Decoder producing one frame per packet at fixed intervals
pub struct ScriptedDecoder {
    stream: StreamKind,
    frame_duration: f64,
    next_pts: f64,
    end: f64,
    /// Decode failures still to inject, starting with the next packet
    failing_decodes: u32,
    fail_seek: bool,
    seeks: Arc<Mutex<Vec<f64>>>,
}

impl ScriptedDecoder {
    pub fn audio(frame_duration: f64, end: f64) -> Self {
        Self::new(StreamKind::Audio, frame_duration, end)
    }

    pub fn video(frame_duration: f64, end: f64) -> Self {
        Self::new(StreamKind::Video, frame_duration, end)
    }

    fn new(stream: StreamKind, frame_duration: f64, end: f64) -> Self {
        Self {
            stream,
            frame_duration,
            next_pts: 0.0,
            end,
            failing_decodes: 0,
            fail_seek: false,
            seeks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_decodes(mut self, count: u32) -> Self {
        self.failing_decodes = count;
        self
    }

    pub fn failing_seek(mut self) -> Self {
        self.fail_seek = true;
        self
    }

    /// Targets passed to `seek`, shared with the test
    pub fn seek_log(&self) -> Arc<Mutex<Vec<f64>>> {
        Arc::clone(&self.seeks)
    }

    fn frame_at(&self, pts: f64) -> Frame {
        match self.stream {
            StreamKind::Audio => {
                let frames = (self.frame_duration * SAMPLE_RATE as f64).round() as usize;
                Frame::audio(pts, vec![0.1; frames * CHANNELS as usize], CHANNELS, SAMPLE_RATE)
                    .unwrap()
            }
            StreamKind::Video => Frame::video(
                pts,
                self.frame_duration,
                2,
                2,
                PixelFormat::Rgba,
                vec![Plane {
                    stride: 8,
                    data: vec![0; 16],
                }],
            )
            .unwrap(),
        }
    }
}

impl StreamDecoder for ScriptedDecoder {
    fn stream(&self) -> StreamKind {
        self.stream
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, SourceError> {
        if self.next_pts + 1e-9 >= self.end {
            return Ok(None);
        }
        let pts = self.next_pts;
        self.next_pts += self.frame_duration;
        Ok(Some(Packet {
            stream: self.stream,
            pts,
            data: Vec::new(),
        }))
    }

    fn decode(&mut self, packet: Packet) -> Result<Vec<Frame>, DecodeError> {
        if self.failing_decodes > 0 {
            self.failing_decodes -= 1;
            return Err(DecodeError::new(packet.pts, "corrupt packet"));
        }
        Ok(vec![self.frame_at(packet.pts)])
    }

    fn seek(&mut self, target: f64) -> Result<(), SourceError> {
        self.seeks.lock().push(target);
        if self.fail_seek {
            return Err(SourceError::Seek {
                target,
                reason: "not seekable".to_string(),
            });
        }
        self.next_pts = target;
        Ok(())
    }
}

/// Renderer recording the pts of every presented frame
#[derive(Default)]
pub struct RecordingRenderer {
    presented: Mutex<Vec<f64>>,
}

impl RecordingRenderer {
    pub fn presented(&self) -> Vec<f64> {
        self.presented.lock().clone()
    }
}

impl VideoRenderer for RecordingRenderer {
    fn render(&self, frame: Frame) {
        self.presented.lock().push(frame.pts());
    }
}

/// Manual output that counts calls and, like a device-backed manager,
/// refuses `pause` outside an active session
pub struct CountingAudioManager {
    inner: ManualAudioManager,
    pub activations: AtomicUsize,
    pub pauses: AtomicUsize,
    pub deactivations: AtomicUsize,
}

impl CountingAudioManager {
    pub fn new() -> Self {
        Self {
            inner: ManualAudioManager::new(OutputFormat {
                sample_rate: SAMPLE_RATE,
                channels: CHANNELS,
            }),
            activations: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            deactivations: AtomicUsize::new(0),
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl AudioManager for CountingAudioManager {
    fn activate(&self) -> vfp_engine::Result<()> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        self.inner.activate()
    }

    fn deactivate(&self) -> vfp_engine::Result<()> {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        self.inner.deactivate()
    }

    fn set_output_callback(&self, callback: OutputCallback) -> vfp_engine::Result<()> {
        self.inner.set_output_callback(callback)
    }

    fn play(&self) -> vfp_engine::Result<()> {
        self.inner.play()
    }

    fn pause(&self) -> vfp_engine::Result<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        if !self.inner.is_active() {
            return Err(vfp_engine::Error::AudioOutput(
                "audio session not active".to_string(),
            ));
        }
        self.inner.pause()
    }

    fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    fn output_format(&self) -> OutputFormat {
        self.inner.output_format()
    }
}

/// Engine plus handles to every test double
pub struct TestSession {
    pub engine: PlaybackEngine,
    pub host: Arc<ManualHostClock>,
    pub audio: Arc<ManualAudioManager>,
    pub renderer: Arc<RecordingRenderer>,
}

impl TestSession {
    pub async fn open(
        config: PlayerConfig,
        audio: Option<ScriptedDecoder>,
        video: Option<ScriptedDecoder>,
    ) -> Self {
        let host = Arc::new(ManualHostClock::new());
        let manager = Arc::new(ManualAudioManager::new(OutputFormat {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
        }));
        let renderer = Arc::new(RecordingRenderer::default());

        let mut builder = PlaybackEngine::builder(config)
            .host_clock(Arc::clone(&host) as Arc<dyn vfp_engine::playback::HostClock>)
            .audio_manager(Arc::clone(&manager) as Arc<dyn vfp_engine::audio::AudioManager>)
            .renderer(Arc::clone(&renderer) as Arc<dyn VideoRenderer>);
        if let Some(decoder) = audio {
            builder = builder.audio(Box::new(decoder));
        }
        if let Some(decoder) = video {
            builder = builder.video(Box::new(decoder));
        }

        Self {
            engine: builder.open().await.expect("session should open"),
            host,
            audio: manager,
            renderer,
        }
    }

    /// Let spawned tasks run until `cond` holds (bounded)
    pub async fn wait_until(&self, mut cond: impl FnMut(&Self) -> bool) -> bool {
        for _ in 0..500 {
            if cond(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        cond(self)
    }
}

/// Wait (bounded) for an event matching `pred`
pub async fn expect_event(
    rx: &mut tokio::sync::broadcast::Receiver<PlayerEvent>,
    mut pred: impl FnMut(&PlayerEvent) -> bool,
) -> PlayerEvent {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event bus closed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
