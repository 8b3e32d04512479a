//! Core playback engine - session construction and shared state
//!
//! **Responsibilities:**
//! - `PlaybackEngine` / `EngineBuilder` definitions and session opening
//! - Worker and presentation task lifecycle helpers used by the transitions
//! - Supervisor task: fatal stream errors and end-of-stream detection
//!
//! Every transition takes the async session lock first, so play, pause,
//! seek, stop and fatal handling never interleave.

use crate::audio::{AudioManager, AudioRenderer, OutputCounters, UnderrunMonitor};
use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::playback::clock::{AudioClock, HostClock, SystemHostClock};
use crate::playback::decode_worker::{DecodeCounters, DecodeWorker, StreamFatalError};
use crate::playback::frame_queue::FrameQueue;
use crate::playback::sync::{PresentationTask, SyncController};
use crate::render::VideoRenderer;
use crate::source::{DecoderOptions, StreamDecoder};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vfp_common::{EventBus, PlaybackState, PlayerEvent, StreamKind};

/// How often the supervisor checks for end of stream
const SUPERVISOR_INTERVAL: Duration = Duration::from_millis(50);

/// Playback session: decode workers, queues, clock, audio output and
/// presentation, driven through `play` / `pause` / `seek` / `stop`
#[derive(Clone)]
pub struct PlaybackEngine {
    pub(super) inner: Arc<EngineInner>,
}

pub(super) struct EngineInner {
    pub(super) session_id: Uuid,
    pub(super) config: PlayerConfig,
    pub(super) events: EventBus,
    pub(super) host: Arc<dyn HostClock>,
    pub(super) clock: Arc<AudioClock>,
    pub(super) audio_queue: Arc<FrameQueue>,
    pub(super) video_queue: Arc<FrameQueue>,
    pub(super) has_audio: bool,
    pub(super) has_video: bool,
    pub(super) audio_manager: Option<Arc<dyn AudioManager>>,
    pub(super) sync: Arc<Mutex<SyncController>>,

    /// Gate for the audio output callback; false outside Playing
    pub(super) output_active: Arc<AtomicBool>,
    pub(super) output_counters: Arc<OutputCounters>,
    pub(super) audio_decode: Arc<DecodeCounters>,
    pub(super) video_decode: Arc<DecodeCounters>,

    /// Readable without the session lock; written only under it
    pub(super) state: RwLock<PlaybackState>,
    pub(super) eos_reported: AtomicBool,
    pub(super) fatal_tx: mpsc::UnboundedSender<StreamFatalError>,

    /// Transition lock
    pub(super) session: tokio::sync::Mutex<Session>,
}

/// Resources owned by the current transition holder
pub(super) struct Session {
    /// Decoders not currently owned by a worker
    pub(super) parked: Vec<Box<dyn StreamDecoder>>,
    pub(super) workers: Vec<DecodeWorker>,
    pub(super) presentation: Option<PresentationTask>,
    pub(super) monitor: Option<JoinHandle<()>>,
    pub(super) supervisor: Option<JoinHandle<()>>,
    pub(super) audio_active: bool,
}

/// Builder for a [`PlaybackEngine`] session
pub struct EngineBuilder {
    config: PlayerConfig,
    audio: Option<Box<dyn StreamDecoder>>,
    video: Option<Box<dyn StreamDecoder>>,
    audio_manager: Option<Arc<dyn AudioManager>>,
    renderer: Option<Arc<dyn VideoRenderer>>,
    host: Option<Arc<dyn HostClock>>,
    events: Option<EventBus>,
}

impl EngineBuilder {
    pub fn audio(mut self, decoder: Box<dyn StreamDecoder>) -> Self {
        self.audio = Some(decoder);
        self
    }

    pub fn video(mut self, decoder: Box<dyn StreamDecoder>) -> Self {
        self.video = Some(decoder);
        self
    }

    pub fn audio_manager(mut self, manager: Arc<dyn AudioManager>) -> Self {
        self.audio_manager = Some(manager);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn VideoRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Host time source (defaults to the system monotonic clock)
    pub fn host_clock(mut self, host: Arc<dyn HostClock>) -> Self {
        self.host = Some(host);
        self
    }

    /// Share an existing event bus (defaults to a new one)
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the configuration and streams and open the session in `Idle`.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn open(self) -> Result<PlaybackEngine> {
        let config = self.config.validated()?;

        if self.audio.is_none() && self.video.is_none() {
            return Err(Error::InvalidInput("session has no streams".to_string()));
        }
        for (decoder, expected) in [
            (&self.audio, StreamKind::Audio),
            (&self.video, StreamKind::Video),
        ] {
            if let Some(decoder) = decoder {
                if decoder.stream() != expected {
                    return Err(Error::InvalidInput(format!(
                        "{} decoder supplied for the {} stream",
                        decoder.stream(),
                        expected
                    )));
                }
            }
        }

        let has_audio = self.audio.is_some();
        let has_video = self.video.is_some();
        let audio_manager = match (has_audio, self.audio_manager) {
            (true, None) => {
                return Err(Error::InvalidInput(
                    "audio stream requires an audio manager".to_string(),
                ))
            }
            (true, manager) => manager,
            (false, _) => None,
        };
        let renderer: Arc<dyn VideoRenderer> = match (has_video, self.renderer) {
            (true, None) => {
                return Err(Error::InvalidInput(
                    "video stream requires a renderer".to_string(),
                ))
            }
            (_, Some(renderer)) => renderer,
            (false, None) => Arc::new(crate::render::HeadlessRenderer::new()),
        };

        let session_id = Uuid::new_v4();
        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(config.event_capacity));
        let host = self
            .host
            .unwrap_or_else(|| Arc::new(SystemHostClock::new()) as Arc<dyn HostClock>);

        let audio_queue = Arc::new(FrameQueue::new(
            StreamKind::Audio,
            config.min_buffered_duration,
            config.max_buffered_duration,
        ));
        let video_queue = Arc::new(FrameQueue::new(
            StreamKind::Video,
            config.min_buffered_duration,
            config.max_buffered_duration,
        ));
        let clock = Arc::new(AudioClock::new());
        let sync = Arc::new(Mutex::new(
            SyncController::new(Arc::clone(&video_queue), renderer, config.sync.clone())
                .with_events(events.clone(), session_id),
        ));

        let output_active = Arc::new(AtomicBool::new(false));
        let output_counters = Arc::new(OutputCounters::default());

        if let Some(manager) = &audio_manager {
            let mut output = AudioRenderer::new(
                Arc::clone(&audio_queue),
                Arc::clone(&clock),
                Arc::clone(&host),
                manager.output_format(),
                Arc::clone(&output_active),
                Arc::clone(&output_counters),
            );
            manager.set_output_callback(Box::new(move |buffer: &mut [f32]| output.fill(buffer)))?;
        }

        let options = DecoderOptions {
            disable_deinterlacing: config.disable_deinterlacing,
        };
        let mut parked = Vec::new();
        for mut decoder in [self.audio, self.video].into_iter().flatten() {
            decoder.configure(&options);
            parked.push(decoder);
        }

        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(EngineInner {
            session_id,
            config,
            events,
            host,
            clock,
            audio_queue,
            video_queue,
            has_audio,
            has_video,
            audio_manager,
            sync,
            output_active,
            output_counters,
            audio_decode: Arc::new(DecodeCounters::default()),
            video_decode: Arc::new(DecodeCounters::default()),
            state: RwLock::new(PlaybackState::Idle),
            eos_reported: AtomicBool::new(false),
            fatal_tx,
            session: tokio::sync::Mutex::new(Session {
                parked,
                workers: Vec::new(),
                presentation: None,
                monitor: None,
                supervisor: None,
                audio_active: false,
            }),
        });

        let supervisor = spawn_supervisor(Arc::downgrade(&inner), fatal_rx);
        inner.session.lock().await.supervisor = Some(supervisor);

        info!(
            "Playback session {} opened (audio={}, video={}, buffer {:.3}-{:.3}s)",
            session_id,
            has_audio,
            has_video,
            inner.config.min_buffered_duration,
            inner.config.max_buffered_duration
        );

        Ok(PlaybackEngine { inner })
    }
}

impl PlaybackEngine {
    pub fn builder(config: PlayerConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            audio: None,
            video: None,
            audio_manager: None,
            renderer: None,
            host: None,
            events: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn state(&self) -> PlaybackState {
        *self.inner.state.read()
    }

    /// Whether the session is currently playing
    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    /// Subscribe to this session's events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PlayerEvent> {
        self.inner.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.events
    }

    /// Current stream position according to the audio clock (seconds)
    pub fn position(&self) -> f64 {
        self.inner.clock.current_time(self.inner.host.now_ns())
    }

    /// Record a state change and publish it
    pub(super) fn set_state(&self, new_state: PlaybackState) {
        let old_state = {
            let mut state = self.inner.state.write();
            std::mem::replace(&mut *state, new_state)
        };
        if old_state == new_state {
            return;
        }

        info!("Playback state changed: {} -> {}", old_state, new_state);
        self.inner.events.emit_lossy(PlayerEvent::PlaybackStateChanged {
            session_id: self.inner.session_id,
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Spawn a worker for every parked decoder
    pub(super) fn start_workers(&self, session: &mut Session) {
        for decoder in session.parked.drain(..) {
            let (queue, counters) = match decoder.stream() {
                StreamKind::Audio => (&self.inner.audio_queue, &self.inner.audio_decode),
                StreamKind::Video => (&self.inner.video_queue, &self.inner.video_decode),
            };
            queue.reopen();
            session.workers.push(DecodeWorker::spawn(
                decoder,
                Arc::clone(queue),
                self.inner.config.max_consecutive_decode_errors,
                Arc::clone(counters),
                self.inner.fatal_tx.clone(),
            ));
        }
    }

    /// Stop every worker and park its decoder.
    ///
    /// Returns whether any worker was running. Queues are left closed.
    pub(super) async fn stop_workers(&self, session: &mut Session) -> Result<bool> {
        let had_workers = !session.workers.is_empty();
        for worker in session.workers.drain(..) {
            let outcome = worker.stop().await?;
            debug!(
                "{} worker joined ({:?})",
                outcome.decoder.stream(),
                outcome.exit
            );
            session.parked.push(outcome.decoder);
        }
        Ok(had_workers)
    }

    pub(super) fn start_presentation(&self, session: &mut Session) {
        if !self.inner.has_video || session.presentation.is_some() {
            return;
        }
        session.presentation = Some(PresentationTask::spawn(
            Arc::clone(&self.inner.sync),
            Arc::clone(&self.inner.clock),
            Arc::clone(&self.inner.host),
        ));
    }

    pub(super) async fn stop_presentation(&self, session: &mut Session) -> Result<()> {
        match session.presentation.take() {
            Some(task) => task.stop().await,
            None => Ok(()),
        }
    }

    /// Activate the audio session (once) and start callback delivery
    pub(super) fn start_audio_output(&self, session: &mut Session) -> Result<()> {
        let Some(manager) = &self.inner.audio_manager else {
            return Ok(());
        };
        if !session.audio_active {
            manager.activate()?;
            session.audio_active = true;
        }
        self.inner.output_active.store(true, Ordering::Release);
        if let Err(e) = manager.play() {
            self.inner.output_active.store(false, Ordering::Release);
            return Err(e);
        }
        if session.monitor.is_none() {
            let monitor = UnderrunMonitor::new(
                Arc::clone(&self.inner.output_counters),
                Arc::clone(&self.inner.output_active),
            );
            session.monitor = Some(monitor.spawn(crate::audio::monitor::DEFAULT_MONITOR_INTERVAL));
        }
        Ok(())
    }

    /// Gate the callback and suspend device delivery
    pub(super) fn pause_audio_output(&self) -> Result<()> {
        self.inner.output_active.store(false, Ordering::Release);
        match &self.inner.audio_manager {
            Some(manager) => manager.pause(),
            None => Ok(()),
        }
    }

    /// Fatal stream error from a worker: report it, then stop the session
    pub(super) async fn handle_fatal(&self, fatal: StreamFatalError) {
        if self.state() == PlaybackState::Stopped {
            debug!("Ignoring {} after stop", fatal);
            return;
        }

        self.inner.events.emit_lossy(PlayerEvent::StreamFatal {
            session_id: self.inner.session_id,
            stream: fatal.stream,
            reason: fatal.reason.clone(),
            timestamp: chrono::Utc::now(),
        });

        if let Err(e) = self.stop().await {
            warn!("Stop after fatal {} stream error failed: {}", fatal.stream, e);
        }
    }

    /// Report end of stream once every stream is decoded and consumed
    pub(super) fn check_end_of_stream(&self) {
        if self.state() != PlaybackState::Playing {
            return;
        }
        let audio_done = !self.inner.has_audio || self.inner.audio_queue.is_exhausted();
        let video_done = !self.inner.has_video || self.inner.video_queue.is_exhausted();
        if !(audio_done && video_done) {
            return;
        }
        if self.inner.eos_reported.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Session {} reached end of stream", self.inner.session_id);
        self.inner.events.emit_lossy(PlayerEvent::EndOfStream {
            session_id: self.inner.session_id,
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Route worker fatals to the engine and poll for end of stream.
///
/// Holds only a weak reference; exits when the engine is dropped.
fn spawn_supervisor(
    inner: Weak<EngineInner>,
    mut fatal_rx: mpsc::UnboundedReceiver<StreamFatalError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SUPERVISOR_INTERVAL);
        loop {
            tokio::select! {
                fatal = fatal_rx.recv() => {
                    let Some(fatal) = fatal else { break };
                    let Some(inner) = inner.upgrade() else { break };
                    PlaybackEngine { inner }.handle_fatal(fatal).await;
                }
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else { break };
                    PlaybackEngine { inner }.check_end_of_stream();
                }
            }
        }
        debug!("Session supervisor exited");
    })
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        // Last handle gone without stop(): release tasks without awaiting them
        let session = self.session.get_mut();
        self.output_active.store(false, Ordering::Release);
        for worker in &session.workers {
            worker.request_stop();
        }
        if let Some(task) = &session.presentation {
            task.request_stop();
        }
        for task in [session.monitor.take(), session.supervisor.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        if session.audio_active {
            if let Some(manager) = &self.audio_manager {
                let _ = manager.deactivate();
            }
        }
        debug!("Playback session {} released", self.session_id);
    }
}
