//! Audio session and output device abstraction
//!
//! The engine drives audio output through [`AudioManager`]:
//! - `activate` / `deactivate` bracket the platform audio session
//! - `set_output_callback` installs the function the device calls to fill
//!   each interleaved `f32` buffer
//! - `play` / `pause` start and suspend callback delivery
//!
//! Output volume and route selection are left to the platform mixer.
//!
//! [`ManualAudioManager`] delivers callbacks only when its owner pulls, which
//! makes the whole pipeline deterministic in tests; with
//! [`ManualAudioManager::spawn_driver`] it stands in for a device clocked by
//! a tokio timer. `CpalAudioManager` (feature `cpal-output`) drives a real
//! output device.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Device callback: fill an interleaved buffer of `len / channels` PCM frames
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Negotiated device format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Platform audio session and output device
pub trait AudioManager: Send + Sync {
    /// Acquire the audio session
    fn activate(&self) -> Result<()>;

    /// Release the audio session; stops callbacks
    fn deactivate(&self) -> Result<()>;

    /// Install the buffer-fill callback (replaces any previous one)
    fn set_output_callback(&self, callback: OutputCallback) -> Result<()>;

    /// Start delivering callbacks; requires an active session
    fn play(&self) -> Result<()>;

    /// Stop delivering callbacks
    fn pause(&self) -> Result<()>;

    /// Callbacks are currently being delivered
    fn is_playing(&self) -> bool;

    fn output_format(&self) -> OutputFormat;
}

/// Frames of scratch the device callback converts through per chunk
#[cfg_attr(not(feature = "cpal-output"), allow(dead_code))]
const SCRATCH_FRAMES: usize = 4096;

/// Fill a device buffer of any sample type through a fixed `f32` scratch,
/// one scratch-sized chunk at a time. Nothing is allocated.
#[cfg_attr(not(feature = "cpal-output"), allow(dead_code))]
fn fill_converted<T>(
    data: &mut [T],
    scratch: &mut [f32],
    mut fill: impl FnMut(&mut [f32]),
    convert: impl Fn(f32) -> T,
) {
    if scratch.is_empty() {
        return;
    }
    for chunk in data.chunks_mut(scratch.len()) {
        let buffer = &mut scratch[..chunk.len()];
        fill(buffer);
        for (out, sample) in chunk.iter_mut().zip(buffer.iter()) {
            *out = convert(*sample);
        }
    }
}

struct ManualState {
    active: bool,
    playing: bool,
    callback: Option<OutputCallback>,
}

/// Audio manager whose callbacks are driven by [`ManualAudioManager::pull`]
pub struct ManualAudioManager {
    format: OutputFormat,
    state: Mutex<ManualState>,
}

impl ManualAudioManager {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            state: Mutex::new(ManualState {
                active: false,
                playing: false,
                callback: None,
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Run one device callback for `frames` PCM frames.
    ///
    /// Returns the interleaved buffer; silence when not playing or no
    /// callback is installed.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames * self.format.channels as usize];
        self.pull_into(&mut buffer);
        buffer
    }

    /// [`ManualAudioManager::pull`] into a caller-owned buffer; returns
    /// whether the callback ran
    pub fn pull_into(&self, buffer: &mut [f32]) -> bool {
        let mut state = self.state.lock();
        if !state.playing {
            buffer.fill(0.0);
            return false;
        }
        match state.callback.as_mut() {
            Some(callback) => {
                callback(buffer);
                true
            }
            None => {
                buffer.fill(0.0);
                false
            }
        }
    }

    /// Pull `period` worth of frames every `period` on a tokio task, like a
    /// device with that buffer duration
    pub fn spawn_driver(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        let frames = ((period.as_secs_f64() * self.format.sample_rate as f64).round() as usize).max(1);
        info!(
            "Manual audio driver: {} frames every {:?} at {} Hz",
            frames, period, self.format.sample_rate
        );

        tokio::spawn(async move {
            let mut buffer = vec![0.0f32; frames * self.format.channels as usize];
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.pull_into(&mut buffer);
            }
        })
    }
}

impl AudioManager for ManualAudioManager {
    fn activate(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.active {
            state.active = true;
            debug!("Audio session activated");
        }
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.playing = false;
        if state.active {
            state.active = false;
            debug!("Audio session deactivated");
        }
        Ok(())
    }

    fn set_output_callback(&self, callback: OutputCallback) -> Result<()> {
        self.state.lock().callback = Some(callback);
        Ok(())
    }

    fn play(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.active {
            return Err(Error::AudioOutput(
                "cannot start output: audio session not active".to_string(),
            ));
        }
        if state.callback.is_none() {
            return Err(Error::AudioOutput(
                "cannot start output: no output callback installed".to_string(),
            ));
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.state.lock().playing = false;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn output_format(&self) -> OutputFormat {
        self.format
    }
}

#[cfg(feature = "cpal-output")]
pub use cpal_output::CpalAudioManager;

#[cfg(feature = "cpal-output")]
mod cpal_output {
    //! Real output device through cpal.
    //!
    //! `cpal::Stream` cannot cross threads, so the stream lives on a dedicated
    //! thread for the lifetime of the session and is driven by commands.

    use super::{fill_converted, AudioManager, OutputCallback, OutputFormat, SCRATCH_FRAMES};
    use crate::error::{Error, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, Stream, StreamConfig};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use tracing::{debug, error, info, warn};

    type SharedCallback = Arc<Mutex<Option<OutputCallback>>>;

    enum Command {
        Play(mpsc::Sender<Result<()>>),
        Pause(mpsc::Sender<Result<()>>),
        Shutdown,
    }

    struct Session {
        commands: mpsc::Sender<Command>,
        thread: JoinHandle<()>,
    }

    /// Audio manager backed by the default cpal output device
    pub struct CpalAudioManager {
        format: OutputFormat,
        sample_format: SampleFormat,
        callback: SharedCallback,
        session: Mutex<Option<Session>>,
        playing: AtomicBool,
        error_flag: Arc<AtomicBool>,
        error_count: Arc<AtomicU32>,
    }

    impl CpalAudioManager {
        /// Query the default output device and record its format
        pub fn new() -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
            let supported = device
                .default_output_config()
                .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

            let format = OutputFormat {
                sample_rate: supported.sample_rate().0,
                channels: supported.channels(),
            };
            info!(
                "Using audio device {} ({} Hz, {} channels, {:?})",
                device.name().unwrap_or_else(|_| "Unknown".to_string()),
                format.sample_rate,
                format.channels,
                supported.sample_format()
            );

            Ok(Self {
                format,
                sample_format: supported.sample_format(),
                callback: Arc::new(Mutex::new(None)),
                session: Mutex::new(None),
                playing: AtomicBool::new(false),
                error_flag: Arc::new(AtomicBool::new(false)),
                error_count: Arc::new(AtomicU32::new(0)),
            })
        }

        /// Stream error reported since the last check
        pub fn has_error(&self) -> bool {
            self.error_flag.load(Ordering::SeqCst)
        }

        pub fn error_count(&self) -> u32 {
            self.error_count.load(Ordering::SeqCst)
        }

        fn send(&self, make: impl FnOnce(mpsc::Sender<Result<()>>) -> Command) -> Result<()> {
            let session = self.session.lock();
            let session = session.as_ref().ok_or_else(|| {
                Error::AudioOutput("audio session not active".to_string())
            })?;

            let (reply_tx, reply_rx) = mpsc::channel();
            session
                .commands
                .send(make(reply_tx))
                .map_err(|_| Error::AudioOutput("audio thread exited".to_string()))?;
            reply_rx
                .recv()
                .map_err(|_| Error::AudioOutput("audio thread exited".to_string()))?
        }
    }

    impl AudioManager for CpalAudioManager {
        fn activate(&self) -> Result<()> {
            let mut session = self.session.lock();
            if session.is_some() {
                return Ok(());
            }

            let (commands, receiver) = mpsc::channel();
            let worker = StreamThread {
                channels: self.format.channels,
                sample_rate: self.format.sample_rate,
                sample_format: self.sample_format,
                callback: Arc::clone(&self.callback),
                error_flag: Arc::clone(&self.error_flag),
                error_count: Arc::clone(&self.error_count),
            };
            let thread = std::thread::Builder::new()
                .name("vfp-audio-output".to_string())
                .spawn(move || worker.run(receiver))?;

            *session = Some(Session { commands, thread });
            debug!("Audio session activated");
            Ok(())
        }

        fn deactivate(&self) -> Result<()> {
            self.playing.store(false, Ordering::SeqCst);
            let Some(session) = self.session.lock().take() else {
                return Ok(());
            };
            let _ = session.commands.send(Command::Shutdown);
            if session.thread.join().is_err() {
                warn!("Audio output thread panicked during shutdown");
            }
            debug!("Audio session deactivated");
            Ok(())
        }

        fn set_output_callback(&self, callback: OutputCallback) -> Result<()> {
            *self.callback.lock() = Some(callback);
            Ok(())
        }

        fn play(&self) -> Result<()> {
            self.send(Command::Play)?;
            self.playing.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn pause(&self) -> Result<()> {
            self.send(Command::Pause)?;
            self.playing.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }

        fn output_format(&self) -> OutputFormat {
            self.format
        }
    }

    impl Drop for CpalAudioManager {
        fn drop(&mut self) {
            let _ = self.deactivate();
        }
    }

    struct StreamThread {
        channels: u16,
        sample_rate: u32,
        sample_format: SampleFormat,
        callback: SharedCallback,
        error_flag: Arc<AtomicBool>,
        error_count: Arc<AtomicU32>,
    }

    impl StreamThread {
        fn run(self, commands: mpsc::Receiver<Command>) {
            let mut stream: Option<Stream> = None;

            while let Ok(command) = commands.recv() {
                match command {
                    Command::Play(reply) => {
                        let result = match stream.as_ref() {
                            Some(stream) => stream.play().map_err(|e| {
                                Error::AudioOutput(format!("Failed to start stream: {}", e))
                            }),
                            None => self.build_stream().and_then(|built| {
                                built.play().map_err(|e| {
                                    Error::AudioOutput(format!("Failed to start stream: {}", e))
                                })?;
                                stream = Some(built);
                                Ok(())
                            }),
                        };
                        let _ = reply.send(result);
                    }
                    Command::Pause(reply) => {
                        let result = match stream.as_ref() {
                            Some(stream) => stream.pause().map_err(|e| {
                                Error::AudioOutput(format!("Failed to pause stream: {}", e))
                            }),
                            None => Ok(()),
                        };
                        let _ = reply.send(result);
                    }
                    Command::Shutdown => break,
                }
            }
            drop(stream);
        }

        fn build_stream(&self) -> Result<Stream> {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
            let config = StreamConfig {
                channels: self.channels,
                sample_rate: cpal::SampleRate(self.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            match self.sample_format {
                SampleFormat::F32 => self.build::<f32>(&device, &config, |s| s),
                SampleFormat::I16 => self.build::<i16>(&device, &config, |s| {
                    (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                }),
                SampleFormat::U16 => self.build::<u16>(&device, &config, |s| {
                    ((s.clamp(-1.0, 1.0) * 0.5 + 0.5) * u16::MAX as f32) as u16
                }),
                other => Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                ))),
            }
        }

        fn build<T>(
            &self,
            device: &cpal::Device,
            config: &StreamConfig,
            convert: fn(f32) -> T,
        ) -> Result<Stream>
        where
            T: cpal::SizedSample + Send + 'static,
        {
            let callback = Arc::clone(&self.callback);
            let error_flag = Arc::clone(&self.error_flag);
            let error_count = Arc::clone(&self.error_count);
            let mut scratch = vec![0.0f32; SCRATCH_FRAMES * self.channels.max(1) as usize];

            device
                .build_output_stream(
                    config,
                    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                        let mut installed = callback.lock();
                        match installed.as_mut() {
                            Some(fill) => {
                                fill_converted(data, &mut scratch, |b| fill(b), convert)
                            }
                            None => {
                                fill_converted(data, &mut scratch, |b| b.fill(0.0), convert)
                            }
                        }
                    },
                    move |err| {
                        error!("Audio stream error: {}", err);
                        error_flag.store(true, Ordering::SeqCst);
                        error_count.fetch_add(1, Ordering::SeqCst);
                    },
                    None,
                )
                .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
        }
    }
}
