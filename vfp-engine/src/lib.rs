//! # VFP Playback Engine (vfp-engine)
//!
//! Audio-mastered video playback core.
//!
//! **Purpose:** Decode audio and video streams on background tasks, buffer
//! decoded frames in duration-bounded queues, drive audio output from a
//! device callback and present video frames in step with the audio clock.
//!
//! **Architecture:** one decode worker per stream feeding a [`FrameQueue`];
//! the audio output callback consumes audio frames and advances the
//! [`AudioClock`]; the presentation task compares video timestamps against
//! that clock. [`PlaybackEngine`] owns the session and its transitions.
//!
//! [`FrameQueue`]: playback::FrameQueue
//! [`AudioClock`]: playback::AudioClock

pub mod audio;
pub mod config;
pub mod error;
pub mod media;
pub mod playback;
pub mod render;
pub mod source;

pub use config::{PlayerConfig, SyncConfig};
pub use error::{Error, Result};
pub use media::{Frame, FramePayload, PixelFormat, Plane};
pub use playback::{PlaybackDiagnostics, PlaybackEngine};
pub use render::{HeadlessRenderer, VideoRenderer};
pub use source::{DecodeError, DecoderOptions, Packet, SourceError, StreamDecoder};
pub use vfp_common::{EventBus, PlaybackState, PlayerEvent, StreamKind};
