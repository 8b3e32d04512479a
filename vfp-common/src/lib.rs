//! # VFP Common Library
//!
//! Shared code for the VFP playback crates including:
//! - Error types
//! - Playback state and event types (PlayerEvent, EventBus)
//! - Configuration file discovery
//! - Human-readable time formatting and media time conversions

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod timing;

pub use error::{Error, Result};
pub use events::{EventBus, PlaybackState, PlayerEvent, StreamKind};
