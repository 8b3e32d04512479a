//! Error types for vfp-engine
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Per-packet decode failures and unreadable sources have their own types in
//! [`crate::source`]; they only surface here once they end a session.

use crate::source::{DecodeError, SourceError};
use thiserror::Error;
use vfp_common::StreamKind;

/// Main error type for vfp-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Shared-crate errors (config discovery, TOML parsing)
    #[error(transparent)]
    Common(#[from] vfp_common::Error),

    /// Configuration values out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Frame construction rejected (bad timing or payload layout)
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Caller-supplied argument rejected (e.g. negative seek target)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the current playback state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Stream source could not be read or repositioned
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Single packet failed to decode
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A stream failed beyond recovery
    #[error("Fatal {stream} stream error: {reason}")]
    StreamFatal { stream: StreamKind, reason: String },

    /// Audio session or output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using vfp-engine Error
pub type Result<T> = std::result::Result<T, Error>;
