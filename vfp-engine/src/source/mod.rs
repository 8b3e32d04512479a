//! Stream decoder interface
//!
//! Demuxing and codec work live outside the engine. Each stream is fed by a
//! [`StreamDecoder`] that hands out compressed packets and turns them into
//! [`Frame`]s. The decode worker calls these methods inline from its task, so
//! implementations should return promptly (one packet's worth of work).

pub mod synthetic;

use crate::media::Frame;
use thiserror::Error;
use vfp_common::StreamKind;

pub use synthetic::{SineToneDecoder, TestPatternDecoder};

/// Compressed unit handed from the source to the decoder
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream: StreamKind,
    /// Presentation timestamp of the first frame this packet decodes to
    pub pts: f64,
    pub data: Vec<u8>,
}

/// Options forwarded to decoders when a session opens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    pub disable_deinterlacing: bool,
}

/// Source cannot be read or repositioned; ends the stream
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("read failed: {0}")]
    Read(String),

    #[error("seek to {target:.3}s failed: {reason}")]
    Seek { target: f64, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A single packet could not be decoded; the stream may continue
#[derive(Debug, Error)]
#[error("packet at {pts:.3}s: {reason}")]
pub struct DecodeError {
    pub pts: f64,
    pub reason: String,
}

impl DecodeError {
    pub fn new(pts: f64, reason: impl Into<String>) -> Self {
        Self {
            pts,
            reason: reason.into(),
        }
    }
}

/// Packet source plus decoder for one stream
pub trait StreamDecoder: Send {
    fn stream(&self) -> StreamKind;

    /// Apply session options; called once before the first packet
    fn configure(&mut self, _options: &DecoderOptions) {}

    /// Next packet, or `Ok(None)` at end of stream
    fn read_packet(&mut self) -> Result<Option<Packet>, SourceError>;

    /// Decode one packet into zero or more frames in presentation order
    fn decode(&mut self, packet: Packet) -> Result<Vec<Frame>, DecodeError>;

    /// Reposition so the next packet starts at or before `target` seconds
    fn seek(&mut self, target: f64) -> Result<(), SourceError>;
}
