//! Generated audio and video streams
//!
//! Used by the headless binary and by tests that need a real pipeline without
//! media files: a sine tone for audio, a moving-bar pattern for video.

use super::{DecodeError, DecoderOptions, Packet, SourceError, StreamDecoder};
use crate::media::{Frame, PixelFormat, Plane};
use std::f32::consts::TAU;
use tracing::debug;
use vfp_common::timing::{frames_to_secs, secs_to_frames};
use vfp_common::StreamKind;

/// Sine tone, `frames_per_packet` PCM frames per packet
#[derive(Debug, Clone)]
pub struct SineToneDecoder {
    sample_rate: u32,
    channels: u16,
    frequency: f32,
    amplitude: f32,
    frames_per_packet: u32,
    total_frames: Option<u64>,
    position: u64,
}

impl SineToneDecoder {
    /// 440 Hz at -12 dBFS, 1024-frame packets, endless
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            frequency: 440.0,
            amplitude: 0.25,
            frames_per_packet: 1024,
            total_frames: None,
            position: 0,
        }
    }

    /// Stop after `secs` seconds of audio
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.total_frames = Some(secs_to_frames(secs, self.sample_rate));
        self
    }

    pub fn with_frequency(mut self, frequency: f32) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_frames_per_packet(mut self, frames: u32) -> Self {
        self.frames_per_packet = frames.max(1);
        self
    }
}

impl StreamDecoder for SineToneDecoder {
    fn stream(&self) -> StreamKind {
        StreamKind::Audio
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, SourceError> {
        let remaining = match self.total_frames {
            Some(total) if self.position >= total => return Ok(None),
            Some(total) => total - self.position,
            None => u64::MAX,
        };
        let frames = remaining.min(self.frames_per_packet as u64) as u32;

        let mut data = self.position.to_le_bytes().to_vec();
        data.extend_from_slice(&frames.to_le_bytes());

        let packet = Packet {
            stream: StreamKind::Audio,
            pts: frames_to_secs(self.position, self.sample_rate),
            data,
        };
        self.position += frames as u64;
        Ok(Some(packet))
    }

    fn decode(&mut self, packet: Packet) -> Result<Vec<Frame>, DecodeError> {
        let (start, frames) = parse_tone_packet(&packet.data)
            .ok_or_else(|| DecodeError::new(packet.pts, "truncated tone packet"))?;

        let channels = self.channels as usize;
        let step = TAU * self.frequency / self.sample_rate as f32;
        let mut samples = Vec::with_capacity(frames as usize * channels);
        for n in 0..frames as u64 {
            // Phase from absolute position keeps the tone continuous across seeks
            let phase = ((start + n) as f64 * step as f64) % std::f64::consts::TAU;
            let value = self.amplitude * (phase as f32).sin();
            samples.extend(std::iter::repeat(value).take(channels));
        }

        let frame = Frame::audio(packet.pts, samples, self.channels, self.sample_rate)
            .map_err(|e| DecodeError::new(packet.pts, e.to_string()))?;
        Ok(vec![frame])
    }

    fn seek(&mut self, target: f64) -> Result<(), SourceError> {
        let position = secs_to_frames(target, self.sample_rate);
        self.position = match self.total_frames {
            Some(total) => position.min(total),
            None => position,
        };
        Ok(())
    }
}

fn parse_tone_packet(data: &[u8]) -> Option<(u64, u32)> {
    let start = u64::from_le_bytes(data.get(0..8)?.try_into().ok()?);
    let frames = u32::from_le_bytes(data.get(8..12)?.try_into().ok()?);
    Some((start, frames))
}

/// Vertical bar sweeping across a grey Yuv420p picture, one frame per packet
#[derive(Debug, Clone)]
pub struct TestPatternDecoder {
    width: u32,
    height: u32,
    fps: f64,
    total_frames: Option<u64>,
    index: u64,
    deinterlace: bool,
}

impl TestPatternDecoder {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width: width.max(2),
            height: height.max(2),
            fps: if fps.is_finite() && fps > 0.0 { fps } else { 25.0 },
            total_frames: None,
            index: 0,
            deinterlace: true,
        }
    }

    /// Stop after `secs` seconds of video
    pub fn with_duration(mut self, secs: f64) -> Self {
        let frames = if secs.is_finite() && secs > 0.0 {
            (secs * self.fps).ceil() as u64
        } else {
            0
        };
        self.total_frames = Some(frames);
        self
    }

    /// Whether deinterlacing is applied (cleared by `disable_deinterlacing`)
    pub fn deinterlace(&self) -> bool {
        self.deinterlace
    }

    fn render_pattern(&self, index: u64) -> Vec<Plane> {
        let (w, h) = (self.width as usize, self.height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        let bar = (index as usize * 4) % w;

        let mut luma = vec![128u8; w * h];
        for row in luma.chunks_mut(w) {
            let end = (bar + 4).min(w);
            row[bar..end].fill(235);
        }

        vec![
            Plane {
                stride: w,
                data: luma,
            },
            Plane {
                stride: cw,
                data: vec![128; cw * ch],
            },
            Plane {
                stride: cw,
                data: vec![128; cw * ch],
            },
        ]
    }
}

impl StreamDecoder for TestPatternDecoder {
    fn stream(&self) -> StreamKind {
        StreamKind::Video
    }

    fn configure(&mut self, options: &DecoderOptions) {
        self.deinterlace = !options.disable_deinterlacing;
        debug!("Test pattern decoder: deinterlace={}", self.deinterlace);
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, SourceError> {
        if let Some(total) = self.total_frames {
            if self.index >= total {
                return Ok(None);
            }
        }

        let packet = Packet {
            stream: StreamKind::Video,
            pts: self.index as f64 / self.fps,
            data: self.index.to_le_bytes().to_vec(),
        };
        self.index += 1;
        Ok(Some(packet))
    }

    fn decode(&mut self, packet: Packet) -> Result<Vec<Frame>, DecodeError> {
        let index = packet
            .data
            .get(0..8)
            .and_then(|bytes| bytes.try_into().ok())
            .map(u64::from_le_bytes)
            .ok_or_else(|| DecodeError::new(packet.pts, "truncated pattern packet"))?;

        let frame = Frame::video(
            packet.pts,
            1.0 / self.fps,
            self.width,
            self.height,
            PixelFormat::Yuv420p,
            self.render_pattern(index),
        )
        .map_err(|e| DecodeError::new(packet.pts, e.to_string()))?;
        Ok(vec![frame])
    }

    fn seek(&mut self, target: f64) -> Result<(), SourceError> {
        if !target.is_finite() || target < 0.0 {
            return Err(SourceError::Seek {
                target,
                reason: "target out of range".to_string(),
            });
        }
        // Land on the frame containing the target
        let index = (target * self.fps).floor() as u64;
        self.index = match self.total_frames {
            Some(total) => index.min(total),
            None => index,
        };
        Ok(())
    }
}
