//! Decoded media frames
//!
//! A [`Frame`] is one decoded unit of a single stream: a block of
//! interleaved PCM for audio, or one picture for video. Frames are validated
//! on construction and immutable afterwards; they move from the decode
//! worker into a queue and from the queue into whoever consumes them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use vfp_common::StreamKind;

/// Pixel layout of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar Y, U, V with 2x2 chroma subsampling
    Yuv420p,
    /// Single packed plane, 4 bytes per pixel
    Rgba,
}

impl PixelFormat {
    /// Number of planes this format carries
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Yuv420p => 3,
            PixelFormat::Rgba => 1,
        }
    }

    /// Minimum (bytes per row, rows) of plane `index` for a picture of the given size
    fn plane_extent(self, index: usize, width: u32, height: u32) -> (usize, usize) {
        let (w, h) = (width as usize, height as usize);
        match (self, index) {
            (PixelFormat::Rgba, _) => (w * 4, h),
            (PixelFormat::Yuv420p, 0) => (w, h),
            (PixelFormat::Yuv420p, _) => (w.div_ceil(2), h.div_ceil(2)),
        }
    }
}

/// One plane of picture data
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    /// Bytes per row (may exceed the visible width)
    pub stride: usize,
    /// Row-major bytes, `stride * rows` long
    pub data: Vec<u8>,
}

/// Frame contents
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// Interleaved f32 PCM
    Audio {
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
    },
    /// Picture planes
    Video {
        width: u32,
        height: u32,
        format: PixelFormat,
        planes: Vec<Plane>,
    },
}

/// Decoded frame with presentation timing
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    stream: StreamKind,
    pts: f64,
    duration: f64,
    payload: FramePayload,
}

impl Frame {
    /// Build an audio frame; its duration is derived from the sample count
    pub fn audio(pts: f64, samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self> {
        check_time("pts", pts)?;
        if channels == 0 {
            return Err(Error::InvalidFrame("audio channel count is zero".to_string()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidFrame("audio sample rate is zero".to_string()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(Error::InvalidFrame(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }

        let frames = (samples.len() / channels as usize) as u64;
        let duration = vfp_common::timing::frames_to_secs(frames, sample_rate);

        Ok(Self {
            stream: StreamKind::Audio,
            pts,
            duration,
            payload: FramePayload::Audio {
                samples,
                channels,
                sample_rate,
            },
        })
    }

    /// Build a video frame, checking plane count and sizes against the format
    pub fn video(
        pts: f64,
        duration: f64,
        width: u32,
        height: u32,
        format: PixelFormat,
        planes: Vec<Plane>,
    ) -> Result<Self> {
        check_time("pts", pts)?;
        check_time("duration", duration)?;
        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "empty picture {}x{}",
                width, height
            )));
        }
        if planes.len() != format.plane_count() {
            return Err(Error::InvalidFrame(format!(
                "{:?} needs {} planes, got {}",
                format,
                format.plane_count(),
                planes.len()
            )));
        }

        for (index, plane) in planes.iter().enumerate() {
            let (row_bytes, rows) = format.plane_extent(index, width, height);
            if plane.stride < row_bytes {
                return Err(Error::InvalidFrame(format!(
                    "plane {} stride {} shorter than row ({} bytes)",
                    index, plane.stride, row_bytes
                )));
            }
            if plane.data.len() != plane.stride * rows {
                return Err(Error::InvalidFrame(format!(
                    "plane {} holds {} bytes, expected {} ({} rows of {})",
                    index,
                    plane.data.len(),
                    plane.stride * rows,
                    rows,
                    plane.stride
                )));
            }
        }

        Ok(Self {
            stream: StreamKind::Video,
            pts,
            duration,
            payload: FramePayload::Video {
                width,
                height,
                format,
                planes,
            },
        })
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    /// Presentation timestamp (seconds on the stream timeline)
    pub fn pts(&self) -> f64 {
        self.pts
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Presentation timestamp of the end of this frame
    pub fn end_pts(&self) -> f64 {
        self.pts + self.duration
    }

    pub fn payload(&self) -> &FramePayload {
        &self.payload
    }

    pub fn into_payload(self) -> FramePayload {
        self.payload
    }

    /// Number of PCM frames (samples per channel) for audio, 0 for video
    pub fn sample_frames(&self) -> usize {
        match &self.payload {
            FramePayload::Audio {
                samples, channels, ..
            } => samples.len() / *channels as usize,
            FramePayload::Video { .. } => 0,
        }
    }
}

fn check_time(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidFrame(format!(
            "{} must be finite and non-negative (got {})",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_plane(width: usize, height: usize) -> Plane {
        Plane {
            stride: width * 4,
            data: vec![0; width * 4 * height],
        }
    }

    #[test]
    fn test_audio_duration_from_samples() {
        let frame = Frame::audio(1.0, vec![0.0; 2 * 480], 2, 48_000).unwrap();
        assert_eq!(frame.stream(), StreamKind::Audio);
        assert_eq!(frame.sample_frames(), 480);
        assert!((frame.duration() - 0.01).abs() < 1e-12);
        assert!((frame.end_pts() - 1.01).abs() < 1e-12);
    }

    #[test]
    fn test_audio_rejects_partial_frame() {
        let result = Frame::audio(0.0, vec![0.0; 5], 2, 48_000);
        assert!(matches!(result, Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_rejects_negative_or_nan_timing() {
        assert!(Frame::audio(-0.1, vec![0.0; 2], 2, 48_000).is_err());
        assert!(Frame::video(
            f64::NAN,
            0.04,
            2,
            2,
            PixelFormat::Rgba,
            vec![rgba_plane(2, 2)]
        )
        .is_err());
        assert!(Frame::video(
            0.0,
            -0.04,
            2,
            2,
            PixelFormat::Rgba,
            vec![rgba_plane(2, 2)]
        )
        .is_err());
    }

    #[test]
    fn test_yuv420p_odd_dimensions() {
        // 5x3 picture: chroma planes are 3x2
        let planes = vec![
            Plane {
                stride: 8,
                data: vec![16; 8 * 3],
            },
            Plane {
                stride: 3,
                data: vec![128; 3 * 2],
            },
            Plane {
                stride: 3,
                data: vec![128; 3 * 2],
            },
        ];
        let frame = Frame::video(0.5, 0.04, 5, 3, PixelFormat::Yuv420p, planes).unwrap();
        assert_eq!(frame.stream(), StreamKind::Video);
        assert_eq!(frame.sample_frames(), 0);
    }

    #[test]
    fn test_video_plane_mismatch_rejected() {
        let result = Frame::video(0.0, 0.04, 4, 4, PixelFormat::Yuv420p, vec![rgba_plane(4, 4)]);
        assert!(matches!(result, Err(Error::InvalidFrame(_))));

        let short = Plane {
            stride: 16,
            data: vec![0; 16 * 3],
        };
        let result = Frame::video(0.0, 0.04, 4, 4, PixelFormat::Rgba, vec![short]);
        assert!(matches!(result, Err(Error::InvalidFrame(_))));
    }
}
