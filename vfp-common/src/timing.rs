//! Media time conversions
//!
//! The pipeline keeps stream time as `f64` seconds (presentation timestamps,
//! durations, the audio clock) and host time as monotonic nanoseconds. These
//! helpers convert between seconds, sample frames and `Duration`s without
//! panicking on negative or non-finite input.
//!
//! # Examples
//!
//! ```rust
//! use vfp_common::timing::*;
//!
//! assert_eq!(secs_to_frames(0.5, 48_000), 24_000);
//! assert_eq!(frames_to_secs(1024, 48_000), 1024.0 / 48_000.0);
//! assert_eq!(secs_to_duration(-3.0), std::time::Duration::ZERO);
//! ```

use std::time::Duration;

/// Nanoseconds per second
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Convert seconds to a whole number of sample frames (truncating).
///
/// Negative or non-finite input yields 0.
pub fn secs_to_frames(secs: f64, sample_rate: u32) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * sample_rate as f64) as u64
}

/// Convert a number of sample frames to seconds.
///
/// A zero sample rate yields 0.0 rather than infinity.
pub fn frames_to_secs(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

/// Convert seconds to a `Duration`, clamping negative and non-finite values to zero.
pub fn secs_to_duration(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(secs)
}

/// Convert nanoseconds of host time to seconds
pub fn nanos_to_secs(nanos: u64) -> f64 {
    nanos as f64 / NANOS_PER_SEC as f64
}

/// Convert seconds to nanoseconds of host time (saturating, negative → 0)
pub fn secs_to_nanos(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    let nanos = secs * NANOS_PER_SEC as f64;
    if nanos >= u64::MAX as f64 {
        u64::MAX
    } else {
        nanos as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_to_frames_common_rates() {
        assert_eq!(secs_to_frames(1.0, 44_100), 44_100);
        assert_eq!(secs_to_frames(1.0, 48_000), 48_000);
        assert_eq!(secs_to_frames(0.1, 48_000), 4_800);
    }

    #[test]
    fn test_invalid_inputs_clamp() {
        assert_eq!(secs_to_frames(-1.0, 48_000), 0);
        assert_eq!(secs_to_frames(f64::NAN, 48_000), 0);
        assert_eq!(frames_to_secs(100, 0), 0.0);
        assert_eq!(secs_to_duration(f64::INFINITY), Duration::ZERO);
        assert_eq!(secs_to_nanos(-0.5), 0);
        assert_eq!(secs_to_nanos(f64::MAX), u64::MAX);
    }

    #[test]
    fn test_nanos_roundtrip_within_precision() {
        let nanos = secs_to_nanos(1.25);
        assert_eq!(nanos, 1_250_000_000);
        assert_eq!(nanos_to_secs(nanos), 1.25);
    }
}
