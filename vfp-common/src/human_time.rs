//! Human-readable media position formatting
//!
//! Positions are seconds on the stream timeline. Formatting is used by log
//! lines and the diagnostics output, never for parsing.

/// Positions at or above this many seconds gain an hours field
const HOURS_FORMAT_MIN: f64 = 3600.0;

/// Format a stream position in seconds.
///
/// - Under one hour: `M:SS.mmm`
/// - One hour or more: `H:MM:SS.mmm`
/// - Negative values keep a leading `-`
/// - Non-finite values render as `--:--`
///
/// # Examples
///
/// ```
/// use vfp_common::human_time::format_position;
///
/// assert_eq!(format_position(0.0), "0:00.000");
/// assert_eq!(format_position(30.0), "0:30.000");
/// assert_eq!(format_position(83.25), "1:23.250");
/// assert_eq!(format_position(3723.5), "1:02:03.500");
/// assert_eq!(format_position(-1.5), "-0:01.500");
/// assert_eq!(format_position(f64::NAN), "--:--");
/// ```
pub fn format_position(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "--:--".to_string();
    }

    let is_negative = seconds < 0.0;
    let total_millis = (seconds.abs() * 1000.0).round() as u64;

    let millis = total_millis % 1000;
    let total_secs = total_millis / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;

    let formatted = if seconds.abs() >= HOURS_FORMAT_MIN {
        let hours = total_mins / 60;
        let mins = total_mins % 60;
        format!("{}:{:02}:{:02}.{:03}", hours, mins, secs, millis)
    } else {
        format!("{}:{:02}.{:03}", total_mins, secs, millis)
    };

    if is_negative {
        format!("-{}", formatted)
    } else {
        formatted
    }
}

/// Format a signed drift (video pts minus clock) in milliseconds, e.g. `+12.5ms`
pub fn format_drift(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "n/a".to_string();
    }
    format!("{:+.1}ms", seconds * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_format() {
        assert_eq!(format_position(0.0), "0:00.000");
        assert_eq!(format_position(59.999), "0:59.999");
        assert_eq!(format_position(600.0), "10:00.000");
        assert_eq!(format_position(3599.0), "59:59.000");
    }

    #[test]
    fn test_hours_format() {
        assert_eq!(format_position(3600.0), "1:00:00.000");
        assert_eq!(format_position(7322.125), "2:02:02.125");
    }

    #[test]
    fn test_rounding_carries_into_seconds() {
        assert_eq!(format_position(1.9996), "0:02.000");
    }

    #[test]
    fn test_drift_format() {
        assert_eq!(format_drift(0.0125), "+12.5ms");
        assert_eq!(format_drift(-0.2), "-200.0ms");
        assert_eq!(format_drift(f64::INFINITY), "n/a");
    }
}
