//! Playback session configuration
//!
//! `PlayerConfig` is read from a TOML file (see [`vfp_common::config`] for
//! discovery) and every field has a built-in default, so an empty file or no
//! file at all yields a working configuration.
//!
//! ```toml
//! min_buffered_duration = 0.2
//! max_buffered_duration = 0.4
//! disable_deinterlacing = false
//!
//! [sync]
//! present_tolerance = 0.033
//! drop_threshold = 0.1
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Session configuration supplied when the session is opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Workers resume decoding once a queue drains below this (seconds)
    pub min_buffered_duration: f64,

    /// Workers stop decoding once a queue holds this much (seconds)
    pub max_buffered_duration: f64,

    /// Forwarded to the video decoder
    pub disable_deinterlacing: bool,

    /// Consecutive per-packet decode failures tolerated before a stream is fatal
    pub max_consecutive_decode_errors: u32,

    /// Event bus channel capacity
    pub event_capacity: usize,

    /// Presentation timing policy
    pub sync: SyncConfig,
}

/// Video presentation timing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Frames within this distance of the clock are presented (seconds)
    pub present_tolerance: f64,

    /// Frames later than this behind the clock are dropped (seconds)
    pub drop_threshold: f64,

    /// Longest single wait for an early frame (seconds)
    pub max_wait: f64,

    /// Upper bound on drops in one evaluation
    pub max_drops_per_cycle: u32,

    /// Presentation task tick (seconds)
    pub tick_interval: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            min_buffered_duration: 0.2,
            max_buffered_duration: 0.4,
            disable_deinterlacing: false,
            max_consecutive_decode_errors: 5,
            event_capacity: 256,
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            present_tolerance: 0.033,
            drop_threshold: 0.1,
            max_wait: 0.05,
            max_drops_per_cycle: 4,
            tick_interval: 0.01,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: PlayerConfig = vfp_common::config::read_config_file(path)?;
        config.validated()
    }

    /// Parse configuration from a TOML string and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PlayerConfig = toml::from_str(content)?;
        config.validated()
    }

    /// Validate, normalizing a reversed buffer window.
    ///
    /// A maximum below the minimum is replaced with twice the minimum.
    pub fn validated(mut self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// In-place form of [`PlayerConfig::validated`]
    pub fn validate(&mut self) -> Result<()> {
        check_non_negative("min_buffered_duration", self.min_buffered_duration)?;
        check_non_negative("max_buffered_duration", self.max_buffered_duration)?;

        if self.max_buffered_duration < self.min_buffered_duration {
            let adjusted = self.min_buffered_duration * 2.0;
            warn!(
                "max_buffered_duration {:.3}s below min_buffered_duration {:.3}s, using {:.3}s",
                self.max_buffered_duration, self.min_buffered_duration, adjusted
            );
            self.max_buffered_duration = adjusted;
        }

        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }

        self.sync.validate()
    }
}

impl SyncConfig {
    fn validate(&self) -> Result<()> {
        check_non_negative("sync.present_tolerance", self.present_tolerance)?;
        check_non_negative("sync.drop_threshold", self.drop_threshold)?;
        check_non_negative("sync.max_wait", self.max_wait)?;
        check_non_negative("sync.tick_interval", self.tick_interval)?;

        if self.drop_threshold < self.present_tolerance {
            return Err(Error::Config(format!(
                "sync.drop_threshold ({}) must not be below sync.present_tolerance ({})",
                self.drop_threshold, self.present_tolerance
            )));
        }
        if self.tick_interval == 0.0 {
            return Err(Error::Config("sync.tick_interval must be positive".to_string()));
        }
        if self.max_drops_per_cycle == 0 {
            return Err(Error::Config(
                "sync.max_drops_per_cycle must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Config(format!(
            "{} must be a finite, non-negative number of seconds (got {})",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlayerConfig::default().validated().unwrap();
        assert_eq!(config.min_buffered_duration, 0.2);
        assert_eq!(config.max_buffered_duration, 0.4);
        assert_eq!(config.max_consecutive_decode_errors, 5);
        assert_eq!(config.sync.max_drops_per_cycle, 4);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = PlayerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlayerConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_fields() {
        let config = PlayerConfig::from_toml_str(
            "min_buffered_duration = 0.5\nmax_buffered_duration = 2.0\n[sync]\nmax_wait = 0.02\n",
        )
        .unwrap();
        assert_eq!(config.min_buffered_duration, 0.5);
        assert_eq!(config.max_buffered_duration, 2.0);
        assert_eq!(config.sync.max_wait, 0.02);
        assert_eq!(config.sync.present_tolerance, 0.033);
    }

    #[test]
    fn test_max_below_min_is_doubled() {
        let mut config = PlayerConfig {
            min_buffered_duration: 1.0,
            max_buffered_duration: 0.5,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.max_buffered_duration, 2.0);
    }

    #[test]
    fn test_negative_and_nan_rejected() {
        let config = PlayerConfig {
            min_buffered_duration: -0.1,
            ..Default::default()
        };
        assert!(matches!(config.validated(), Err(Error::Config(_))));

        let mut config = PlayerConfig::default();
        config.sync.drop_threshold = f64::NAN;
        assert!(matches!(config.validated(), Err(Error::Config(_))));
    }

    #[test]
    fn test_drop_threshold_below_tolerance_rejected() {
        let mut config = PlayerConfig::default();
        config.sync.drop_threshold = 0.01;
        assert!(config.validated().is_err());
    }
}
