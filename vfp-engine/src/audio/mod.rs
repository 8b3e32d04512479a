//! Audio output: device abstraction, callback body and underrun monitor

pub mod manager;
pub mod monitor;
pub mod renderer;

pub use manager::{AudioManager, ManualAudioManager, OutputCallback, OutputFormat};
pub use monitor::UnderrunMonitor;
pub use renderer::{AudioRenderer, OutputCounters, OutputStats};

#[cfg(feature = "cpal-output")]
pub use manager::CpalAudioManager;
