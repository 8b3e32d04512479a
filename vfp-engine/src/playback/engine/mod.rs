//! Playback engine - the session state machine
//!
//! **Module Structure:**
//! - `core.rs`: Session construction, shared state, supervisor
//! - `playback.rs`: Transitions (play, pause, seek, stop)
//! - `diagnostics.rs`: Status accessors and snapshots

mod core;
mod diagnostics;
mod playback;

pub use self::core::{EngineBuilder, PlaybackEngine};
pub use self::diagnostics::{PlaybackDiagnostics, StreamDiagnostics};
