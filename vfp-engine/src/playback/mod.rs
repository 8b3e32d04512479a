//! Playback pipeline: frame queues, decode workers, audio clock, A/V sync
//! and the session state machine

pub mod clock;
pub mod decode_worker;
pub mod engine;
pub mod frame_queue;
pub mod sync;

pub use clock::{AudioClock, ClockSnapshot, HostClock, ManualHostClock, SystemHostClock};
pub use decode_worker::{DecodeStats, DecodeWorker, StreamFatalError, WorkerExit, WorkerOutcome};
pub use engine::{EngineBuilder, PlaybackDiagnostics, PlaybackEngine, StreamDiagnostics};
pub use frame_queue::{FrameQueue, PushOutcome, QueueStats};
pub use sync::{PresentationTask, SyncController, SyncDecision, SyncMetrics};
