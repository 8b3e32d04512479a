//! Playback state and event types
//!
//! The playback engine reports every externally observable side effect
//! (state transitions, fatal stream errors, drain, sync warnings) as a
//! [`PlayerEvent`] on an [`EventBus`].

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Playback state enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Session opened, nothing started yet
    Idle,
    /// Audio output and video presentation running
    Playing,
    /// Output suspended, clock frozen
    Paused,
    /// Transient: queues flushed, source repositioning
    Seeking,
    /// Terminal: session torn down
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Seeking => write!(f, "seeking"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Media stream kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Audio,
    Video,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Video => write!(f, "video"),
        }
    }
}

/// Player event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Playback state changed
    PlaybackStateChanged {
        /// Session that changed state
        session_id: Uuid,
        /// Playback state before change
        old_state: PlaybackState,
        /// Playback state after change
        new_state: PlaybackState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Seek finished; the clock now reads `position_secs`
    SeekCompleted {
        session_id: Uuid,
        position_secs: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A stream failed beyond recovery; the session is stopping
    StreamFatal {
        session_id: Uuid,
        stream: StreamKind,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every stream has been decoded and consumed
    EndOfStream {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Video stayed behind the audio clock after a full drop cycle
    SyncWarning {
        session_id: Uuid,
        /// How far the last examined frame lagged the clock (seconds)
        behind_secs: f64,
        /// Frames dropped in the cycle that raised the warning
        dropped: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            PlayerEvent::PlaybackStateChanged { session_id, .. }
            | PlayerEvent::SeekCompleted { session_id, .. }
            | PlayerEvent::StreamFatal { session_id, .. }
            | PlayerEvent::EndOfStream { session_id, .. }
            | PlayerEvent::SyncWarning { session_id, .. } => *session_id,
        }
    }

    /// Event type name (matches the serialized `type` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::SeekCompleted { .. } => "SeekCompleted",
            PlayerEvent::StreamFatal { .. } => "StreamFatal",
            PlayerEvent::EndOfStream { .. } => "EndOfStream",
            PlayerEvent::SyncWarning { .. } => "SyncWarning",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use vfp_common::events::{EventBus, PlayerEvent, PlaybackState};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit(PlayerEvent::PlaybackStateChanged {
///     session_id: uuid::Uuid::nil(),
///     old_state: PlaybackState::Idle,
///     new_state: PlaybackState::Playing,
///     timestamp: chrono::Utc::now(),
/// }).ok();
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_state_serializes_lowercase() {
        let json = serde_json::to_string(&PlaybackState::Seeking).unwrap();
        assert_eq!(json, "\"seeking\"");
        assert_eq!(PlaybackState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PlayerEvent::StreamFatal {
            session_id: Uuid::nil(),
            stream: StreamKind::Video,
            reason: "too many decode errors".to_string(),
            timestamp: chrono::Utc::now(),
        };

        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "StreamFatal");
        assert_eq!(value["stream"], "video");
        assert_eq!(event.event_type(), "StreamFatal");
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(4);
        let result = bus.emit(PlayerEvent::EndOfStream {
            session_id: Uuid::nil(),
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let session_id = Uuid::new_v4();

        bus.emit_lossy(PlayerEvent::PlaybackStateChanged {
            session_id,
            old_state: PlaybackState::Idle,
            new_state: PlaybackState::Playing,
            timestamp: chrono::Utc::now(),
        });
        bus.emit_lossy(PlayerEvent::SeekCompleted {
            session_id,
            position_secs: 12.5,
            timestamp: chrono::Utc::now(),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "PlaybackStateChanged");
        assert_eq!(second.event_type(), "SeekCompleted");
        assert_eq!(second.session_id(), session_id);
    }
}
