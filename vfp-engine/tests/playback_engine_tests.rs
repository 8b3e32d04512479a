//! Playback state machine integration tests
//!
//! Full sessions driven through `PlaybackEngine` with a manual host clock
//! and manually pulled audio output, so clock readings are exact.

mod helpers;

use helpers::{expect_event, CountingAudioManager, ScriptedDecoder, TestSession, CHANNELS};
use std::sync::Arc;
use std::time::Duration;
use vfp_engine::audio::AudioManager;
use vfp_engine::{Error, PlaybackEngine, PlaybackState, PlayerConfig, PlayerEvent, StreamKind};

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

// ============================================================================
// Transitions
// ============================================================================

#[tokio::test]
async fn test_play_pause_stop_transitions() {
    let session = TestSession::open(
        PlayerConfig::default(),
        Some(ScriptedDecoder::audio(0.05, 10.0)),
        Some(ScriptedDecoder::video(0.04, 10.0)),
    )
    .await;
    let engine = &session.engine;
    let mut rx = engine.subscribe();

    assert_eq!(engine.state(), PlaybackState::Idle);
    assert!(matches!(engine.pause().await, Err(Error::InvalidState(_))));

    engine.play().await.unwrap();
    assert_eq!(engine.state(), PlaybackState::Playing);
    assert!(session.audio.is_active());
    assert!(session.audio.is_playing());
    engine.play().await.unwrap();

    engine.pause().await.unwrap();
    assert_eq!(engine.state(), PlaybackState::Paused);
    assert!(!session.audio.is_playing());
    engine.pause().await.unwrap();

    engine.play().await.unwrap();
    engine.stop().await.unwrap();
    assert_eq!(engine.state(), PlaybackState::Stopped);
    assert!(!session.audio.is_active());
    engine.stop().await.unwrap();

    let mut transitions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PlayerEvent::PlaybackStateChanged {
            old_state,
            new_state,
            ..
        } = event
        {
            transitions.push((old_state, new_state));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (PlaybackState::Idle, PlaybackState::Playing),
            (PlaybackState::Playing, PlaybackState::Paused),
            (PlaybackState::Paused, PlaybackState::Playing),
            (PlaybackState::Playing, PlaybackState::Stopped),
        ]
    );
}

#[tokio::test]
async fn test_stopped_is_terminal() {
    let session = TestSession::open(
        PlayerConfig::default(),
        None,
        Some(ScriptedDecoder::video(0.04, 10.0)),
    )
    .await;
    let engine = &session.engine;

    engine.stop().await.unwrap();
    assert_eq!(engine.state(), PlaybackState::Stopped);

    assert!(matches!(engine.play().await, Err(Error::InvalidState(_))));
    assert!(matches!(engine.pause().await, Err(Error::InvalidState(_))));
    assert!(matches!(engine.seek(1.0).await, Err(Error::InvalidState(_))));
    assert_eq!(engine.state(), PlaybackState::Stopped);
}

#[tokio::test]
async fn test_stop_empties_and_closes_full_queues() {
    let session = TestSession::open(
        PlayerConfig::default(),
        Some(ScriptedDecoder::audio(0.05, 120.0)),
        Some(ScriptedDecoder::video(0.04, 120.0)),
    )
    .await;
    let engine = &session.engine;

    engine.play().await.unwrap();
    // Nothing pulls audio and the host clock is frozen, so both workers end
    // up parked on a full queue
    assert!(
        session
            .wait_until(|s| {
                s.engine.queue_stats(StreamKind::Audio).decoder_should_pause
                    && s.engine.queue_stats(StreamKind::Video).decoder_should_pause
            })
            .await
    );

    tokio::time::timeout(Duration::from_secs(1), engine.stop())
        .await
        .expect("stop should release workers blocked on full queues")
        .unwrap();

    assert_eq!(engine.state(), PlaybackState::Stopped);
    for stream in [StreamKind::Audio, StreamKind::Video] {
        let stats = engine.queue_stats(stream);
        assert_eq!(stats.len, 0, "{} queue not empty after stop", stream);
        assert_eq!(stats.buffered_secs, 0.0);
        assert!(stats.closed, "{} queue still open after stop", stream);
    }
}

#[tokio::test]
async fn test_stop_touches_audio_session_only_when_activated() {
    let idle_manager = Arc::new(CountingAudioManager::new());
    let engine = PlaybackEngine::builder(PlayerConfig::default())
        .audio(Box::new(ScriptedDecoder::audio(0.05, 10.0)))
        .audio_manager(Arc::clone(&idle_manager) as Arc<dyn AudioManager>)
        .open()
        .await
        .unwrap();

    engine.stop().await.unwrap();
    assert_eq!(engine.state(), PlaybackState::Stopped);
    assert_eq!(CountingAudioManager::count(&idle_manager.pauses), 0);
    assert_eq!(CountingAudioManager::count(&idle_manager.deactivations), 0);

    let played_manager = Arc::new(CountingAudioManager::new());
    let engine = PlaybackEngine::builder(PlayerConfig::default())
        .audio(Box::new(ScriptedDecoder::audio(0.05, 10.0)))
        .audio_manager(Arc::clone(&played_manager) as Arc<dyn AudioManager>)
        .open()
        .await
        .unwrap();

    engine.play().await.unwrap();
    assert!(played_manager.is_playing());
    engine.stop().await.unwrap();
    assert!(!played_manager.is_playing());
    assert_eq!(CountingAudioManager::count(&played_manager.activations), 1);
    assert_eq!(CountingAudioManager::count(&played_manager.pauses), 1);
    assert_eq!(CountingAudioManager::count(&played_manager.deactivations), 1);
}

#[tokio::test]
async fn test_seek_rejects_invalid_target() {
    let session = TestSession::open(
        PlayerConfig::default(),
        None,
        Some(ScriptedDecoder::video(0.04, 10.0)),
    )
    .await;

    for target in [-1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            session.engine.seek(target).await,
            Err(Error::InvalidInput(_))
        ));
    }
    assert_eq!(session.engine.state(), PlaybackState::Idle);
}

#[tokio::test]
async fn test_open_requires_streams_and_collaborators() {
    let empty = vfp_engine::PlaybackEngine::builder(PlayerConfig::default())
        .open()
        .await;
    assert!(matches!(empty, Err(Error::InvalidInput(_))));

    let no_manager = vfp_engine::PlaybackEngine::builder(PlayerConfig::default())
        .audio(Box::new(ScriptedDecoder::audio(0.05, 1.0)))
        .open()
        .await;
    assert!(matches!(no_manager, Err(Error::InvalidInput(_))));

    let swapped = vfp_engine::PlaybackEngine::builder(PlayerConfig::default())
        .video(Box::new(ScriptedDecoder::audio(0.05, 1.0)))
        .open()
        .await;
    assert!(matches!(swapped, Err(Error::InvalidInput(_))));
}

// ============================================================================
// Clock behavior across transitions
// ============================================================================

#[tokio::test]
async fn test_pause_freezes_position() {
    let session = TestSession::open(
        PlayerConfig::default(),
        None,
        Some(ScriptedDecoder::video(0.04, 10.0)),
    )
    .await;
    let engine = &session.engine;

    engine.play().await.unwrap();
    session.host.advance_secs(1.0);
    assert_close(engine.position(), 1.0);

    engine.pause().await.unwrap();
    session.host.advance_secs(1.0);
    assert_close(engine.position(), 1.0);

    engine.play().await.unwrap();
    session.host.advance_secs(0.5);
    assert_close(engine.position(), 1.5);

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_empty_audio_queue_renders_silence() {
    let session = TestSession::open(
        PlayerConfig::default(),
        Some(ScriptedDecoder::audio(0.05, 0.0)),
        None,
    )
    .await;
    session.engine.play().await.unwrap();

    let buffer = session.audio.pull(1024);
    assert_eq!(buffer.len(), 1024 * CHANNELS as usize);
    assert!(buffer.iter().all(|&s| s == 0.0));

    let diagnostics = session.engine.diagnostics();
    assert_eq!(diagnostics.clock.pts, 0.0);
    assert_eq!(diagnostics.output.silence_frames, 1024);
    assert_eq!(diagnostics.output.underruns, 1);

    session.engine.stop().await.unwrap();
}

// ============================================================================
// Seek
// ============================================================================

#[tokio::test]
async fn test_seek_from_playing() {
    let audio = ScriptedDecoder::audio(0.05, 120.0);
    let video = ScriptedDecoder::video(0.04, 120.0);
    let audio_seeks = audio.seek_log();
    let video_seeks = video.seek_log();
    let session = TestSession::open(PlayerConfig::default(), Some(audio), Some(video)).await;
    let engine = &session.engine;
    let mut rx = engine.subscribe();

    engine.play().await.unwrap();
    assert!(
        session
            .wait_until(|s| {
                s.engine.queue_stats(StreamKind::Audio).len > 0
                    && s.engine.queue_stats(StreamKind::Video).len > 0
            })
            .await
    );
    session.audio.pull(100);
    session.host.advance_secs(0.1);

    engine.seek(30.0).await.unwrap();

    assert_eq!(engine.state(), PlaybackState::Playing);
    assert_close(engine.position(), 30.0);
    for stream in [StreamKind::Audio, StreamKind::Video] {
        let stats = engine.queue_stats(stream);
        assert_eq!(stats.len, 0, "{} queue not empty after seek", stream);
        assert_eq!(stats.buffered_secs, 0.0);
        assert!(stats.flushes >= 1);
    }
    assert_eq!(*audio_seeks.lock(), vec![30.0]);
    assert_eq!(*video_seeks.lock(), vec![30.0]);

    let completed = expect_event(&mut rx, |e| matches!(e, PlayerEvent::SeekCompleted { .. })).await;
    if let PlayerEvent::SeekCompleted { position_secs, .. } = completed {
        assert_eq!(position_secs, 30.0);
    }

    // Decoding resumes from the new position
    assert!(
        session
            .wait_until(|s| s.engine.queue_stats(StreamKind::Audio).len > 0)
            .await
    );
    session.audio.pull(100);
    assert!(engine.position() >= 30.0);

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_seek_while_paused_stays_paused() {
    let session = TestSession::open(
        PlayerConfig::default(),
        Some(ScriptedDecoder::audio(0.05, 60.0)),
        None,
    )
    .await;
    let engine = &session.engine;

    engine.play().await.unwrap();
    engine.pause().await.unwrap();
    engine.seek(12.5).await.unwrap();

    assert_eq!(engine.state(), PlaybackState::Paused);
    session.host.advance_secs(1.0);
    assert_close(engine.position(), 12.5);

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_decoder_seek_stops_session() {
    let session = TestSession::open(
        PlayerConfig::default(),
        None,
        Some(ScriptedDecoder::video(0.04, 10.0).failing_seek()),
    )
    .await;
    let engine = &session.engine;
    let mut rx = engine.subscribe();

    engine.play().await.unwrap();
    let result = engine.seek(5.0).await;
    assert!(matches!(
        result,
        Err(Error::StreamFatal {
            stream: StreamKind::Video,
            ..
        })
    ));
    assert_eq!(engine.state(), PlaybackState::Stopped);

    expect_event(&mut rx, |e| {
        matches!(
            e,
            PlayerEvent::StreamFatal {
                stream: StreamKind::Video,
                ..
            }
        )
    })
    .await;
}

// ============================================================================
// Stream failure and completion
// ============================================================================

#[tokio::test]
async fn test_decode_errors_past_limit_stop_session() {
    let config = PlayerConfig {
        max_consecutive_decode_errors: 5,
        ..PlayerConfig::default()
    };
    let session = TestSession::open(
        config,
        None,
        Some(ScriptedDecoder::video(0.04, 10.0).failing_decodes(10)),
    )
    .await;
    let engine = &session.engine;
    let mut rx = engine.subscribe();

    engine.play().await.unwrap();

    let event = expect_event(&mut rx, |e| matches!(e, PlayerEvent::StreamFatal { .. })).await;
    if let PlayerEvent::StreamFatal { stream, .. } = event {
        assert_eq!(stream, StreamKind::Video);
    }
    assert!(
        session
            .wait_until(|s| s.engine.state() == PlaybackState::Stopped)
            .await
    );
    assert_eq!(engine.decode_stats(StreamKind::Video).decode_errors, 6);
    assert!(matches!(engine.play().await, Err(Error::InvalidState(_))));
}

#[tokio::test]
async fn test_end_of_stream_reported_once_consumed() {
    let session = TestSession::open(
        PlayerConfig::default(),
        Some(ScriptedDecoder::audio(0.1, 0.5)),
        None,
    )
    .await;
    let engine = &session.engine;
    let mut rx = engine.subscribe();

    engine.play().await.unwrap();

    let output = Arc::clone(&session.audio);
    let puller = tokio::spawn(async move {
        loop {
            output.pull(100);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    expect_event(&mut rx, |e| matches!(e, PlayerEvent::EndOfStream { .. })).await;
    puller.abort();

    assert!(engine.queue_stats(StreamKind::Audio).end_of_stream);
    assert_eq!(engine.decode_stats(StreamKind::Audio).frames_queued, 5);
    assert_eq!(engine.state(), PlaybackState::Playing);

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_diagnostics_serialize() {
    let session = TestSession::open(
        PlayerConfig::default(),
        Some(ScriptedDecoder::audio(0.05, 1.0)),
        Some(ScriptedDecoder::video(0.04, 1.0)),
    )
    .await;

    let json = serde_json::to_value(session.engine.diagnostics()).unwrap();
    assert_eq!(json["state"], "idle");
    assert!(json["audio"]["queue"].is_object());
    assert!(json["video"]["decode"].is_object());
}
