//! Playback transitions
//!
//! **Responsibilities:**
//! - `play` / `pause` / `seek` / `stop` and their state checks
//! - Ordering of worker, clock, audio output and presentation changes
//!
//! `Stopped` is terminal: every transition except `stop` fails with
//! `InvalidState` once it is reached.

use super::core::{PlaybackEngine, Session};
use crate::error::{Error, Result};
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};
use vfp_common::human_time::format_position;
use vfp_common::{PlaybackState, PlayerEvent};

impl PlaybackEngine {
    /// Start or resume playback.
    ///
    /// Starts decode workers on first use, then audio output, the clock and
    /// the presentation loop. A no-op while already playing.
    pub async fn play(&self) -> Result<()> {
        let mut session = self.inner.session.lock().await;

        match self.state() {
            PlaybackState::Playing => return Ok(()),
            PlaybackState::Idle | PlaybackState::Paused => {}
            state @ (PlaybackState::Seeking | PlaybackState::Stopped) => {
                return Err(Error::InvalidState(format!("cannot play while {}", state)));
            }
        }

        self.start_workers(&mut session);
        self.resume_output(&mut session)?;
        self.set_state(PlaybackState::Playing);

        info!(
            "Playback started at {}",
            format_position(self.position())
        );
        Ok(())
    }

    /// Suspend output consumption and presentation.
    ///
    /// The clock freezes at its last value; decode workers keep filling the
    /// queues up to the pause threshold. A no-op while already paused.
    pub async fn pause(&self) -> Result<()> {
        let mut session = self.inner.session.lock().await;

        match self.state() {
            PlaybackState::Paused => return Ok(()),
            PlaybackState::Playing => {}
            state => {
                return Err(Error::InvalidState(format!("cannot pause while {}", state)));
            }
        }

        self.suspend_output(&mut session).await?;
        self.set_state(PlaybackState::Paused);

        info!("Playback paused at {}", format_position(self.position()));
        Ok(())
    }

    /// Reposition every stream to `target` seconds.
    ///
    /// Passes through `Seeking` and returns to the prior state. On return the
    /// queues hold no frame from before the seek and the clock reads
    /// `target`. A decoder that cannot seek is fatal for the session.
    pub async fn seek(&self, target: f64) -> Result<()> {
        if !target.is_finite() || target < 0.0 {
            return Err(Error::InvalidInput(format!(
                "seek target must be finite and non-negative (got {})",
                target
            )));
        }

        let mut session = self.inner.session.lock().await;

        let prior = self.state();
        if matches!(prior, PlaybackState::Seeking | PlaybackState::Stopped) {
            return Err(Error::InvalidState(format!("cannot seek while {}", prior)));
        }

        self.set_state(PlaybackState::Seeking);
        info!("Seeking to {}", format_position(target));

        match self.seek_locked(&mut session, prior, target).await {
            Ok(()) => {
                self.inner.events.emit_lossy(PlayerEvent::SeekCompleted {
                    session_id: self.inner.session_id,
                    position_secs: target,
                    timestamp: chrono::Utc::now(),
                });
                self.set_state(prior);
                Ok(())
            }
            Err(e) => {
                warn!("Seek to {} failed: {}", format_position(target), e);
                self.stop_locked(&mut session).await;
                Err(e)
            }
        }
    }

    async fn seek_locked(
        &self,
        session: &mut Session,
        prior: PlaybackState,
        target: f64,
    ) -> Result<()> {
        if prior == PlaybackState::Playing {
            self.suspend_output(session).await?;
        }

        let restart_workers = self.stop_workers(session).await?;
        let flushed_audio = self.inner.audio_queue.flush();
        let flushed_video = self.inner.video_queue.flush();
        debug!(
            "Seek flushed {} audio and {} video frames",
            flushed_audio, flushed_video
        );

        for decoder in session.parked.iter_mut() {
            if let Err(e) = decoder.seek(target) {
                let stream = decoder.stream();
                let reason = e.to_string();
                self.inner.events.emit_lossy(PlayerEvent::StreamFatal {
                    session_id: self.inner.session_id,
                    stream,
                    reason: reason.clone(),
                    timestamp: chrono::Utc::now(),
                });
                return Err(Error::StreamFatal { stream, reason });
            }
        }

        self.inner.clock.reset(target, self.inner.host.now_ns())?;
        self.inner.sync.lock().reset();
        self.inner.eos_reported.store(false, Ordering::Release);
        self.inner.audio_queue.reopen();
        self.inner.video_queue.reopen();

        if restart_workers {
            self.start_workers(session);
        }
        if prior == PlaybackState::Playing {
            self.resume_output(session)?;
        }
        Ok(())
    }

    /// Tear the session down. Idempotent; valid from every state.
    ///
    /// On return every worker has exited and both queues are empty and
    /// closed.
    pub async fn stop(&self) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        if self.state() == PlaybackState::Stopped {
            return Ok(());
        }
        self.stop_locked(&mut session).await;
        Ok(())
    }

    /// Release everything; failures are logged so teardown always completes
    async fn stop_locked(&self, session: &mut Session) {
        self.inner.output_active.store(false, Ordering::Release);
        if let Err(e) = self.stop_presentation(session).await {
            warn!("Presentation task did not stop cleanly: {}", e);
        }

        // A session that never activated has no output to pause
        if let (Some(manager), true) = (&self.inner.audio_manager, session.audio_active) {
            if let Err(e) = manager.pause() {
                warn!("Failed to pause audio output: {}", e);
            }
            if let Err(e) = manager.deactivate() {
                warn!("Failed to deactivate audio session: {}", e);
            }
            session.audio_active = false;
        }
        if let Some(monitor) = session.monitor.take() {
            monitor.abort();
        }

        if let Err(e) = self.stop_workers(session).await {
            warn!("Decode worker did not stop cleanly: {}", e);
        }
        session.parked.clear();

        for queue in [&self.inner.audio_queue, &self.inner.video_queue] {
            queue.flush();
            queue.close();
        }
        self.inner.clock.pause(self.inner.host.now_ns());

        self.set_state(PlaybackState::Stopped);
        info!("Playback session {} stopped", self.inner.session_id);
    }

    /// Clock, audio output and presentation on
    fn resume_output(&self, session: &mut Session) -> Result<()> {
        self.inner.clock.resume(self.inner.host.now_ns());
        if let Err(e) = self.start_audio_output(session) {
            self.inner.clock.pause(self.inner.host.now_ns());
            return Err(e);
        }
        self.start_presentation(session);
        Ok(())
    }

    /// Audio output, presentation and clock off
    async fn suspend_output(&self, session: &mut Session) -> Result<()> {
        self.pause_audio_output()?;
        self.stop_presentation(session).await?;
        self.inner.clock.pause(self.inner.host.now_ns());
        Ok(())
    }
}
