use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::clip::{AudioPayload, ClipStore, ClipUrl};
use super::graph::{
    AnalyserHandle, AudioBackend, AudioElement, AudioGraphContext, PlaybackControl, PlaybackEnd,
};
use crate::config::EngineConfig;
use crate::error::{AudioBindError, PlaybackRuntimeError};
use crate::lipsync::LipSyncAnimator;

const CURRENT_URL_LOCK: &str = "current clip url lock poisoned";

/// Escalation ladder for wiring a clip into the analysis graph. Tried in
/// order, first success wins. All three failing still leaves the clip
/// playable, just without analysis data.
const BIND_STRATEGIES: &[BindStrategy] = &[
    BindStrategy::Direct,
    BindStrategy::RecreateContext,
    BindStrategy::ReplaceElement,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindStrategy {
    /// Bind on the context and element as they stand.
    Direct,
    /// Close the context, create a fresh one, bind again.
    RecreateContext,
    /// Recreate context and element both. A fresh element carries a fresh
    /// source token.
    ReplaceElement,
}

/// How a `play` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The clip ran to its natural end.
    Completed,
    /// Cancelled by the caller or superseded before finishing.
    Stopped,
}

/// Book-keeping for the one clip allowed to play at a time.
struct PlaybackSession {
    url: ClipUrl,
    driver_stop: CancellationToken,
    lipsync_stop: CancellationToken,
    lipsync_task: Option<JoinHandle<()>>,
}

/// Owns the audio element, the graph context and the single active playback
/// session. Playback is strictly sequential: starting a clip always retires
/// whatever was audible before, and a finished clip's URL is released on a
/// delay so a fast replay of the same clip is not pulled out from under the
/// element.
pub struct AudioPlaybackEngine {
    backend: Box<dyn AudioBackend>,
    store: Arc<ClipStore>,
    animator: LipSyncAnimator,
    config: Arc<EngineConfig>,
    element: AudioElement,
    context: Option<Box<dyn AudioGraphContext>>,
    session: Option<PlaybackSession>,
    current_url: Arc<Mutex<Option<ClipUrl>>>,
}

impl AudioPlaybackEngine {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        store: Arc<ClipStore>,
        animator: LipSyncAnimator,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            backend,
            store,
            animator,
            config,
            element: AudioElement::new(),
            context: None,
            session: None,
            current_url: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }

    /// Plays one clip to completion, driving the mouth while it runs. The
    /// payload is registered as a fresh URL for the duration of the session
    /// and released (deferred) afterwards. Returns `Stopped` when `cancel`
    /// fires mid-clip. A clip that never starts (or dies mid-play) surfaces
    /// its error after a bounded fallback mouth burst has been kicked off.
    pub async fn play(
        &mut self,
        payload: AudioPayload,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome, PlaybackRuntimeError> {
        self.retire_active_session().await;
        let url = self.store.register(payload);
        self.set_current(url.clone());

        let (mut control, analyser) = match self.bring_up(&url) {
            Ok(parts) => parts,
            Err(err) => {
                warn!(%url, error = %err, "clip failed to start");
                self.clear_current(&url);
                self.schedule_release(url);
                self.animator.spawn_failure_burst();
                return Err(err);
            }
        };

        let lipsync_stop = CancellationToken::new();
        let lipsync_task = match &analyser {
            Some(handle) => self
                .animator
                .spawn_analyzed(handle.clone(), lipsync_stop.clone()),
            None => self.animator.spawn_simulated(lipsync_stop.clone()),
        };
        self.session = Some(PlaybackSession {
            url: url.clone(),
            driver_stop: control.stop_token(),
            lipsync_stop,
            lipsync_task: Some(lipsync_task),
        });
        debug!(%url, analysed = analyser.is_some(), "clip playback started");

        let end = tokio::select! {
            end = control.wait() => end,
            _ = cancel.cancelled() => {
                debug!(%url, "playback cancelled");
                self.retire_active_session().await;
                return Ok(PlaybackOutcome::Stopped);
            }
        };

        self.retire_active_session().await;
        match end {
            PlaybackEnd::Completed => Ok(PlaybackOutcome::Completed),
            PlaybackEnd::Stopped => Ok(PlaybackOutcome::Stopped),
            PlaybackEnd::Failed(err) => {
                warn!(%url, error = %err, "playback failed mid-clip");
                self.animator.spawn_failure_burst();
                Err(err)
            }
        }
    }

    /// Stops whatever is playing. The mouth returns to rest.
    pub async fn stop(&mut self) {
        self.retire_active_session().await;
    }

    /// Tears down the active session, wherever it got to: stops the driver,
    /// waits the lip-sync loop out, detaches the source and hands the URL to
    /// the deferred release.
    async fn retire_active_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.driver_stop.cancel();
        session.lipsync_stop.cancel();
        if let Some(task) = session.lipsync_task.take() {
            let _ = task.await;
        }
        if let Some(context) = self.context.as_mut() {
            context.disconnect_source();
        }
        self.clear_current(&session.url);
        self.schedule_release(session.url);
    }

    /// Loads the clip, binds the analyser and starts the driver.
    fn bring_up(
        &mut self,
        url: &ClipUrl,
    ) -> Result<(PlaybackControl, Option<AnalyserHandle>), PlaybackRuntimeError> {
        // Media sources bind once per element; a spent element starts over.
        if self.element.has_surrendered_source() {
            self.element = AudioElement::new();
        }
        self.element.set_source(url.clone());
        self.element.load(&self.store)?;

        let analyser = self.attach_analyser();

        self.ensure_context()
            .map_err(|err| PlaybackRuntimeError::StartRejected(err.to_string()))?;
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| PlaybackRuntimeError::StartRejected("no audio context".into()))?;
        let control = context.start(&self.element)?;
        Ok((control, analyser))
    }

    /// Walks the bind ladder. `None` means every strategy failed and the
    /// caller falls back to simulated mouth movement.
    fn attach_analyser(&mut self) -> Option<AnalyserHandle> {
        for strategy in BIND_STRATEGIES {
            match self.try_bind(*strategy) {
                Ok(handle) => {
                    debug!(?strategy, "analyser bound");
                    return Some(handle);
                }
                Err(err) => warn!(?strategy, error = %err, "analyser bind failed"),
            }
        }
        None
    }

    fn try_bind(&mut self, strategy: BindStrategy) -> Result<AnalyserHandle, AudioBindError> {
        match strategy {
            BindStrategy::Direct => {}
            BindStrategy::RecreateContext => self.drop_context(),
            BindStrategy::ReplaceElement => {
                self.drop_context();
                self.reload_fresh_element()?;
            }
        }
        self.ensure_context()?;
        let context = self.context.as_mut().ok_or(AudioBindError::ContextClosed)?;
        context.connect_media_source(&mut self.element)
    }

    fn drop_context(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.close();
        }
    }

    fn reload_fresh_element(&mut self) -> Result<(), AudioBindError> {
        let url = self.element.current_url().cloned();
        self.element = AudioElement::new();
        if let Some(url) = url {
            self.element.set_source(url);
            self.element
                .load(&self.store)
                .map_err(|err| AudioBindError::Backend(err.to_string()))?;
        }
        Ok(())
    }

    fn ensure_context(&mut self) -> Result<(), AudioBindError> {
        if self.context.is_none() {
            self.context = Some(self.backend.create_context()?);
        }
        Ok(())
    }

    /// Deferred URL release. Covers the fast-forward race where the next
    /// segment replays the same clip within the linger window.
    fn schedule_release(&self, url: ClipUrl) {
        let store = Arc::clone(&self.store);
        let current = Arc::clone(&self.current_url);
        let delay = self.config.release_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let replayed = current.lock().expect(CURRENT_URL_LOCK).as_ref() == Some(&url);
            if replayed {
                debug!(%url, "release skipped, clip is current again");
                return;
            }
            store.release(&url);
        });
    }

    fn set_current(&self, url: ClipUrl) {
        *self.current_url.lock().expect(CURRENT_URL_LOCK) = Some(url);
    }

    fn clear_current(&self, url: &ClipUrl) {
        let mut current = self.current_url.lock().expect(CURRENT_URL_LOCK);
        if current.as_ref() == Some(url) {
            *current = None;
        }
    }
}
