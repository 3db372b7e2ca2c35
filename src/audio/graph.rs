use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::clip::{ClipStore, ClipUrl, DecodedClip};
use crate::error::{AudioBindError, PlaybackRuntimeError};

/// Cloneable reader over the analyser's byte frequency bins (0..=255,
/// `fft_size / 2` bins). The graph writes, the lip-sync loop reads.
#[derive(Debug, Clone)]
pub struct AnalyserHandle {
    bins: Arc<Mutex<Vec<u8>>>,
}

impl AnalyserHandle {
    pub fn new(bin_count: usize) -> Self {
        Self {
            bins: Arc::new(Mutex::new(vec![0; bin_count])),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bins.lock().expect("analyser lock").len()
    }

    /// Snapshot of the current bins.
    pub fn frequency_bins(&self) -> Vec<u8> {
        self.bins.lock().expect("analyser lock").clone()
    }

    pub fn write_bins(&self, bins: &[u8]) {
        let mut current = self.bins.lock().expect("analyser lock");
        current.clear();
        current.extend_from_slice(bins);
    }

    pub fn zero(&self) {
        let mut current = self.bins.lock().expect("analyser lock");
        for bin in current.iter_mut() {
            *bin = 0;
        }
    }
}

/// The playable resource handle. Its media-source token can be taken exactly
/// once over its lifetime; attaching a second analysis graph requires a
/// structurally fresh element, which is the engine's replace-handle rule.
#[derive(Debug)]
pub struct AudioElement {
    id: Uuid,
    url: Option<ClipUrl>,
    clip: Option<Arc<DecodedClip>>,
    source_taken: bool,
}

impl AudioElement {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            url: None,
            clip: None,
            source_taken: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Points the element at a clip URL. Any previously decoded clip is
    /// dropped; `load` decodes the new one.
    pub fn set_source(&mut self, url: ClipUrl) {
        self.url = Some(url);
        self.clip = None;
    }

    pub fn current_url(&self) -> Option<&ClipUrl> {
        self.url.as_ref()
    }

    /// Resolves and decodes the current URL. Fails if the URL was released
    /// or was never a valid clip.
    pub fn load(&mut self, store: &ClipStore) -> Result<(), PlaybackRuntimeError> {
        let url = self
            .url
            .as_ref()
            .ok_or_else(|| PlaybackRuntimeError::StartRejected("no source url set".into()))?;
        let payload = store.resolve(url).ok_or_else(|| {
            PlaybackRuntimeError::StartRejected(format!("clip url {url} is not registered"))
        })?;
        self.clip = Some(Arc::new(payload.decode()?));
        Ok(())
    }

    pub fn clip(&self) -> Option<&Arc<DecodedClip>> {
        self.clip.as_ref()
    }

    /// Surrenders the once-only media-source token.
    pub fn take_source_token(&mut self) -> Result<(), AudioBindError> {
        if self.source_taken {
            return Err(AudioBindError::SourceAlreadyAttached);
        }
        self.source_taken = true;
        Ok(())
    }

    pub fn has_surrendered_source(&self) -> bool {
        self.source_taken
    }
}

impl Default for AudioElement {
    fn default() -> Self {
        Self::new()
    }
}

/// How a playback driver ended.
#[derive(Debug)]
pub enum PlaybackEnd {
    /// The clip played to its natural end.
    Completed,
    /// The driver was stopped (superseded or cancelled).
    Stopped,
    Failed(PlaybackRuntimeError),
}

/// Handle to a running clip driver: a stop switch plus the end signal.
#[derive(Debug)]
pub struct PlaybackControl {
    finished: oneshot::Receiver<PlaybackEnd>,
    stop: CancellationToken,
}

impl PlaybackControl {
    pub fn new(finished: oneshot::Receiver<PlaybackEnd>, stop: CancellationToken) -> Self {
        Self { finished, stop }
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Waits for the driver to settle. A dropped driver counts as a device
    /// failure rather than hanging the caller.
    pub async fn wait(&mut self) -> PlaybackEnd {
        match (&mut self.finished).await {
            Ok(end) => end,
            Err(_) => PlaybackEnd::Failed(PlaybackRuntimeError::Device(
                "playback driver dropped its end signal".into(),
            )),
        }
    }
}

/// One audio-processing context: wires media sources through an analyser to
/// the output and drives clip playback. Contexts can be closed and recreated
/// wholesale when a bind attempt is refused.
pub trait AudioGraphContext: Send {
    /// Wires `element` through a fresh analyser to the destination,
    /// consuming the element's once-only source token.
    fn connect_media_source(
        &mut self,
        element: &mut AudioElement,
    ) -> Result<AnalyserHandle, AudioBindError>;

    /// Detaches the current media source, if any. Bins stop updating.
    fn disconnect_source(&mut self);

    /// Starts playing the element's loaded clip. Works with or without a
    /// connected media source; without one there is simply no analysis data.
    fn start(&mut self, element: &AudioElement) -> Result<PlaybackControl, PlaybackRuntimeError>;

    /// Tears the context down. Idempotent; a closed context rejects all
    /// further binds and starts.
    fn close(&mut self);
}

/// Factory for processing contexts. The engine holds one context at a time
/// and goes through this to recreate it during bind-strategy escalation.
pub trait AudioBackend: Send {
    fn create_context(&self) -> Result<Box<dyn AudioGraphContext>, AudioBindError>;
}
