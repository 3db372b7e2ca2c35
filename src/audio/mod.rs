use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

pub mod clip;
#[cfg(feature = "device")]
pub mod device;
pub mod engine;
pub mod graph;
pub mod sim;

pub use clip::{AudioPayload, ClipStore, ClipUrl, DecodedClip, MouthEnvelope};
pub use engine::{AudioPlaybackEngine, PlaybackOutcome};
pub use graph::{AnalyserHandle, AudioBackend, AudioElement, AudioGraphContext, PlaybackControl};
pub use sim::SimBackend;

use crate::dialogue::{strip_stage_directions, Segment};
use crate::services::SpeechSynthesizer;

/// Speech clips keyed by segment text, preloaded per reply. Priming first
/// prunes keys the new sequence no longer mentions, which bounds the cache
/// to the active conversation, then fetches every missing text concurrently.
/// A miss is a checked state, not an error.
pub struct AudioCache {
    synth: Arc<dyn SpeechSynthesizer>,
    entries: HashMap<String, AudioPayload>,
}

impl AudioCache {
    pub fn new(synth: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            synth,
            entries: HashMap::new(),
        }
    }

    /// Prunes stale entries, then synthesizes every uncached segment text.
    /// Stage directions are stripped before synthesis so the voice never
    /// reads them; a segment that is nothing but stage directions is never
    /// fetched. Resolves once every fetch settled; never fails as a whole.
    pub async fn prime(&mut self, segments: &[Segment]) {
        let required: HashSet<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        self.entries.retain(|text, _| required.contains(text.as_str()));

        let mut fetches = JoinSet::new();
        let mut launched: HashSet<&str> = HashSet::new();
        for segment in segments {
            if self.entries.contains_key(&segment.text) || !launched.insert(&segment.text) {
                continue;
            }
            let spoken = strip_stage_directions(&segment.text);
            if spoken.trim().is_empty() {
                continue;
            }
            let synth = Arc::clone(&self.synth);
            let text = segment.text.clone();
            fetches.spawn(async move {
                match synth.synthesize(&spoken).await {
                    Ok(payload) if payload.is_empty() => {
                        warn!(text, "speech service returned an empty clip");
                        (text, None)
                    }
                    Ok(payload) => (text, Some(payload)),
                    Err(err) => {
                        warn!(text, error = %err, "segment audio fetch failed");
                        (text, None)
                    }
                }
            });
        }

        while let Some(fetched) = fetches.join_next().await {
            match fetched {
                Ok((text, Some(payload))) => {
                    debug!(text, bytes = payload.len(), "segment audio cached");
                    self.entries.insert(text, payload);
                }
                Ok((_, None)) => {}
                Err(err) => warn!(error = %err, "audio prime task failed"),
            }
        }
    }

    /// Cheap clone-out; payload bytes are shared.
    pub fn lookup(&self, text: &str) -> Option<AudioPayload> {
        self.entries.get(text).cloned()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.contains_key(text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
