use std::sync::Arc;

use crate::audio::{AudioBackend, AudioCache, AudioPlaybackEngine, ClipStore};
use crate::config::EngineConfig;
use crate::expression::{ExpressionController, ExpressionTable};
use crate::lipsync::LipSyncAnimator;
use crate::model::ModelParameters;
use crate::services::SpeechSynthesizer;
use crate::text::TextSink;

/// Everything one conversation session owns, gathered in one place instead
/// of ambient globals. The sequencer holds it exclusively; nothing else
/// touches these parts while a sequence runs.
pub struct SessionContext {
    pub engine: AudioPlaybackEngine,
    pub cache: AudioCache,
    pub synth: Arc<dyn SpeechSynthesizer>,
    pub expressions: ExpressionController,
    pub text: Arc<dyn TextSink>,
    pub animator: LipSyncAnimator,
    pub config: Arc<EngineConfig>,
}

impl SessionContext {
    /// Wires the full stack around one model + text sink pair.
    pub fn assemble(
        backend: Box<dyn AudioBackend>,
        model: Arc<dyn ModelParameters>,
        text: Arc<dyn TextSink>,
        synth: Arc<dyn SpeechSynthesizer>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let store = Arc::new(ClipStore::new());
        let animator = LipSyncAnimator::new(Arc::clone(&model), Arc::clone(&config));
        let engine = AudioPlaybackEngine::new(
            backend,
            store,
            animator.clone(),
            Arc::clone(&config),
        );
        let cache = AudioCache::new(Arc::clone(&synth));
        let expressions = ExpressionController::new(model, ExpressionTable::character_default());
        Self {
            engine,
            cache,
            synth,
            expressions,
            text,
            animator,
            config,
        }
    }
}
