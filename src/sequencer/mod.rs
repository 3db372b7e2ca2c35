use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub mod reveal;
pub mod session;

pub use reveal::TextRevealer;
pub use session::SessionContext;

use crate::audio::{AudioPayload, AudioPlaybackEngine};
use crate::dialogue::{segment, strip_stage_directions, Segment};
use crate::error::{PlaybackRuntimeError, SequenceError};
use crate::lipsync::LipSyncAnimator;
use crate::services::SpeechSynthesizer;

/// The ordered segment list for one reply, with its consumption cursor.
/// Replaced wholesale per reply; never merged with an in-flight one.
#[derive(Debug)]
pub struct Sequence {
    pub segments: Vec<Segment>,
    pub index: usize,
}

impl Sequence {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments, index: 0 }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn exhausted(&self) -> bool {
        self.index >= self.segments.len()
    }

    pub fn advance(&mut self) {
        self.index += 1;
    }
}

/// Where the sequencer stands. `Aborted` and `Idle` are both terminal for
/// the current sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Priming,
    Playing(usize),
    Advancing,
    Aborted,
}

/// Drives one reply at a time through segmentation, cache priming,
/// expression changes and the per-segment reveal+playback join. Strictly
/// sequential: segment `i+1` starts only after both the reveal and the
/// playback of segment `i` settled.
pub struct PlaybackSequencer {
    ctx: SessionContext,
    state: SequencerState,
}

impl PlaybackSequencer {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            state: SequencerState::Idle,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    /// Speaks one reply end to end. On a playback error the remaining
    /// segments are not attempted: the error marker is appended and the
    /// sequencer lands in `Aborted`. Cancellation stops mid-segment and
    /// also lands in `Aborted`, without a marker.
    pub async fn speak(
        &mut self,
        reply: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SequenceError> {
        let Self { ctx, state } = self;
        let SessionContext {
            engine,
            cache,
            synth,
            expressions,
            text,
            animator,
            config,
        } = ctx;

        let segments = segment(reply);
        if segments.is_empty() {
            debug!("reply produced no segments");
            transition(state, SequencerState::Idle);
            return Ok(());
        }
        let mut seq = Sequence::new(segments);
        debug!(segments = seq.len(), "sequence starting");

        transition(state, SequencerState::Priming);
        tokio::select! {
            _ = cache.prime(&seq.segments) => {}
            _ = cancel.cancelled() => {
                debug!("sequence cancelled while priming");
                transition(state, SequencerState::Aborted);
                return Ok(());
            }
        }

        // Priming done; the sink starts blank for segment 0.
        text.set_text("");

        let revealer = TextRevealer::new(Arc::clone(text), config.reveal_delay());
        while !seq.exhausted() {
            let i = seq.index;
            transition(state, SequencerState::Playing(i));

            let failure = {
                let piece = &seq.segments[i];
                if let Some(tag) = &piece.emotion {
                    expressions.apply(tag);
                }

                let cached = cache.lookup(&piece.text);
                let (trigger_tx, mut triggers) = mpsc::unbounded_channel();
                let reveal = revealer.reveal(&piece.text, trigger_tx, cancel);
                let playback =
                    play_segment(engine, animator, synth, cached, &piece.text, cancel);
                tokio::pin!(reveal);
                tokio::pin!(playback);

                // Both halves must settle before the segment counts as
                // done; a playback error short-circuits so the reveal
                // stops mid-word.
                let mut revealed = false;
                let mut played = false;
                let mut failure = None;
                while !(revealed && played) {
                    tokio::select! {
                        _ = &mut reveal, if !revealed => revealed = true,
                        outcome = &mut playback, if !played => {
                            played = true;
                            if let Err(err) = outcome {
                                failure = Some(err);
                                break;
                            }
                        }
                        Some(tag) = triggers.recv() => expressions.apply(&tag),
                    }
                }
                failure
            };

            if let Some(err) = failure {
                warn!(segment = i, error = %err, "segment failed, aborting sequence");
                text.append_text(&config.error_marker);
                expressions.reset();
                transition(state, SequencerState::Aborted);
                return Err(SequenceError {
                    index: i,
                    source: err,
                });
            }
            if cancel.is_cancelled() {
                debug!(segment = i, "sequence cancelled");
                transition(state, SequencerState::Aborted);
                return Ok(());
            }

            seq.advance();
            if !seq.exhausted() {
                transition(state, SequencerState::Advancing);
            }
        }

        transition(state, SequencerState::Idle);
        Ok(())
    }
}

fn transition(state: &mut SequencerState, next: SequencerState) {
    if *state != next {
        debug!(from = ?state, to = ?next, "sequencer transition");
    }
    *state = next;
}

/// The playback half of a segment join. A missing clip is not an error:
/// the cache is retried on demand once, and if there is still nothing to
/// voice the bounded mouth burst covers the reveal.
async fn play_segment(
    engine: &mut AudioPlaybackEngine,
    animator: &LipSyncAnimator,
    synth: &Arc<dyn SpeechSynthesizer>,
    cached: Option<AudioPayload>,
    text: &str,
    cancel: &CancellationToken,
) -> Result<(), PlaybackRuntimeError> {
    let payload = match cached {
        Some(payload) => Some(payload),
        None => fetch_on_demand(synth, text, cancel).await,
    };
    let Some(payload) = payload else {
        if !cancel.is_cancelled() {
            animator.spawn_failure_burst();
        }
        return Ok(());
    };
    engine.play(payload, cancel).await.map(|_| ())
}

async fn fetch_on_demand(
    synth: &Arc<dyn SpeechSynthesizer>,
    text: &str,
    cancel: &CancellationToken,
) -> Option<AudioPayload> {
    let spoken = strip_stage_directions(text);
    if spoken.trim().is_empty() {
        return None;
    }
    let fetched = tokio::select! {
        fetched = synth.synthesize(&spoken) => fetched,
        _ = cancel.cancelled() => return None,
    };
    match fetched {
        Ok(payload) if payload.is_empty() => {
            warn!("speech service returned an empty clip");
            None
        }
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "on-demand speech fetch failed");
            None
        }
    }
}
