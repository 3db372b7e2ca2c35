use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::audio::AnalyserHandle;
use crate::config::EngineConfig;
use crate::model::ModelParameters;

/// The model parameter every animation loop writes to.
pub const MOUTH_PARAMETER: &str = "ParamMouthOpenY";

/// Mouth aperture from analyser byte bins: average the speech band,
/// normalize against the ceiling, then bend through the exponent so quiet
/// passages still read as movement.
pub fn mouth_from_bins(bins: &[u8], config: &EngineConfig) -> f32 {
    let start = config.analyser_band_start.min(bins.len());
    let end = config.analyser_band_end.min(bins.len());
    let band = &bins[start..end];
    if band.is_empty() {
        return 0.0;
    }
    let average = band.iter().map(|&b| b as f32).sum::<f32>() / band.len() as f32;
    let energy = (average / config.analyser_ceiling).min(1.0);
    energy.powf(config.mouth_curve_exponent)
}

/// Mouth aperture when no analyser is wired: a slow sine with jitter on top.
/// `jitter` is expected in `0..1`.
pub fn simulated_mouth(t: f32, jitter: f32) -> f32 {
    let base = ((t * 2.5).sin() + 1.0) / 2.0;
    (base * 0.7 + jitter * 0.2).min(1.0)
}

/// One frame of the bounded burst played when a segment has no usable audio.
pub fn burst_mouth(frame: u32, total: u32) -> f32 {
    let progress = frame as f32 / total.max(1) as f32;
    0.3 + 0.5 * (progress * core::f32::consts::PI * 4.0).sin()
}

/// Spawns and supersedes the ~30fps mouth animation loops. Only one loop
/// owns the mouth at a time: every spawn bumps a generation counter and a
/// loop that notices a newer generation exits without touching the model
/// again, so a retiring animation can never clobber its successor's frames.
#[derive(Clone)]
pub struct LipSyncAnimator {
    model: Arc<dyn ModelParameters>,
    config: Arc<EngineConfig>,
    generation: Arc<AtomicU64>,
}

impl LipSyncAnimator {
    pub fn new(model: Arc<dyn ModelParameters>, config: Arc<EngineConfig>) -> Self {
        Self {
            model,
            config,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frame loop fed by real analyser bins. Runs until `stop` fires or a
    /// newer animation takes over; leaves the mouth closed if still owner.
    pub fn spawn_analyzed(
        &self,
        analyser: AnalyserHandle,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let driver = self.clone();
        let generation = self.take_over();
        tokio::spawn(async move {
            let mut frames = driver.frame_clock();
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = frames.tick() => {
                        if driver.superseded(generation) {
                            return;
                        }
                        let bins = analyser.frequency_bins();
                        driver.write_mouth(mouth_from_bins(&bins, &driver.config));
                    }
                }
            }
            driver.rest_mouth(generation);
        })
    }

    /// Frame loop used when analyser binding failed entirely. The audio
    /// still plays; the mouth just moves on a plausible sine instead.
    pub fn spawn_simulated(&self, stop: CancellationToken) -> JoinHandle<()> {
        let driver = self.clone();
        let generation = self.take_over();
        tokio::spawn(async move {
            debug!("no analyser bound, driving simulated mouth");
            let started = Instant::now();
            let mut frames = driver.frame_clock();
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = frames.tick() => {
                        if driver.superseded(generation) {
                            return;
                        }
                        let t = started.elapsed().as_secs_f32();
                        driver.write_mouth(simulated_mouth(t, rand::random::<f32>()));
                    }
                }
            }
            driver.rest_mouth(generation);
        })
    }

    /// Bounded burst for segments whose audio never started. Self-limiting,
    /// so there is no stop token; a newer animation still preempts it.
    pub fn spawn_failure_burst(&self) -> JoinHandle<()> {
        let driver = self.clone();
        let generation = self.take_over();
        tokio::spawn(async move {
            debug!("running fallback mouth burst");
            let total = driver.config.fallback_frames;
            let mut frames = driver.frame_clock();
            for frame in 0..total {
                frames.tick().await;
                if driver.superseded(generation) {
                    return;
                }
                driver.write_mouth(burst_mouth(frame, total));
            }
            driver.rest_mouth(generation);
        })
    }

    fn take_over(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn frame_clock(&self) -> Interval {
        let mut frames = interval(self.config.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        frames
    }

    fn write_mouth(&self, value: f32) {
        if !self.model.is_ready() {
            return;
        }
        let scaled = value.clamp(0.0, 1.0) * self.config.max_mouth_aperture;
        self.model.set_parameter(MOUTH_PARAMETER, scaled);
        self.model.commit_parameters();
    }

    /// Final write of an animation that is still the owner: mouth closed.
    fn rest_mouth(&self, generation: u64) {
        if self.superseded(generation) {
            return;
        }
        if !self.model.is_ready() {
            return;
        }
        self.model.set_parameter(MOUTH_PARAMETER, 0.0);
        self.model.commit_parameters();
    }
}
