use std::sync::Arc;
use std::time::Duration;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tokio::sync::oneshot;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::clip::DecodedClip;
use super::graph::{
    AnalyserHandle, AudioBackend, AudioElement, AudioGraphContext, PlaybackControl, PlaybackEnd,
};
use crate::error::{AudioBindError, PlaybackRuntimeError};

// Byte bins follow the usual analyser dB window.
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
/// How often a running driver refreshes the analyser bins.
const BIN_REFRESH: Duration = Duration::from_millis(16);

/// Headless deterministic backend: clip duration drives a timer, the
/// analyser computes byte bins with a real FFT over the decoded samples at
/// the playback clock position. The default platform; no sound card needed.
#[derive(Debug, Clone)]
pub struct SimBackend {
    fft_size: usize,
}

impl SimBackend {
    pub fn new() -> Self {
        Self { fft_size: 256 }
    }

    pub fn with_fft_size(fft_size: usize) -> Self {
        Self {
            fft_size: fft_size.max(2),
        }
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for SimBackend {
    fn create_context(&self) -> Result<Box<dyn AudioGraphContext>, AudioBindError> {
        Ok(Box::new(SimContext::new(self.fft_size)))
    }
}

struct SimSource {
    element_id: Uuid,
    handle: AnalyserHandle,
}

pub struct SimContext {
    fft: Arc<dyn Fft<f32>>,
    hann: Arc<Vec<f32>>,
    fft_size: usize,
    source: Option<SimSource>,
    closed: bool,
}

impl SimContext {
    fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fft: planner.plan_fft_forward(fft_size),
            hann: Arc::new(hann_window(fft_size)),
            fft_size,
            source: None,
            closed: false,
        }
    }
}

impl AudioGraphContext for SimContext {
    fn connect_media_source(
        &mut self,
        element: &mut AudioElement,
    ) -> Result<AnalyserHandle, AudioBindError> {
        if self.closed {
            return Err(AudioBindError::ContextClosed);
        }
        element.take_source_token()?;
        // One source per context; any previous wiring is replaced.
        self.disconnect_source();
        let handle = AnalyserHandle::new(self.fft_size / 2);
        self.source = Some(SimSource {
            element_id: element.id(),
            handle: handle.clone(),
        });
        debug!(element = %element.id(), "media source connected to sim graph");
        Ok(handle)
    }

    fn disconnect_source(&mut self) {
        if let Some(source) = self.source.take() {
            source.handle.zero();
        }
    }

    fn start(&mut self, element: &AudioElement) -> Result<PlaybackControl, PlaybackRuntimeError> {
        if self.closed {
            return Err(PlaybackRuntimeError::StartRejected(
                "audio context is closed".into(),
            ));
        }
        let clip = element
            .clip()
            .cloned()
            .ok_or(PlaybackRuntimeError::NothingLoaded)?;
        // Bins only flow if the connected source belongs to this element.
        let feed = self
            .source
            .as_ref()
            .filter(|s| s.element_id == element.id())
            .map(|s| s.handle.clone());

        let (done_tx, done_rx) = oneshot::channel();
        let stop = CancellationToken::new();
        let driver_stop = stop.clone();
        let fft = self.fft.clone();
        let hann = self.hann.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let done = tokio::time::sleep(clip.duration());
            tokio::pin!(done);
            let mut refresh = interval(BIN_REFRESH);
            refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let end = loop {
                tokio::select! {
                    _ = &mut done => break PlaybackEnd::Completed,
                    _ = driver_stop.cancelled() => break PlaybackEnd::Stopped,
                    _ = refresh.tick() => {
                        if let Some(handle) = &feed {
                            let bins = bins_at(&fft, &hann, &clip, started.elapsed());
                            handle.write_bins(&bins);
                        }
                    }
                }
            };
            if let Some(handle) = &feed {
                handle.zero();
            }
            let _ = done_tx.send(end);
        });

        Ok(PlaybackControl::new(done_rx, stop))
    }

    fn close(&mut self) {
        self.disconnect_source();
        self.closed = true;
    }
}

pub(crate) fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = i as f32 * core::f32::consts::PI * 2.0 / size as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

fn bins_at(
    fft: &Arc<dyn Fft<f32>>,
    hann: &[f32],
    clip: &DecodedClip,
    position: Duration,
) -> Vec<u8> {
    let start = (position.as_secs_f64() * clip.sample_rate as f64) as usize;
    let end = (start + hann.len()).min(clip.samples.len());
    let window = clip.samples.get(start..end).unwrap_or(&[]);
    byte_frequency_bins(fft, hann, window)
}

/// FFT over one `fft_size` sample window (zero-padded if short), magnitudes
/// mapped through the dB range onto 0..=255 byte bins.
pub(crate) fn byte_frequency_bins(
    fft: &Arc<dyn Fft<f32>>,
    hann: &[f32],
    window: &[f32],
) -> Vec<u8> {
    let fft_size = hann.len();
    let mut buf: Vec<Complex<f32>> = (0..fft_size)
        .map(|i| Complex {
            re: window.get(i).copied().unwrap_or(0.0) * hann[i],
            im: 0.0,
        })
        .collect();
    fft.process(&mut buf);

    buf.iter()
        .take(fft_size / 2)
        .map(|c| {
            let magnitude = c.norm() * 2.0 / fft_size as f32;
            let db = 20.0 * magnitude.max(1e-10).log10();
            let scaled = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
            (scaled.clamp(0.0, 1.0) * 255.0) as u8
        })
        .collect()
}
