use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rustfft::{Fft, FftPlanner};
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::clip::DecodedClip;
use super::graph::{
    AnalyserHandle, AudioBackend, AudioElement, AudioGraphContext, PlaybackControl, PlaybackEnd,
};
use super::sim::{byte_frequency_bins, hann_window};
use crate::error::{AudioBindError, PlaybackRuntimeError};

const BIN_REFRESH: Duration = Duration::from_millis(16);

/// Real output through the default sound card. The cpal stream lives on its
/// own thread since it cannot cross await points; the analyser is fed from
/// the decoded samples at the playhead position, the same math the sim
/// backend uses.
#[derive(Debug, Clone)]
pub struct DeviceBackend {
    fft_size: usize,
}

impl DeviceBackend {
    pub fn new() -> Self {
        Self { fft_size: 256 }
    }

    pub fn with_fft_size(fft_size: usize) -> Self {
        Self {
            fft_size: fft_size.max(2),
        }
    }
}

impl Default for DeviceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for DeviceBackend {
    fn create_context(&self) -> Result<Box<dyn AudioGraphContext>, AudioBindError> {
        Ok(Box::new(DeviceContext::new(self.fft_size)))
    }
}

struct DeviceSource {
    element_id: Uuid,
    handle: AnalyserHandle,
}

pub struct DeviceContext {
    fft: Arc<dyn Fft<f32>>,
    hann: Arc<Vec<f32>>,
    fft_size: usize,
    source: Option<DeviceSource>,
    closed: bool,
}

impl DeviceContext {
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

impl AudioGraphContext for DeviceContext {
    fn connect_media_source(
        &mut self,
        element: &mut AudioElement,
    ) -> Result<AnalyserHandle, AudioBindError> {
        if self.closed {
            return Err(AudioBindError::ContextClosed);
        }
        element.take_source_token()?;
        self.disconnect_source();
        let handle = AnalyserHandle::new(self.fft_size / 2);
        self.source = Some(DeviceSource {
            element_id: element.id(),
            handle: handle.clone(),
        });
        debug!(element = %element.id(), "media source connected to device graph");
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
        let feed = self
            .source
            .as_ref()
            .filter(|s| s.element_id == element.id())
            .map(|s| s.handle.clone());

        let (done_tx, done_rx) = oneshot::channel();
        let stop = CancellationToken::new();
        let playhead = Arc::new(AtomicUsize::new(0));

        let thread_clip = Arc::clone(&clip);
        let thread_playhead = Arc::clone(&playhead);
        let thread_stop = stop.clone();
        std::thread::Builder::new()
            .name("anima-playback".into())
            .spawn(move || {
                let end = match run_output_stream(&thread_clip, &thread_playhead, &thread_stop) {
                    Ok(end) => end,
                    Err(detail) => PlaybackEnd::Failed(PlaybackRuntimeError::Device(detail)),
                };
                let _ = done_tx.send(end);
            })
            .map_err(|err| PlaybackRuntimeError::Device(err.to_string()))?;

        if let Some(handle) = feed {
            let fft = self.fft.clone();
            let hann = self.hann.clone();
            let bins_stop = stop.clone();
            tokio::spawn(async move {
                let mut refresh = interval(BIN_REFRESH);
                refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = bins_stop.cancelled() => break,
                        _ = refresh.tick() => {
                            let at = playhead.load(Ordering::Relaxed);
                            let end = (at + hann.len()).min(clip.samples.len());
                            let window = clip.samples.get(at..end).unwrap_or(&[]);
                            handle.write_bins(&byte_frequency_bins(&fft, &hann, window));
                        }
                    }
                }
                handle.zero();
            });
        }

        Ok(PlaybackControl::new(done_rx, stop))
    }

    fn close(&mut self) {
        self.disconnect_source();
        self.closed = true;
    }
}

/// Blocking body of the playback thread: opens the default output device,
/// walks the clip through the stream callback, and polls for the end.
fn run_output_stream(
    clip: &Arc<DecodedClip>,
    playhead: &Arc<AtomicUsize>,
    stop: &CancellationToken,
) -> Result<PlaybackEnd, String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("no output device available")?;
    info!("Audio Output Device: {}", device.name().unwrap_or_default());

    let config = device.default_output_config().map_err(|e| e.to_string())?;
    let sample_format = config.sample_format();
    let channels = config.channels() as usize;
    let device_rate = config.sample_rate().0;
    let stream_config: cpal::StreamConfig = config.into();

    // Nearest-sample walk covers rate mismatch; good enough for speech.
    let step = clip.sample_rate as f64 / device_rate.max(1) as f64;
    let total = clip.samples.len();

    let err_fn = |err| error!("an error occurred on stream: {}", err);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let source = Arc::clone(clip);
            let head = Arc::clone(playhead);
            let mut src_pos = 0f64;
            device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &_| {
                        for frame in data.chunks_mut(channels.max(1)) {
                            let sample =
                                source.samples.get(src_pos as usize).copied().unwrap_or(0.0);
                            for slot in frame.iter_mut() {
                                *slot = sample;
                            }
                            src_pos += step;
                        }
                        head.store((src_pos as usize).min(total), Ordering::Relaxed);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| e.to_string())?
        }
        cpal::SampleFormat::I16 => {
            let source = Arc::clone(clip);
            let head = Arc::clone(playhead);
            let mut src_pos = 0f64;
            device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &_| {
                        for frame in data.chunks_mut(channels.max(1)) {
                            let sample =
                                source.samples.get(src_pos as usize).copied().unwrap_or(0.0);
                            let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                            for slot in frame.iter_mut() {
                                *slot = quantized;
                            }
                            src_pos += step;
                        }
                        head.store((src_pos as usize).min(total), Ordering::Relaxed);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| e.to_string())?
        }
        other => return Err(format!("unsupported sample format: {other:?}")),
    };

    stream.play().map_err(|e| e.to_string())?;

    loop {
        if stop.is_cancelled() {
            return Ok(PlaybackEnd::Stopped);
        }
        if playhead.load(Ordering::Relaxed) >= total {
            // Let the device drain its tail before the stream drops.
            std::thread::sleep(Duration::from_millis(50));
            return Ok(PlaybackEnd::Completed);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
