#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use anima::audio::clip::AudioPayload;
use anima::audio::graph::{
    AnalyserHandle, AudioBackend, AudioElement, AudioGraphContext, PlaybackControl, PlaybackEnd,
};
use anima::error::{AudioBindError, NetworkError, PlaybackRuntimeError};
use anima::services::SpeechSynthesizer;

/// Mono 16-bit PCM wav holding a sine tone.
pub fn sine_wav(seconds: f32, freq: f32, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
    let total = (seconds * sample_rate as f32) as u32;
    for n in 0..total {
        let t = n as f32 / sample_rate as f32;
        let amplitude = (t * freq * std::f32::consts::TAU).sin();
        writer
            .write_sample((amplitude * i16::MAX as f32 * 0.9) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

/// Mono 16-bit PCM wav of pure silence.
pub fn silent_wav(seconds: f32, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
    for _ in 0..(seconds * sample_rate as f32) as u32 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

/// In-memory speech service. Every call is recorded; individual texts can
/// be scripted to fail or to return a specific clip.
pub struct FakeSynthesizer {
    calls: Mutex<Vec<String>>,
    clips: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashSet<String>>,
    failures_once: Mutex<HashMap<String, usize>>,
    default_clip: Vec<u8>,
    delay: Duration,
}

impl FakeSynthesizer {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            clips: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashSet::new()),
            failures_once: Mutex::new(HashMap::new()),
            default_clip: sine_wav(0.3, 220.0, 16_000),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    /// Every call for `text` fails.
    pub fn fail_for(&self, text: &str) {
        self.failures.lock().unwrap().insert(text.to_string());
    }

    /// Only the next `times` calls for `text` fail.
    pub fn fail_times(&self, text: &str, times: usize) {
        self.failures_once
            .lock()
            .unwrap()
            .insert(text.to_string(), times);
    }

    pub fn clip_for(&self, text: &str, bytes: Vec<u8>) {
        self.clips.lock().unwrap().insert(text.to_string(), bytes);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioPayload, NetworkError> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        let fail_once = {
            let mut budgets = self.failures_once.lock().unwrap();
            match budgets.get_mut(text) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail_once || self.failures.lock().unwrap().contains(text) {
            return Err(NetworkError::Status {
                endpoint: "fake-tts".to_string(),
                status: 500,
            });
        }
        let bytes = self
            .clips
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.default_clip.clone());
        Ok(AudioPayload::new(bytes))
    }
}

/// Counters every scripted context reports into. `max_active_connections`
/// is the interesting one: it must never exceed 1.
#[derive(Default)]
pub struct BackendLog {
    pub contexts_created: AtomicUsize,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub starts: AtomicUsize,
    pub closes: AtomicUsize,
    pub active_connections: AtomicUsize,
    pub max_active_connections: AtomicUsize,
}

impl BackendLog {
    pub fn contexts_created(&self) -> usize {
        self.contexts_created.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn max_active_connections(&self) -> usize {
        self.max_active_connections.load(Ordering::SeqCst)
    }
}

/// One-shot failure budgets consumed by the scripted backend.
#[derive(Default)]
pub struct Script {
    pub context_failures: AtomicUsize,
    pub connect_failures: AtomicUsize,
    pub start_failures: AtomicUsize,
    fail_play_after: Mutex<HashMap<usize, Duration>>,
}

impl Script {
    /// The `nth` started clip (0-based, counted across all contexts) dies
    /// `after` into its run instead of completing.
    pub fn fail_play_on(&self, nth: usize, after: Duration) {
        self.fail_play_after.lock().unwrap().insert(nth, after);
    }
}

fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Backend whose contexts follow the shared `Script` and account every
/// lifecycle step into the shared `BackendLog`.
pub struct ScriptedBackend {
    pub log: Arc<BackendLog>,
    pub script: Arc<Script>,
    bin_count: usize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            log: Arc::new(BackendLog::default()),
            script: Arc::new(Script::default()),
            bin_count: 128,
        }
    }
}

impl AudioBackend for ScriptedBackend {
    fn create_context(&self) -> Result<Box<dyn AudioGraphContext>, AudioBindError> {
        self.log.contexts_created.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.script.context_failures) {
            return Err(AudioBindError::Backend("scripted context failure".into()));
        }
        Ok(Box::new(ScriptedContext {
            log: Arc::clone(&self.log),
            script: Arc::clone(&self.script),
            bin_count: self.bin_count,
            source: None,
            closed: false,
        }))
    }
}

pub struct ScriptedContext {
    log: Arc<BackendLog>,
    script: Arc<Script>,
    bin_count: usize,
    source: Option<(Uuid, AnalyserHandle)>,
    closed: bool,
}

impl AudioGraphContext for ScriptedContext {
    fn connect_media_source(
        &mut self,
        element: &mut AudioElement,
    ) -> Result<AnalyserHandle, AudioBindError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        if self.closed {
            return Err(AudioBindError::ContextClosed);
        }
        if take_failure(&self.script.connect_failures) {
            return Err(AudioBindError::Backend("scripted connect failure".into()));
        }
        element.take_source_token()?;
        self.disconnect_source();
        let now = self.log.active_connections.fetch_add(1, Ordering::SeqCst) + 1;
        self.log
            .max_active_connections
            .fetch_max(now, Ordering::SeqCst);
        let handle = AnalyserHandle::new(self.bin_count);
        // Constant mid energy while connected, so analyzed mouth > 0.
        handle.write_bins(&vec![128u8; self.bin_count]);
        self.source = Some((element.id(), handle.clone()));
        Ok(handle)
    }

    fn disconnect_source(&mut self) {
        if let Some((_, handle)) = self.source.take() {
            handle.zero();
            self.log.active_connections.fetch_sub(1, Ordering::SeqCst);
            self.log.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn start(&mut self, element: &AudioElement) -> Result<PlaybackControl, PlaybackRuntimeError> {
        let ordinal = self.log.starts.fetch_add(1, Ordering::SeqCst);
        if self.closed {
            return Err(PlaybackRuntimeError::StartRejected(
                "context closed".into(),
            ));
        }
        if take_failure(&self.script.start_failures) {
            return Err(PlaybackRuntimeError::StartRejected(
                "scripted start failure".into(),
            ));
        }
        let clip = element
            .clip()
            .cloned()
            .ok_or(PlaybackRuntimeError::NothingLoaded)?;
        let fail_after = self.script.fail_play_after.lock().unwrap().remove(&ordinal);

        let (done_tx, done_rx) = oneshot::channel();
        let stop = CancellationToken::new();
        let driver_stop = stop.clone();
        tokio::spawn(async move {
            let end = tokio::select! {
                _ = tokio::time::sleep(clip.duration()) => PlaybackEnd::Completed,
                _ = driver_stop.cancelled() => PlaybackEnd::Stopped,
                _ = async {
                    match fail_after {
                        Some(at) => tokio::time::sleep(at).await,
                        None => std::future::pending().await,
                    }
                } => PlaybackEnd::Failed(PlaybackRuntimeError::Device(
                    "scripted mid-play failure".into(),
                )),
            };
            let _ = done_tx.send(end);
        });
        Ok(PlaybackControl::new(done_rx, stop))
    }

    fn close(&mut self) {
        self.disconnect_source();
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
    }
}
