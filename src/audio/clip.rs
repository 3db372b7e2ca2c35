use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::error::PlaybackRuntimeError;

/// Offline envelope density: 30 points per second of audio.
const ENVELOPE_POINTS_PER_SEC: u32 = 30;

/// Raw synthesized speech bytes (WAV) as returned by the speech service.
/// Cheap to clone; the cache and the clip store share the same buffer.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    bytes: Arc<Vec<u8>>,
}

impl AudioPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes the WAV container, mixing all channels down to mono.
    pub fn decode(&self) -> Result<DecodedClip, PlaybackRuntimeError> {
        let mut reader = hound::WavReader::new(Cursor::new(self.as_slice()))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                reader.samples::<f32>().collect::<Result<_, _>>()?
            }
            hound::SampleFormat::Int => {
                let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let channels = spec.channels.max(1) as usize;
        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };

        Ok(DecodedClip {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// A decoded speech clip: mono samples plus the original stream metadata.
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub sample_rate: u32,
    pub channels: u16,
    /// Mono-mixed samples; the analyser and the envelope both read these.
    pub samples: Vec<f32>,
}

impl DecodedClip {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Offline mouth-openness envelope for external consumers: min-shift,
    /// peak-normalize, log-compress, renormalize ×1.2, then one point per
    /// 1/30s window taking the window maximum, clamped non-negative.
    pub fn mouth_envelope(&self) -> MouthEnvelope {
        let duration = self.duration().as_secs_f32();
        if self.samples.is_empty() || self.sample_rate == 0 {
            return MouthEnvelope {
                duration,
                points: Vec::new(),
            };
        }

        let floor = self.samples.iter().cloned().fold(f32::INFINITY, f32::min);
        let mut shaped: Vec<f32> = self.samples.iter().map(|s| s - floor).collect();

        let peak = shaped.iter().cloned().fold(0.0f32, f32::max);
        let peak = if peak > 0.0 { peak } else { 1.0 };
        for v in shaped.iter_mut() {
            *v /= peak;
            *v = (*v + 1e-10).ln() + 1.0;
        }

        let peak = shaped.iter().cloned().fold(0.0f32, f32::max);
        let peak = if peak > 0.0 { peak } else { 1.0 };
        for v in shaped.iter_mut() {
            *v = *v / peak * 1.2;
        }

        let step = ((self.sample_rate / ENVELOPE_POINTS_PER_SEC) as usize).max(1);
        let points = shaped
            .chunks(step)
            .map(|window| {
                window
                    .iter()
                    .cloned()
                    .fold(0.0f32, f32::max)
                    .max(0.0)
            })
            .collect();

        MouthEnvelope { duration, points }
    }
}

/// `{duration, mouth_shape_data}` served to alternative frontends that
/// animate the mouth themselves instead of the live analyser path.
#[derive(Debug, Clone, Serialize)]
pub struct MouthEnvelope {
    pub duration: f32,
    #[serde(rename = "mouth_shape_data")]
    pub points: Vec<f32>,
}

/// Capability handle for a registered clip. Binding a released URL fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClipUrl(Uuid);

impl fmt::Display for ClipUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip:{}", self.0)
    }
}

/// Registry of live clip URLs, the object-URL discipline: a payload is
/// registered to get a URL, resolved while playing, and released only after
/// no session references it anymore (the engine defers the release).
#[derive(Debug, Default)]
pub struct ClipStore {
    clips: Mutex<HashMap<ClipUrl, AudioPayload>>,
}

impl ClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, payload: AudioPayload) -> ClipUrl {
        let url = ClipUrl(Uuid::new_v4());
        self.clips
            .lock()
            .expect("clip store lock")
            .insert(url.clone(), payload);
        url
    }

    pub fn resolve(&self, url: &ClipUrl) -> Option<AudioPayload> {
        self.clips.lock().expect("clip store lock").get(url).cloned()
    }

    pub fn release(&self, url: &ClipUrl) {
        self.clips.lock().expect("clip store lock").remove(url);
    }

    pub fn contains(&self, url: &ClipUrl) -> bool {
        self.clips.lock().expect("clip store lock").contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.clips.lock().expect("clip store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
