use std::time::Duration;

use serde::Deserialize;

/// Tunables for the synchronization engine. Defaults reproduce the shipped
/// character: 50ms typewriter cadence, ~30fps mouth animation, speech energy
/// read from the 20..80 frequency-bin band.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between revealed characters.
    pub reveal_char_delay_ms: u64,
    /// Animation frame cadence for the lip-sync loop.
    pub frame_interval_ms: u64,
    /// FFT size of the analyser; it publishes `fft_size / 2` byte bins.
    pub analyser_fft_size: usize,
    /// Inclusive start / exclusive end of the frequency-bin band that is
    /// averaged into mouth energy. Clipped to the available bin count.
    pub analyser_band_start: usize,
    pub analyser_band_end: usize,
    /// Reference ceiling the band average is normalized by. Speech energy
    /// rarely reaches it, which is why the curve below exaggerates.
    pub analyser_ceiling: f32,
    /// Exponent applied to the normalized energy (values < ceiling get
    /// boosted toward visible mouth openings).
    pub mouth_curve_exponent: f32,
    /// The visible mouth never opens past this fraction of full aperture.
    pub max_mouth_aperture: f32,
    /// Frame count of the bounded fallback animation played when a segment
    /// has no audio at all.
    pub fallback_frames: u32,
    /// How long a finished clip URL lingers before release. Covers the
    /// fast-forward race where cleanup runs after the next segment started.
    pub url_release_delay_ms: u64,
    /// Appended to the text sink when a segment join fails.
    pub error_marker: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reveal_char_delay_ms: 50,
            frame_interval_ms: 33,
            analyser_fft_size: 256,
            analyser_band_start: 20,
            analyser_band_end: 80,
            analyser_ceiling: 128.0,
            mouth_curve_exponent: 1.5,
            max_mouth_aperture: 0.8,
            fallback_frames: 30,
            url_release_delay_ms: 500,
            error_marker: " ⚠".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_char_delay_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.url_release_delay_ms)
    }
}
