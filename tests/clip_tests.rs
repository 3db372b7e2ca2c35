mod common;

use std::io::Cursor;
use std::time::Duration;

use anima::audio::{AudioElement, AudioPayload, ClipStore};
use anima::error::PlaybackRuntimeError;

use common::sine_wav;

/// Stereo 16-bit wav with constant per-channel values.
fn stereo_wav(seconds: f32, sample_rate: u32, left: f32, right: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
    for _ in 0..(seconds * sample_rate as f32) as u32 {
        writer.write_sample((left * i16::MAX as f32) as i16).unwrap();
        writer.write_sample((right * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

#[test]
fn test_decode_mixes_stereo_down_to_mono() {
    // Opposite channels cancel out in the mixdown.
    let payload = AudioPayload::new(stereo_wav(0.1, 16_000, 0.5, -0.5));

    let clip = payload.decode().unwrap();

    assert_eq!(clip.channels, 2);
    assert_eq!(clip.samples.len(), 1_600);
    assert!(clip.samples.iter().all(|s| s.abs() < 1e-3));
}

#[test]
fn test_decode_rejects_garbage_bytes() {
    let payload = AudioPayload::new(vec![0x00, 0x01, 0x02, 0x03]);

    let err = payload.decode().unwrap_err();

    assert!(matches!(err, PlaybackRuntimeError::Decode(_)));
}

#[test]
fn test_duration_follows_the_sample_count() {
    let payload = AudioPayload::new(sine_wav(0.5, 220.0, 16_000));

    let clip = payload.decode().unwrap();

    assert_eq!(clip.sample_rate, 16_000);
    let expected = Duration::from_millis(500);
    let delta = clip.duration().abs_diff(expected);
    assert!(delta < Duration::from_millis(2), "duration off by {delta:?}");
}

#[test]
fn test_mouth_envelope_density_and_bounds() {
    // 1. One second of tone: ~30 points, all within [0, 1.2].
    let clip = AudioPayload::new(sine_wav(1.0, 220.0, 16_000))
        .decode()
        .unwrap();

    let envelope = clip.mouth_envelope();

    assert!((1.0 - envelope.duration).abs() < 0.01);
    assert!(
        (30..=31).contains(&envelope.points.len()),
        "wrong point density: {}",
        envelope.points.len()
    );
    assert!(envelope.points.iter().all(|p| (0.0..=1.2 + 1e-4).contains(p)));
    assert!(envelope.points.iter().any(|p| *p > 1.0), "peak never scaled up");

    // 2. Silence keeps the mouth closed everywhere.
    let silent = AudioPayload::new(common::silent_wav(0.5, 16_000))
        .decode()
        .unwrap();
    assert!(silent.mouth_envelope().points.iter().all(|p| *p == 0.0));
}

#[test]
fn test_a_released_url_refuses_to_load() {
    // 1. Register a clip, point an element at it, then revoke the URL.
    let store = ClipStore::new();
    let url = store.register(AudioPayload::new(sine_wav(0.1, 220.0, 16_000)));
    let mut element = AudioElement::new();
    element.set_source(url.clone());
    store.release(&url);

    // 2. Loading the stale capability is rejected, not silently empty.
    let err = element.load(&store).unwrap_err();
    assert!(matches!(err, PlaybackRuntimeError::StartRejected(_)));
    assert!(element.clip().is_none());

    // 3. Re-registering gives a fresh URL; the old one stays dead.
    let replacement = store.register(AudioPayload::new(sine_wav(0.1, 220.0, 16_000)));
    assert_ne!(replacement, url);
    assert!(!store.contains(&url));
}

#[test]
fn test_store_urls_live_until_released() {
    let store = ClipStore::new();
    let payload = AudioPayload::new(sine_wav(0.1, 220.0, 16_000));

    // 1. Registering hands out a live URL.
    let url = store.register(payload.clone());
    assert!(store.contains(&url));
    assert_eq!(store.len(), 1);

    // 2. Resolving clones the same bytes.
    let resolved = store.resolve(&url).unwrap();
    assert_eq!(resolved.as_slice(), payload.as_slice());

    // 3. A released URL no longer binds.
    store.release(&url);
    assert!(store.resolve(&url).is_none());
    assert!(store.is_empty());
}
