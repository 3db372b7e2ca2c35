use thiserror::Error;

/// Reply / speech-synthesis fetch failures. Recovered locally: the caller
/// degrades to simulated mouth movement instead of aborting the sequence.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("{endpoint} returned an empty audio payload")]
    EmptyPayload { endpoint: String },
}

/// Failures while wiring the playable resource into the analysis graph.
/// Never fatal: the engine walks its bind strategies and, if all fail,
/// plays without analysis.
#[derive(Debug, Error)]
pub enum AudioBindError {
    /// The element already surrendered its once-only media-source token.
    #[error("media source already attached to this audio element")]
    SourceAlreadyAttached,
    #[error("audio context is closed")]
    ContextClosed,
    #[error("audio backend unavailable: {0}")]
    Backend(String),
}

/// Decode / start / mid-playback failures. Surfaced as the error side of
/// the engine's `play`, which the sequencer treats as a join error.
#[derive(Debug, Error)]
pub enum PlaybackRuntimeError {
    #[error("failed to decode clip")]
    Decode(#[from] hound::Error),
    #[error("no clip loaded into the audio element")]
    NothingLoaded,
    #[error("playback start rejected: {0}")]
    StartRejected(String),
    #[error("playback device failed: {0}")]
    Device(String),
}

/// An error that escaped a segment's reveal+playback join. Aborts the
/// remaining sequence; a visible marker is appended to the text sink.
#[derive(Debug, Error)]
#[error("segment {index} playback failed: {source}")]
pub struct SequenceError {
    pub index: usize,
    #[source]
    pub source: PlaybackRuntimeError,
}
