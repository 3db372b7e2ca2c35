use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::audio::clip::AudioPayload;
use crate::error::NetworkError;

// Synthesis is slow relative to the reply service; give it room.
const SPEECH_TIMEOUT_SECS: u64 = 120;

/// Speech synthesis as the cache and sequencer see it. A trait so both are
/// testable without the real service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioPayload, NetworkError>;
}

/// HTTP client for the speech-synthesis service: `{text}` in, WAV bytes out.
/// A non-success status or an empty body is a `NetworkError`.
#[derive(Clone)]
pub struct HttpSpeechSynthesizer {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
}

impl HttpSpeechSynthesizer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(SPEECH_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioPayload, NetworkError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SpeechRequest { text })
            .send()
            .await
            .map_err(|source| NetworkError::Transport {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(NetworkError::Status {
                endpoint: self.endpoint.clone(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| NetworkError::Transport {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(NetworkError::EmptyPayload {
                endpoint: self.endpoint.clone(),
            });
        }

        Ok(AudioPayload::new(bytes.to_vec()))
    }
}
