use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

const REPLY_TIMEOUT_SECS: u64 = 60;

/// Client for the reply service: `{message}` in, `{reply}` out.
#[derive(Clone)]
pub struct ReplyClient {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct AskRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct AskResponse {
    reply: String,
}

impl ReplyClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REPLY_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
        }
    }

    pub async fn ask(&self, message: &str) -> Result<String, NetworkError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AskRequest { message })
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

        let body: AskResponse =
            response
                .json()
                .await
                .map_err(|source| NetworkError::Transport {
                    endpoint: self.endpoint.clone(),
                    source,
                })?;
        Ok(body.reply)
    }
}
