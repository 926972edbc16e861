use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use shared::domain::ItemId;

use crate::ports::{
    Platform, PlatformError, PostConfirmation, RenderError, RenderedThread, Renderer,
};

const REMOTE_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REASON_CHARS: usize = 160;

#[derive(Debug, Serialize)]
struct RenderRequestBody<'a> {
    item_id: &'a str,
    payload: &'a Value,
}

#[derive(Debug, Deserialize)]
struct RenderResponseBody {
    segments: Vec<String>,
    #[serde(default)]
    image_b64: Option<String>,
}

/// Renderer backed by the thread-layout service. Rendering is free of side
/// effects, so every failure folds into [`RenderError`].
pub struct HttpRenderer {
    http: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpRenderer {
    pub fn new(endpoint: Url) -> Self {
        Self::with_timeout(endpoint, REMOTE_CALL_TIMEOUT)
    }

    pub fn with_timeout(endpoint: Url, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, item_id: &ItemId, payload: &Value) -> Result<RenderedThread, RenderError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&RenderRequestBody {
                item_id: item_id.as_str(),
                payload,
            })
            .send()
            .await
            .map_err(|error| RenderError(format!("render service unreachable: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError(format!("render service returned {status}")));
        }

        let body: RenderResponseBody = response
            .json()
            .await
            .map_err(|error| RenderError(format!("render service response was unreadable: {error}")))?;
        if body.segments.is_empty() || body.segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(RenderError(
                "render service produced no usable segments".to_string(),
            ));
        }

        let image_png = match body.image_b64 {
            Some(encoded) => Some(STANDARD.decode(encoded.as_bytes()).map_err(|error| {
                RenderError(format!("render service image was not valid base64: {error}"))
            })?),
            None => None,
        };

        debug!(item_id = %item_id, segments = body.segments.len(), "render: thread ready");
        Ok(RenderedThread {
            segments: body.segments,
            image_png,
        })
    }
}

#[derive(Debug, Serialize)]
struct PostRequestBody<'a> {
    segments: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    image_b64: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostResponseBody {
    post_ids: Vec<String>,
    #[serde(default)]
    posted_at: Option<DateTime<Utc>>,
}

/// Platform client. The error mapping preserves the posted/not-posted
/// distinction: only outcomes where the request provably never reached
/// acceptance become [`PlatformError::Rejected`].
pub struct HttpPlatform {
    http: Client,
    endpoint: Url,
    credential: String,
    timeout: Duration,
}

impl HttpPlatform {
    pub fn new(endpoint: Url, credential: String) -> Self {
        Self::with_timeout(endpoint, credential, REMOTE_CALL_TIMEOUT)
    }

    pub fn with_timeout(endpoint: Url, credential: String, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            credential,
            timeout,
        }
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn post_thread(&self, thread: &RenderedThread) -> Result<PostConfirmation, PlatformError> {
        let body = PostRequestBody {
            segments: &thread.segments,
            image_b64: thread.image_png.as_deref().map(|bytes| STANDARD.encode(bytes)),
        };

        let response = match self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.credential)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) if error.is_timeout() => {
                return Err(PlatformError::Ambiguous {
                    reason: "platform request timed out".to_string(),
                })
            }
            // The connection never opened, so nothing reached the platform.
            Err(error) if error.is_connect() => {
                return Err(PlatformError::Rejected {
                    reason: format!("platform unreachable: {error}"),
                })
            }
            Err(error) => {
                return Err(PlatformError::Ambiguous {
                    reason: format!("platform request failed mid-flight: {error}"),
                })
            }
        };

        let status = response.status();
        if status.is_success() {
            let receipt: PostResponseBody = response.json().await.map_err(|error| {
                PlatformError::Ambiguous {
                    reason: format!(
                        "platform accepted the request but the receipt was unreadable: {error}"
                    ),
                }
            })?;
            if receipt.post_ids.is_empty() {
                return Err(PlatformError::Ambiguous {
                    reason: "platform receipt carried no post ids".to_string(),
                });
            }
            return Ok(PostConfirmation {
                post_ids: receipt.post_ids,
                posted_at: receipt.posted_at.unwrap_or_else(Utc::now),
            });
        }

        if status.is_client_error() {
            let reason = match response.text().await {
                Ok(text) if !text.trim().is_empty() => {
                    format!("{status}: {}", short_reason(&text))
                }
                _ => status.to_string(),
            };
            return Err(PlatformError::Rejected { reason });
        }

        // 5xx: the platform may have acted before it fell over.
        Err(PlatformError::Ambiguous {
            reason: format!("platform returned {status}"),
        })
    }
}

fn short_reason(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_REASON_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_REASON_CHARS).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
