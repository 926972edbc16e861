use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use shared::domain::ItemId;

/// A rendered thread ready to post: ordered text segments plus an optional
/// chart image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedThread {
    pub segments: Vec<String>,
    pub image_png: Option<Vec<u8>>,
}

/// Receipt for a thread the platform confirmed it accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostConfirmation {
    pub post_ids: Vec<String>,
    pub posted_at: DateTime<Utc>,
}

/// Rendering has no external side effects, so a render failure is always a
/// clean failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Posting is not idempotent. The variants preserve the one distinction the
/// runner must not lose: whether the thread definitely did not go out.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform refused the request before accepting it; nothing was
    /// posted.
    #[error("{reason}")]
    Rejected { reason: String },
    /// The request died after the platform may have accepted it. The thread
    /// may or may not exist remotely; only manual verification can tell.
    #[error("{reason}")]
    Ambiguous { reason: String },
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, item_id: &ItemId, payload: &Value) -> Result<RenderedThread, RenderError>;
}

#[async_trait]
pub trait Platform: Send + Sync {
    async fn post_thread(&self, thread: &RenderedThread) -> Result<PostConfirmation, PlatformError>;
}

/// Stand-in wired by default so a half-configured worker fails loudly
/// instead of posting garbage.
pub struct MissingRenderer;

#[async_trait]
impl Renderer for MissingRenderer {
    async fn render(&self, item_id: &ItemId, _payload: &Value) -> Result<RenderedThread, RenderError> {
        Err(RenderError(format!(
            "no renderer configured for item {item_id}"
        )))
    }
}

pub struct MissingPlatform;

#[async_trait]
impl Platform for MissingPlatform {
    async fn post_thread(&self, _thread: &RenderedThread) -> Result<PostConfirmation, PlatformError> {
        Err(PlatformError::Rejected {
            reason: "no platform client configured".to_string(),
        })
    }
}
