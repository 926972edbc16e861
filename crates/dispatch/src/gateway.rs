use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::info;
use url::Url;

use shared::protocol::{RejectReason, TriggerRequest};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("dispatch rejected: {0}")]
    Rejected(RejectReason),
    #[error("dispatch gateway unreachable: {0}")]
    Unreachable(String),
}

/// Hands a publish request to the job runner that hosts the worker.
/// `Ok(())` means accepted for execution, never executed; the catalog
/// document is the only place outcomes appear.
#[async_trait]
pub trait TriggerGateway: Send + Sync {
    async fn dispatch(&self, request: &TriggerRequest) -> Result<(), GatewayError>;
}

pub struct MissingTriggerGateway;

#[async_trait]
impl TriggerGateway for MissingTriggerGateway {
    async fn dispatch(&self, request: &TriggerRequest) -> Result<(), GatewayError> {
        Err(GatewayError::Unreachable(format!(
            "no trigger gateway configured for item {}",
            request.item_id
        )))
    }
}

/// POSTs the trigger body to a dispatch endpoint with a bearer credential.
pub struct HttpTriggerGateway {
    http: Client,
    endpoint: Url,
    credential: String,
}

impl HttpTriggerGateway {
    /// The credential's shape is checked here so an obviously broken setup
    /// surfaces before the first click instead of as a confusing 401.
    pub fn new(endpoint: Url, credential: impl Into<String>) -> Result<Self, GatewayError> {
        let credential = credential.into();
        if credential.trim().is_empty() || credential.contains(char::is_whitespace) {
            return Err(GatewayError::Rejected(RejectReason::BadCredential));
        }
        Ok(Self {
            http: Client::new(),
            endpoint,
            credential,
        })
    }
}

#[async_trait]
impl TriggerGateway for HttpTriggerGateway {
    async fn dispatch(&self, request: &TriggerRequest) -> Result<(), GatewayError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.credential)
            .json(request)
            .send()
            .await
            .map_err(|err| GatewayError::Unreachable(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                info!(
                    item_id = %request.item_id,
                    delivery_id = %request.delivery_id,
                    retry = request.retry,
                    "dispatch: trigger accepted"
                );
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(GatewayError::Rejected(RejectReason::BadCredential))
            }
            StatusCode::NOT_FOUND => Err(GatewayError::Rejected(RejectReason::UnknownTarget)),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(GatewayError::Rejected(RejectReason::RateLimited))
            }
            status => Err(GatewayError::Unreachable(format!(
                "dispatch endpoint returned {status}"
            ))),
        }
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
