use async_trait::async_trait;
use reqwest::{header, Client, Method, Response, StatusCode};
use url::Url;

use shared::domain::{Catalog, Revision};

use crate::{CatalogStore, StoreError};

/// Catalog document behind an HTTP endpoint that speaks conditional
/// requests: `GET` returns the document plus an `ETag`, `PUT` with
/// `If-Match` is the revision-guarded write, `PUT` without it overwrites.
/// The `ETag` value is carried verbatim so weak validators round-trip.
pub struct HttpCatalogStore {
    http: Client,
    document_url: Url,
    credential: Option<String>,
}

impl HttpCatalogStore {
    pub fn new(document_url: Url, credential: Option<String>) -> Self {
        Self {
            http: Client::new(),
            document_url,
            credential,
        }
    }

    fn request(&self, method: Method) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, self.document_url.clone());
        if let Some(credential) = &self.credential {
            request = request.bearer_auth(credential);
        }
        request
    }

    fn revision_from(response: &Response) -> Result<Revision, StoreError> {
        response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(Revision::new)
            .ok_or_else(|| {
                StoreError::Transport("catalog endpoint returned no ETag revision".into())
            })
    }
}

#[async_trait]
impl CatalogStore for HttpCatalogStore {
    async fn load(&self) -> Result<(Catalog, Revision), StoreError> {
        let response = self
            .request(Method::GET)
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound),
            status if status.is_success() => {
                let revision = Self::revision_from(&response)?;
                let bytes = response.bytes().await.map_err(transport)?;
                let catalog = serde_json::from_slice(&bytes)
                    .map_err(|err| StoreError::Corrupt(err.to_string()))?;
                Ok((catalog, revision))
            }
            status => Err(StoreError::Transport(format!(
                "catalog load returned {status}"
            ))),
        }
    }

    async fn save(
        &self,
        catalog: &Catalog,
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        let response = self
            .request(Method::PUT)
            .header(header::IF_MATCH, expected.as_str())
            .json(catalog)
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                Err(StoreError::Conflict)
            }
            StatusCode::NOT_FOUND => Err(StoreError::NotFound),
            status if status.is_success() => Self::revision_from(&response),
            status => Err(StoreError::Transport(format!(
                "catalog save returned {status}"
            ))),
        }
    }

    async fn replace(&self, catalog: &Catalog) -> Result<Revision, StoreError> {
        let response = self
            .request(Method::PUT)
            .json(catalog)
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            status if status.is_success() => Self::revision_from(&response),
            status => Err(StoreError::Transport(format!(
                "catalog replace returned {status}"
            ))),
        }
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
