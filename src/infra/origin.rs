//! HTTP origin for entity-cache misses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::cache::{OriginError, OriginRequest, RemoteOrigin};

use super::error::InfraError;

const BATCH_PATH: &str = "entities/batch";

/// POSTs `{type, ids, slugs}` to `{base}/entities/batch` and expects a JSON
/// array with one item per requested key.
#[derive(Clone, Debug)]
pub struct HttpOrigin {
    client: Client,
    endpoint: Url,
}

impl HttpOrigin {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, InfraError> {
        let endpoint = with_trailing_slash(base_url)
            .join(BATCH_PATH)
            .map_err(|err| InfraError::configuration(format!("invalid origin URL: {err}")))?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| {
                InfraError::origin(format!("failed to build client: {err}"))
            })?;
        Ok(Self { client, endpoint })
    }

    pub fn user_agent() -> &'static str {
        concat!("tripwire/", env!("CARGO_PKG_VERSION"))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteOrigin for HttpOrigin {
    async fn fetch(&self, request: &OriginRequest) -> Result<Vec<serde_json::Value>, OriginError> {
        debug!(
            endpoint = %self.endpoint,
            entity_type = %request.entity_type,
            keys = request.len(),
            "Fetching from origin"
        );

        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|err| OriginError::Transport(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OriginError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|err| OriginError::Transport(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(OriginError::Decode)
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn with_trailing_slash(base: &Url) -> Url {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}
