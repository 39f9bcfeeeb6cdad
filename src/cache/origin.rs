//! Remote origin the entity cache fetches misses from.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::entities::EntityType;

/// One batched origin call. Items come back ids first, then slugs, each in
/// request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginRequest {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub ids: Vec<String>,
    pub slugs: Vec<String>,
}

impl OriginRequest {
    pub fn len(&self) -> usize {
        self.ids.len() + self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("origin transport failed: {0}")]
    Transport(String),
    #[error("origin responded with status {status}")]
    Status { status: u16 },
    #[error("origin returned {returned} items for {requested} keys")]
    LengthMismatch { requested: usize, returned: usize },
    #[error("origin item could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

#[async_trait]
pub trait RemoteOrigin: Send + Sync {
    /// Fetch every requested item. Errors fail the whole batch.
    async fn fetch(&self, request: &OriginRequest) -> Result<Vec<serde_json::Value>, OriginError>;
}
