use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::application::error::HttpError;
use crate::cache::ConsumeReport;
use crate::domain::entities::{EntityId, EntityRef};
use crate::domain::pages::PageType;

use super::AdminState;

const SOURCE: &str = "infra::http::admin::invalidation";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PageActionRequest {
    page: String,
    #[serde(default)]
    entity_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChangesRequest {
    triggers: Vec<EntityRef>,
    #[serde(default)]
    immediate: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidationResponse {
    /// `false` when the caches are disabled and nothing was published.
    accepted: bool,
    /// Present when the request was consumed before responding.
    report: Option<ConsumeReport>,
}

pub(super) async fn page_action(
    State(state): State<AdminState>,
    Json(body): Json<PageActionRequest>,
) -> Result<Response, HttpError> {
    let page: PageType = body.page.parse().map_err(|err| {
        HttpError::rejected(SOURCE, StatusCode::BAD_REQUEST, "Unknown page", &err)
    })?;
    let entity_id = body
        .entity_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(EntityId::new);

    let report = state.invalidation.page_action(page, entity_id).await;
    Ok(accepted(report.is_some(), report))
}

pub(super) async fn entities_changed(
    State(state): State<AdminState>,
    Json(body): Json<ChangesRequest>,
) -> Result<Response, HttpError> {
    if body.triggers.is_empty() {
        return Err(HttpError::invalid(
            SOURCE,
            "No triggers supplied",
            "`triggers` must contain at least one entity",
        ));
    }

    let enabled = state.invalidation.is_enabled();
    let report = state
        .invalidation
        .entities_changed(body.triggers, body.immediate)
        .await;
    Ok(accepted(enabled, report))
}

fn accepted(accepted: bool, report: Option<ConsumeReport>) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(InvalidationResponse { accepted, report }),
    )
        .into_response()
}
