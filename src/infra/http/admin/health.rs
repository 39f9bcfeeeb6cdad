use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::error::ErrorReport;

use super::AdminState;

/// `204` while the relational store answers, `503` with the failure attached
/// for the response log otherwise.
pub(super) async fn admin_health(State(state): State<AdminState>) -> Response {
    let Err(err) = state.db.check_health().await else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let status = StatusCode::SERVICE_UNAVAILABLE;
    let mut response = status.into_response();
    ErrorReport::capture("infra::http::admin::health", status, &err).attach(&mut response);
    response
}
