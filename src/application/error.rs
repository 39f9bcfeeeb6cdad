use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::LoadError, domain::error::DomainError, graph::GraphError, infra::error::InfraError,
    tracker::TrackerError,
};

/// Private diagnostics for a failed admin request.
///
/// Stored in the response extensions, where the logging middleware picks it
/// up. The client only ever sees the public message.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    /// Outermost error first, then each `source()` in turn.
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn capture(
        source: &'static str,
        status: StatusCode,
        error: &(dyn StdError + 'static),
    ) -> Self {
        let messages = std::iter::successors(Some(error), |&current| current.source())
            .map(ToString::to_string)
            .collect();
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn note(source: &'static str, status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            source,
            status,
            messages: vec![detail.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

/// Rejection returned by admin handlers.
#[derive(Debug)]
pub struct HttpError {
    public: &'static str,
    report: ErrorReport,
}

impl HttpError {
    /// Reject malformed input with a fixed public message and a free-form
    /// detail for the logs.
    pub fn invalid(source: &'static str, public: &'static str, detail: impl Into<String>) -> Self {
        Self {
            public,
            report: ErrorReport::note(source, StatusCode::BAD_REQUEST, detail),
        }
    }

    /// Reject with `status`, keeping the full error chain for the logs.
    pub fn rejected(
        source: &'static str,
        status: StatusCode,
        public: &'static str,
        error: &(dyn StdError + 'static),
    ) -> Self {
        Self {
            public,
            report: ErrorReport::capture(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.report.status
    }
}

impl From<DomainError> for HttpError {
    fn from(error: DomainError) -> Self {
        HttpError::rejected(
            "application::error::domain",
            StatusCode::BAD_REQUEST,
            "Request could not be processed",
            &error,
        )
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (
            self.report.status,
            Json(ErrorBody { error: self.public }),
        )
            .into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Failures that end a command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("configuration could not be loaded: {0}")]
    Config(#[from] LoadError),
    #[error("relation graph unavailable: {0}")]
    Graph(#[from] GraphError),
    #[error("dependency tracking failed: {0}")]
    Tracker(#[from] TrackerError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Whether retrying the same command later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Tracker(_)
                | AppError::Infra(InfraError::Database { .. } | InfraError::Origin { .. })
                | AppError::Graph(GraphError::Introspection(_))
        )
    }
}
