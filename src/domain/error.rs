use thiserror::Error;

/// Rejected textual input for domain identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown entity type `{0}`")]
    UnknownEntityType(String),
    #[error("unknown page type `{0}`")]
    UnknownPage(String),
    #[error("malformed entity reference `{value}`: {reason}")]
    MalformedRef { value: String, reason: &'static str },
}

impl DomainError {
    pub fn malformed_ref(value: impl Into<String>, reason: &'static str) -> Self {
        Self::MalformedRef {
            value: value.into(),
            reason,
        }
    }
}
