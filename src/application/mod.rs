//! Application layer: store contracts and error reporting.

pub mod error;
pub mod repos;
