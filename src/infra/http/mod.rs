//! Admin HTTP surface: health probe and invalidation entry points.

mod admin;
mod middleware;

pub use admin::{AdminState, build_admin_router};
pub use middleware::RequestContext;
