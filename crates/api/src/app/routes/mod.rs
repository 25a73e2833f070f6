use axum::Router;

pub mod guests;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new().nest("/guests", guests::router())
}
