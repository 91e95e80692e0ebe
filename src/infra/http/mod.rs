mod cache_admin;
mod content;
mod middleware;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get},
};

use crate::infra::files::ContentRoot;
use crate::pipeline::CachingPipeline;

pub use content::PURGE_HEADER;

#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Arc<CachingPipeline>,
    pub content: Arc<ContentRoot>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_cache", delete(cache_admin::clear_cache))
        .route("/_cache/entries", get(cache_admin::list_entries))
        .route("/", get(content::serve))
        .route("/{*path}", get(content::serve))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
