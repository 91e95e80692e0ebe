use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::info;

use crate::application::error::HttpError;

use super::HttpState;

const SOURCE: &str = "infra::http::cache_admin";

#[derive(Debug, Serialize)]
pub(super) struct EntryView {
    key: String,
    granularity: &'static str,
}

#[derive(Debug, Serialize)]
pub(super) struct EntriesView {
    count: usize,
    entries: Vec<EntryView>,
}

pub(super) async fn clear_cache(State(state): State<HttpState>) -> Result<StatusCode, HttpError> {
    state.pipeline.cache().clear().map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to clear cache",
            &err,
        )
    })?;
    info!(target = SOURCE, "cache cleared");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn list_entries(State(state): State<HttpState>) -> Json<EntriesView> {
    let mut keys = state.pipeline.cache().keys();
    keys.sort();

    let entries: Vec<EntryView> = keys
        .into_iter()
        .map(|key| EntryView {
            granularity: if key.is_complete() { "bytes" } else { "events" },
            key: key.key().to_string(),
        })
        .collect();

    Json(EntriesView {
        count: entries.len(),
        entries,
    })
}
