use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Uri, header::IF_MODIFIED_SINCE},
    response::Response,
};
use tracing::{debug, instrument};

use crate::application::error::HttpError;
use crate::pipeline::{
    BufferedTransport, OVERRIDE_PURGE_CACHE, Outcome, RequestContext, http_date,
};

use super::HttpState;

/// Request header that asks for the cached entry to be dropped first.
pub const PURGE_HEADER: &str = "x-cache-purge";

const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache");

#[instrument(skip_all, fields(path = %uri.path()))]
pub(super) async fn serve(
    State(state): State<HttpState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let request = request_context(&uri, &headers);
    let pipeline = state.content.pipeline_for(&request.path).await?;

    let mut transport = BufferedTransport::new();
    let outcome = state
        .pipeline
        .process(&request, pipeline, &mut transport)
        .await?;
    debug!(path = %request.path, outcome = ?outcome, "request processed");

    let mut response = transport.into_response();
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, cache_status(outcome));
    Ok(response)
}

fn request_context(uri: &Uri, headers: &HeaderMap) -> RequestContext {
    let mut request = RequestContext::new(uri.path());
    if let Some(query) = uri.query().filter(|query| !query.is_empty()) {
        request = request.with_query(query);
    }
    if let Some(since) = headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(http_date::parse)
    {
        request = request.with_if_modified_since(since);
    }
    if let Some(flag) = headers
        .get(PURGE_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        request = request.with_override(OVERRIDE_PURGE_CACHE, flag.to_ascii_lowercase());
    }
    request
}

fn cache_status(outcome: Outcome) -> HeaderValue {
    HeaderValue::from_static(match outcome {
        Outcome::Replayed | Outcome::NotModified => "HIT",
        Outcome::Generated { .. } | Outcome::Abandoned => "MISS",
    })
}
