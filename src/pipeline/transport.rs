//! Request/response side of a pipeline execution.

use std::collections::HashMap;
use std::io;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::CONTENT_LENGTH},
    response::Response,
};
use bytes::{BufMut, BytesMut};
use time::OffsetDateTime;

use super::sink::ByteSink;

/// Override: explicit cache key for this request.
pub const OVERRIDE_CACHE_KEY: &str = "cache-key";
/// Override: expiry in seconds for this request.
pub const OVERRIDE_CACHE_EXPIRES: &str = "cache-expires";
/// Override: remove any cached entry before lookup.
pub const OVERRIDE_PURGE_CACHE: &str = "purge-cache";

/// What the controller needs to know about the incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub path: String,
    pub query: Option<String>,
    pub if_modified_since: Option<OffsetDateTime>,
    pub overrides: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    pub fn with_if_modified_since(mut self, since: OffsetDateTime) -> Self {
        self.if_modified_since = Some(since);
        self
    }

    pub fn override_value(&self, name: &str) -> Option<&str> {
        self.overrides.get(name).map(String::as_str)
    }

    pub fn purge_requested(&self) -> bool {
        self.override_value(OVERRIDE_PURGE_CACHE)
            .is_some_and(|value| matches!(value.trim(), "true" | "1" | "yes" | "on"))
    }
}

/// Output side of a request.
pub trait Transport: ByteSink {
    fn set_status(&mut self, status: StatusCode);

    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Whether body bytes have already reached the client.
    fn committed(&self) -> bool;
}

/// Transport that collects the whole response before handing it to axum.
#[derive(Debug)]
pub struct BufferedTransport {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedTransport {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Convert into a response, filling `Content-Length` when unset.
    pub fn into_response(self) -> Response {
        let Self {
            status,
            mut headers,
            body,
        } = self;

        if !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        let mut response = Response::new(Body::from(body.freeze()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl Default for BufferedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSink for BufferedTransport {
    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.body.put_slice(chunk);
        Ok(())
    }
}

impl Transport for BufferedTransport {
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    fn committed(&self) -> bool {
        // Nothing leaves the process until `into_response`.
        false
    }
}

/// IMF-fixdate handling for `Last-Modified`, `Expires` and `If-Modified-Since`.
pub mod http_date {
    use time::{
        OffsetDateTime, PrimitiveDateTime, UtcOffset, format_description::BorrowedFormatItem,
        macros::format_description,
    };

    const IMF_FIXDATE: &[BorrowedFormatItem<'static>] = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );

    pub fn format(instant: OffsetDateTime) -> Option<String> {
        instant.to_offset(UtcOffset::UTC).format(IMF_FIXDATE).ok()
    }

    pub fn parse(value: &str) -> Option<OffsetDateTime> {
        PrimitiveDateTime::parse(value.trim(), IMF_FIXDATE)
            .ok()
            .map(PrimitiveDateTime::assume_utc)
    }
}
