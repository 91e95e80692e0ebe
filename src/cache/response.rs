//! Stored pipeline output.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::clock::truncate_to_second;
use super::composite::CompositeValidity;

/// One captured pipeline result.
///
/// Only the expiry can change after construction. A regeneration produces a
/// new record that replaces this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    #[serde(with = "payload_base64")]
    payload: Bytes,
    validity: CompositeValidity,
    content_type: Option<String>,
    expires: Option<OffsetDateTime>,
    last_modified: OffsetDateTime,
}

impl CachedResponse {
    /// `created` is truncated to whole seconds and becomes `Last-Modified`.
    pub fn new(
        payload: Bytes,
        validity: CompositeValidity,
        content_type: Option<String>,
        created: OffsetDateTime,
    ) -> Self {
        Self {
            payload,
            validity,
            content_type,
            expires: None,
            last_modified: truncate_to_second(created),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn validity(&self) -> &CompositeValidity {
        &self.validity
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn expires(&self) -> Option<OffsetDateTime> {
        self.expires
    }

    pub fn set_expires(&mut self, expires: Option<OffsetDateTime>) {
        self.expires = expires;
    }

    pub fn last_modified(&self) -> OffsetDateTime {
        self.last_modified
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

mod payload_base64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}
