use std::io;

use thiserror::Error;

/// Failure to decode a compiled event stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("event stream header is missing or has an unsupported version")]
    BadHeader,
    #[error("event stream ends in the middle of an event")]
    Truncated,
    #[error("unknown event tag {0:#04x}")]
    UnknownTag(u8),
    #[error("event stream contains invalid utf-8")]
    InvalidUtf8,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("transport failed: {0}")]
    Transport(#[from] io::Error),
    #[error("cached event stream is unreadable: {0}")]
    Codec(#[from] CodecError),
}

impl PipelineError {
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }
}
