//! The producer chain the caching controller drives.
//!
//! A pipeline ends either in a producer that emits final bytes, or in an
//! event producer whose output is rendered by a per-request serializer.

use std::io;

use async_trait::async_trait;

use crate::cache::Validity;

use super::error::PipelineError;
use super::event::{Event, EventSink};
use super::sink::ByteSink;

/// Producer of final serialized bytes.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&mut self, out: &mut dyn ByteSink) -> Result<(), PipelineError>;

    /// Content type of the produced bytes, if known.
    fn content_type(&self) -> Option<String> {
        None
    }

    /// Current state of the resources this producer reads.
    ///
    /// Only called when a cached response carries source tokens that cannot
    /// be checked without a fresh sample.
    async fn validities(&self) -> Result<Vec<Validity>, PipelineError> {
        Ok(Vec::new())
    }
}

/// Producer of structured events.
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn produce(&mut self, out: &mut dyn EventSink) -> Result<(), PipelineError>;

    async fn validities(&self) -> Result<Vec<Validity>, PipelineError> {
        Ok(Vec::new())
    }
}

/// Terminal stage that renders events as bytes.
pub trait Serializer: Send + Sync {
    fn content_type(&self) -> Option<String>;

    fn serialize(&mut self, event: &Event, out: &mut dyn ByteSink) -> io::Result<()>;
}

/// A complete pipeline, as seen by the caching controller.
pub enum Pipeline {
    /// The producer emits final bytes; the cache stores those bytes.
    Serialized(Box<dyn Producer>),
    /// The producer emits events; the cache stores the compiled events and
    /// the serializer renders them on every request.
    Events {
        producer: Box<dyn EventProducer>,
        serializer: Box<dyn Serializer>,
    },
}

impl Pipeline {
    pub fn serialized(producer: impl Producer + 'static) -> Self {
        Pipeline::Serialized(Box::new(producer))
    }

    pub fn events(
        producer: impl EventProducer + 'static,
        serializer: impl Serializer + 'static,
    ) -> Self {
        Pipeline::Events {
            producer: Box::new(producer),
            serializer: Box::new(serializer),
        }
    }

    /// Whether the cache sits after the serializer.
    pub fn is_complete(&self) -> bool {
        matches!(self, Pipeline::Serialized(_))
    }

    pub fn default_content_type(&self) -> Option<String> {
        match self {
            Pipeline::Serialized(producer) => producer.content_type(),
            Pipeline::Events { serializer, .. } => serializer.content_type(),
        }
    }

    pub async fn validities(&self) -> Result<Vec<Validity>, PipelineError> {
        match self {
            Pipeline::Serialized(producer) => producer.validities().await,
            Pipeline::Events { producer, .. } => producer.validities().await,
        }
    }

    pub(crate) fn granularity(&self) -> &'static str {
        if self.is_complete() { "bytes" } else { "events" }
    }
}
