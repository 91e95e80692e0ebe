//! Producer pipelines and the caching controller that wraps them.
//!
//! A [`Pipeline`] either emits final bytes or emits events that a
//! [`Serializer`] renders. [`CachingPipeline`] decides per request whether
//! to replay a stored response or run the pipeline and capture its output.

pub mod codec;
mod controller;
mod error;
mod event;
mod expiry;
mod producer;
mod sink;
pub mod transport;
mod xml;

pub use codec::{EventCompiler, decode, replay};
pub use controller::{CachingPipeline, Outcome, PipelineSettings};
pub use error::{CodecError, PipelineError};
pub use event::{Event, EventSink};
pub use expiry::ExpiryPolicy;
pub use producer::{EventProducer, Pipeline, Producer, Serializer};
pub use sink::{ByteSink, ByteTee, EventTee, SerializingSink};
pub use transport::{
    BufferedTransport, OVERRIDE_CACHE_EXPIRES, OVERRIDE_CACHE_KEY, OVERRIDE_PURGE_CACHE,
    RequestContext, Transport, http_date,
};
pub use xml::XmlSerializer;

pub(crate) use controller::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_PURGE, METRIC_CACHE_STORE_FAILURE,
    METRIC_GENERATE_MS,
};
