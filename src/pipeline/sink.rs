//! Byte sinks and the fan-out writers used to capture pipeline output.

use std::io;

use bytes::{BufMut, BytesMut};

use super::error::PipelineError;
use super::event::{Event, EventSink};
use super::producer::Serializer;

/// Consumer of serialized output.
pub trait ByteSink: Send {
    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;
}

impl ByteSink for BytesMut {
    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.put_slice(chunk);
        Ok(())
    }
}

impl ByteSink for Vec<u8> {
    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.extend_from_slice(chunk);
        Ok(())
    }
}

/// Forwards every write to the primary sink, then to the capture.
///
/// The primary is the real consumer. If it fails the capture does not see
/// the chunk.
pub struct ByteTee<'a> {
    primary: &'a mut dyn ByteSink,
    capture: &'a mut dyn ByteSink,
}

impl<'a> ByteTee<'a> {
    pub fn new(primary: &'a mut dyn ByteSink, capture: &'a mut dyn ByteSink) -> Self {
        Self { primary, capture }
    }
}

impl ByteSink for ByteTee<'_> {
    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.primary.write(chunk)?;
        self.capture.write(chunk)
    }
}

/// Event counterpart of [`ByteTee`].
pub struct EventTee<'a> {
    primary: &'a mut dyn EventSink,
    capture: &'a mut dyn EventSink,
}

impl<'a> EventTee<'a> {
    pub fn new(primary: &'a mut dyn EventSink, capture: &'a mut dyn EventSink) -> Self {
        Self { primary, capture }
    }
}

impl EventSink for EventTee<'_> {
    fn event(&mut self, event: &Event) -> Result<(), PipelineError> {
        self.primary.event(event)?;
        self.capture.event(event)
    }
}

/// Runs events through a serializer into a byte sink.
pub struct SerializingSink<'a> {
    serializer: &'a mut dyn Serializer,
    out: &'a mut dyn ByteSink,
}

impl<'a> SerializingSink<'a> {
    pub fn new(serializer: &'a mut dyn Serializer, out: &'a mut dyn ByteSink) -> Self {
        Self { serializer, out }
    }
}

impl EventSink for SerializingSink<'_> {
    fn event(&mut self, event: &Event) -> Result<(), PipelineError> {
        self.serializer.serialize(event, self.out)?;
        Ok(())
    }
}
