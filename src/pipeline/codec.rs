//! Compact binary form of an event stream.
//!
//! Layout: the 4-byte header `PCE1`, then per event one tag byte followed by
//! its strings, each as a big-endian `u32` length and UTF-8 bytes. Start
//! elements carry a `u32` attribute count before the name/value pairs.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::{CodecError, PipelineError};
use super::event::{Event, EventSink};

const MAGIC: &[u8; 4] = b"PCE1";

const TAG_START_DOCUMENT: u8 = 0x01;
const TAG_END_DOCUMENT: u8 = 0x02;
const TAG_START_ELEMENT: u8 = 0x03;
const TAG_END_ELEMENT: u8 = 0x04;
const TAG_CHARACTERS: u8 = 0x05;
const TAG_COMMENT: u8 = 0x06;
const TAG_PROCESSING_INSTRUCTION: u8 = 0x07;

/// Compiles events into the storable byte form.
pub struct EventCompiler {
    buffer: BytesMut,
}

impl EventCompiler {
    pub fn new() -> Self {
        let mut buffer = BytesMut::with_capacity(256);
        buffer.put_slice(MAGIC);
        Self { buffer }
    }

    pub fn finish(self) -> Bytes {
        self.buffer.freeze()
    }

    fn put_str(&mut self, value: &str) -> Result<(), PipelineError> {
        self.buffer.put_u32(length_prefix(value.len())?);
        self.buffer.put_slice(value.as_bytes());
        Ok(())
    }
}

fn length_prefix(len: usize) -> Result<u32, PipelineError> {
    u32::try_from(len)
        .map_err(|_| PipelineError::generation("string is too long to compile into an event stream"))
}

impl Default for EventCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventCompiler {
    fn event(&mut self, event: &Event) -> Result<(), PipelineError> {
        match event {
            Event::StartDocument => self.buffer.put_u8(TAG_START_DOCUMENT),
            Event::EndDocument => self.buffer.put_u8(TAG_END_DOCUMENT),
            Event::StartElement { name, attributes } => {
                self.buffer.put_u8(TAG_START_ELEMENT);
                self.put_str(name)?;
                let count = u32::try_from(attributes.len()).map_err(|_| {
                    PipelineError::generation("element has too many attributes to compile")
                })?;
                self.buffer.put_u32(count);
                for (attr_name, value) in attributes {
                    self.put_str(attr_name)?;
                    self.put_str(value)?;
                }
            }
            Event::EndElement { name } => {
                self.buffer.put_u8(TAG_END_ELEMENT);
                self.put_str(name)?;
            }
            Event::Characters(text) => {
                self.buffer.put_u8(TAG_CHARACTERS);
                self.put_str(text)?;
            }
            Event::Comment(text) => {
                self.buffer.put_u8(TAG_COMMENT);
                self.put_str(text)?;
            }
            Event::ProcessingInstruction { target, data } => {
                self.buffer.put_u8(TAG_PROCESSING_INSTRUCTION);
                self.put_str(target)?;
                self.put_str(data)?;
            }
        }
        Ok(())
    }
}

/// Decode a compiled stream in full.
///
/// Any damage yields an error; a partial event list is never returned.
pub fn decode(bytes: &[u8]) -> Result<Vec<Event>, CodecError> {
    let mut buf = bytes;
    if buf.remaining() < MAGIC.len() || &buf[..MAGIC.len()] != MAGIC {
        return Err(CodecError::BadHeader);
    }
    buf.advance(MAGIC.len());

    let mut events = Vec::new();
    while buf.has_remaining() {
        let tag = buf.get_u8();
        let event = match tag {
            TAG_START_DOCUMENT => Event::StartDocument,
            TAG_END_DOCUMENT => Event::EndDocument,
            TAG_START_ELEMENT => {
                let name = read_str(&mut buf)?;
                let count = read_u32(&mut buf)?;
                let mut attributes = Vec::new();
                for _ in 0..count {
                    let attr_name = read_str(&mut buf)?;
                    let value = read_str(&mut buf)?;
                    attributes.push((attr_name, value));
                }
                Event::StartElement { name, attributes }
            }
            TAG_END_ELEMENT => Event::EndElement {
                name: read_str(&mut buf)?,
            },
            TAG_CHARACTERS => Event::Characters(read_str(&mut buf)?),
            TAG_COMMENT => Event::Comment(read_str(&mut buf)?),
            TAG_PROCESSING_INSTRUCTION => {
                let target = read_str(&mut buf)?;
                let data = read_str(&mut buf)?;
                Event::ProcessingInstruction { target, data }
            }
            other => return Err(CodecError::UnknownTag(other)),
        };
        events.push(event);
    }

    Ok(events)
}

/// Decode `bytes`, then forward every event to `sink`.
pub fn replay(bytes: &[u8], sink: &mut dyn EventSink) -> Result<(), PipelineError> {
    for event in decode(bytes)? {
        sink.event(&event)?;
    }
    Ok(())
}

fn read_u32(buf: &mut &[u8]) -> Result<u32, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Truncated);
    }
    Ok(buf.get_u32())
}

fn read_str(buf: &mut &[u8]) -> Result<String, CodecError> {
    let len = read_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(CodecError::Truncated);
    }
    let raw = buf[..len].to_vec();
    buf.advance(len);
    String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)
}
