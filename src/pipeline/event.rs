//! Structured document events.

use super::error::PipelineError;

/// One structural event of a document, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartDocument,
    EndDocument,
    StartElement {
        name: String,
        attributes: Vec<(String, String)>,
    },
    EndElement {
        name: String,
    },
    Characters(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

impl Event {
    pub fn start(name: impl Into<String>) -> Self {
        Event::StartElement {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn start_with(name: impl Into<String>, attributes: Vec<(String, String)>) -> Self {
        Event::StartElement {
            name: name.into(),
            attributes,
        }
    }

    pub fn end(name: impl Into<String>) -> Self {
        Event::EndElement { name: name.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Event::Characters(text.into())
    }
}

/// Consumer of structured events.
pub trait EventSink: Send {
    fn event(&mut self, event: &Event) -> Result<(), PipelineError>;
}

impl EventSink for Vec<Event> {
    fn event(&mut self, event: &Event) -> Result<(), PipelineError> {
        self.push(event.clone());
        Ok(())
    }
}
