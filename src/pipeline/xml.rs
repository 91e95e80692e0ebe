//! XML text serializer.

use std::io;

use super::event::Event;
use super::producer::Serializer;
use super::sink::ByteSink;

const DEFAULT_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

pub struct XmlSerializer {
    content_type: String,
    declaration: bool,
}

impl XmlSerializer {
    pub fn new() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            declaration: true,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Suppress the `<?xml ...?>` declaration at document start.
    pub fn without_declaration(mut self) -> Self {
        self.declaration = false;
        self
    }
}

impl Default for XmlSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer for XmlSerializer {
    fn content_type(&self) -> Option<String> {
        Some(self.content_type.clone())
    }

    fn serialize(&mut self, event: &Event, out: &mut dyn ByteSink) -> io::Result<()> {
        match event {
            Event::StartDocument => {
                if self.declaration {
                    out.write(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
                }
            }
            Event::EndDocument => {}
            Event::StartElement { name, attributes } => {
                let mut tag = format!("<{name}");
                for (attr_name, value) in attributes {
                    tag.push(' ');
                    tag.push_str(attr_name);
                    tag.push_str("=\"");
                    tag.push_str(&escape(value, true));
                    tag.push('"');
                }
                tag.push('>');
                out.write(tag.as_bytes())?;
            }
            Event::EndElement { name } => out.write(format!("</{name}>").as_bytes())?,
            Event::Characters(text) => out.write(escape(text, false).as_bytes())?,
            Event::Comment(text) => {
                out.write(format!("<!--{}-->", comment_text(text)).as_bytes())?
            }
            Event::ProcessingInstruction { target, data } => {
                let data = data.replace("?>", "? >");
                out.write(format!("<?{target} {data}?>").as_bytes())?
            }
        }
        Ok(())
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Comments may not contain `--` or end in `-`.
fn comment_text(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '-' && cleaned.ends_with('-') {
            cleaned.push(' ');
        }
        cleaned.push(ch);
    }
    if cleaned.ends_with('-') {
        cleaned.push(' ');
    }
    cleaned
}
