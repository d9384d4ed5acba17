//! Server-sent event framing.

use std::fmt;

/// One event as written to a live subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    event_type: String,
    payload: String,
}

impl EventFrame {
    pub fn new(event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// `event: <type>`, one `data:` line per payload line, blank line terminator
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Payload split at `\r\n`, `\r` or `\n`, the line endings a reader recognizes
    pub fn payload_lines(&self) -> impl Iterator<Item = &str> {
        let mut rest = Some(self.payload.as_str());
        std::iter::from_fn(move || {
            let current = rest?;
            match current.find(|c: char| c == '\r' || c == '\n') {
                Some(end) => {
                    let skip = if current[end..].starts_with("\r\n") { 2 } else { 1 };
                    rest = Some(&current[end + skip..]);
                    Some(&current[..end])
                }
                None => {
                    rest = None;
                    Some(current)
                }
            }
        })
    }
}

impl fmt::Display for EventFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "event: {}", self.event_type)?;
        if self.payload.is_empty() {
            writeln!(f, "data: ")?;
        } else {
            for line in self.payload_lines() {
                writeln!(f, "data: {line}")?;
            }
        }
        writeln!(f)
    }
}
