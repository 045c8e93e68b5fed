//! Incremental Server-Sent Events parser for streamed model responses.
//!
//! ```text
//! data: {"candidates": [...]}
//!
//! : keep-alive
//! data: {"candidates": [...]}
//!
//! ```
//!
//! Bytes are buffered until a full line is available, so multi-byte
//! characters split across network reads decode correctly.

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event_type: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// Whether this event is the `[DONE]` sentinel some gateways append.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

#[derive(Debug, Default)]
struct EventBuilder {
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl EventBuilder {
    fn has_data(&self) -> bool {
        !self.data_lines.is_empty()
    }

    fn build(&mut self) -> SseEvent {
        SseEvent {
            event_type: self.event_type.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
        }
    }

    /// Feed one line. An empty line closes the current event.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.has_data().then(|| self.build());
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some((field, value)) = parse_field(line) {
            match field {
                "data" => self.data_lines.push(value.to_owned()),
                "event" => self.event_type = Some(value.to_owned()),
                _ => {}
            }
        }
        None
    }
}

fn parse_field(line: &str) -> Option<(&str, &str)> {
    let (field, value) = line.split_once(':')?;
    Some((field, value.strip_prefix(' ').unwrap_or(value)))
}

/// Feed raw bytes with [`push`](Self::push); complete events come out.
#[derive(Debug, Default)]
pub struct SseLineParser {
    pending: Vec<u8>,
    builder: EventBuilder,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.builder.process_line(line) {
                events.push(event);
            }
        }

        events
    }

    /// Emit whatever is left once the byte stream has ended.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.builder.process_line(line) {
                return Some(event);
            }
        }
        self.builder.has_data().then(|| self.builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_split_on_blank_lines() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"data: one\n\ndata: two\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "one");
        assert_eq!(events[1].data, "two");
    }

    #[test]
    fn comments_and_unknown_fields_are_ignored() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b": ping\nretry: 10\nevent: update\ndata: x\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event_type: Some("update".into()),
                data: "x".into()
            }]
        );
    }

    #[test]
    fn multiline_data_is_joined() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"data: a\ndata: b\r\n\r\n");
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn chunks_split_mid_line_and_mid_char() {
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap_or(0) + 1;
        let mut parser = SseLineParser::new();
        assert!(parser.push(&bytes[..split]).is_empty());
        let events = parser.push(&bytes[split..]);
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn flush_emits_trailing_event() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: tail").is_empty());
        let event = parser.flush();
        assert_eq!(event.map(|e| e.data), Some("tail".to_owned()));
        assert_eq!(parser.flush(), None);
    }

    #[test]
    fn done_sentinel_detected() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"data: [DONE]\n\n");
        assert!(events[0].is_done());
    }
}
