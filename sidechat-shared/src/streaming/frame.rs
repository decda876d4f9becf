use serde_json::Value;

/// Separator between two server-sent event blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// How the assembler treats a frame, derived from its `event:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// No event name: an incremental text fragment.
    Delta,
    /// `event: final`, carrying the consolidated answer.
    Final,
    /// `event: error`, carrying a server-side failure message.
    Error,
    /// `event: done`, the end-of-answer marker.
    Done,
    /// Any other event name; ignored by the assembler.
    Other(String),
}

impl FrameKind {
    fn from_event(event: Option<&str>) -> Self {
        match event {
            None => Self::Delta,
            Some("final") => Self::Final,
            Some("error") => Self::Error,
            Some("done") => Self::Done,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    pub event: Option<String>,
    pub payload: Value,
}

impl StreamFrame {
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        FrameKind::from_event(self.event.as_deref())
    }

    /// String field of the payload, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }
}

/// Outcome of parsing one `\n\n`-terminated block.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBlock {
    Frame(StreamFrame),
    /// The block carried neither a data line nor an event name.
    Empty,
    /// The data did not decode as JSON.
    Malformed,
}

/// Parses the lines of a single block.
///
/// `event:` names the frame and `data:` lines carry the JSON payload; one
/// space after the colon is optional. Several data lines are joined with a
/// newline. `id:`, `retry:` and comment lines are ignored.
#[must_use]
pub fn parse_block(block: &str) -> ParsedBlock {
    let mut event: Option<String> = None;
    let mut data: Option<String> = None;

    for raw_line in block.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if let Some(value) = line.strip_prefix("event:") {
            let name = strip_field_space(value).trim_end();
            event = (!name.is_empty()).then(|| name.to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            let value = strip_field_space(value);
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    match (data, event) {
        (Some(data), event) => match serde_json::from_str::<Value>(&data) {
            Ok(payload) => ParsedBlock::Frame(StreamFrame { event, payload }),
            Err(_) => ParsedBlock::Malformed,
        },
        // A named event without data still marks a transition (`event: done`).
        (None, Some(event)) => ParsedBlock::Frame(StreamFrame {
            event: Some(event),
            payload: Value::Null,
        }),
        (None, None) => ParsedBlock::Empty,
    }
}

fn strip_field_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}
