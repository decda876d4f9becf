use futures_util::{Stream, StreamExt, pin_mut};
use metrics::counter;
use tracing::{debug, trace};

use super::{
    decoder::Utf8ChunkDecoder,
    errors::{StreamError, StreamResult},
    frame::{BLOCK_SEPARATOR, FrameKind, ParsedBlock, StreamFrame, parse_block},
};

/// Message surfaced when an `error` event carries no `error` field.
pub const DEFAULT_ERROR_MESSAGE: &str = "AI stream error";

/// Receives the application-level events of one streamed answer.
///
/// Only [`on_delta`](Self::on_delta) is required; the final and error
/// notifications default to no-ops.
pub trait StreamHandler {
    /// A text fragment, in wire order.
    fn on_delta(&mut self, fragment: &str);

    /// The consolidated answer from a `final` event.
    fn on_final(&mut self, _full_text: &str) {}

    /// A failure reported by the server or by the transport.
    fn on_error(&mut self, _message: &str) {}
}

/// Closure-backed [`StreamHandler`].
///
/// ```
/// use shared::streaming::{CallbackHandler, StreamAssembler};
///
/// let mut text = String::new();
/// let mut handler = CallbackHandler::new(|delta: &str| text.push_str(delta));
/// let mut assembler = StreamAssembler::new();
/// assembler.feed(b"data: {\"delta\":\"hi\"}\n\n", &mut handler);
/// drop(handler);
/// assert_eq!(text, "hi");
/// ```
pub struct CallbackHandler<'a> {
    on_delta: Box<dyn FnMut(&str) + 'a>,
    on_final: Option<Box<dyn FnMut(&str) + 'a>>,
    on_error: Option<Box<dyn FnMut(&str) + 'a>>,
}

impl<'a> CallbackHandler<'a> {
    /// Handler forwarding fragments to `on_delta`; final and error events
    /// are ignored until set.
    pub fn new(on_delta: impl FnMut(&str) + 'a) -> Self {
        Self {
            on_delta: Box::new(on_delta),
            on_final: None,
            on_error: None,
        }
    }

    /// Also forwards the consolidated answer.
    #[must_use]
    pub fn with_final(mut self, on_final: impl FnMut(&str) + 'a) -> Self {
        self.on_final = Some(Box::new(on_final));
        self
    }

    /// Also forwards error messages.
    #[must_use]
    pub fn with_error(mut self, on_error: impl FnMut(&str) + 'a) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }
}

impl std::fmt::Debug for CallbackHandler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandler")
            .field("on_final", &self.on_final.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

impl StreamHandler for CallbackHandler<'_> {
    fn on_delta(&mut self, fragment: &str) {
        (self.on_delta)(fragment);
    }

    fn on_final(&mut self, full_text: &str) {
        if let Some(callback) = self.on_final.as_mut() {
            callback(full_text);
        }
    }

    fn on_error(&mut self, message: &str) {
        if let Some(callback) = self.on_error.as_mut() {
            callback(message);
        }
    }
}

/// A callback invocation, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Final(String),
    Error(String),
}

/// Records every callback; used by tests and by callers that prefer to
/// inspect the sequence afterwards.
impl StreamHandler for Vec<StreamEvent> {
    fn on_delta(&mut self, fragment: &str) {
        self.push(StreamEvent::Delta(fragment.to_string()));
    }

    fn on_final(&mut self, full_text: &str) {
        self.push(StreamEvent::Final(full_text.to_string()));
    }

    fn on_error(&mut self, message: &str) {
        self.push(StreamEvent::Error(message.to_string()));
    }
}

impl<H: StreamHandler + ?Sized> StreamHandler for &mut H {
    fn on_delta(&mut self, fragment: &str) {
        (**self).on_delta(fragment);
    }

    fn on_final(&mut self, full_text: &str) {
        (**self).on_final(full_text);
    }

    fn on_error(&mut self, message: &str) {
        (**self).on_error(message);
    }
}

/// Where a session stands after the frames read so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Open,
    /// A `final` or `done` event was read.
    Completed,
    /// An `error` event was read. Sticky: later frames do not clear it.
    Errored,
}

/// What a finished session produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /// Concatenation of every delta, in wire order.
    pub full_text: String,
    /// Terminal state, or [`StreamState::Open`] if no terminal event came.
    pub state: StreamState,
    /// Frames dispatched to the handler.
    pub frames: usize,
    /// Frames dropped for undecodable data.
    pub skipped_frames: usize,
}

/// Reassembles server-sent events from arbitrary byte chunks.
///
/// The assembler owns the per-session state: the UTF-8 carry-over, the
/// unterminated text tail and the running answer. It never infers the end of
/// an answer; it only reflects the `final`, `done` and `error` events it
/// reads.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    decoder: Utf8ChunkDecoder,
    buffer: String,
    full_text: String,
    state: StreamState,
    frames: usize,
    skipped_frames: usize,
}

impl StreamAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one chunk and dispatches every block it completes.
    ///
    /// Returns the number of frames dispatched.
    pub fn feed<H: StreamHandler + ?Sized>(&mut self, chunk: &[u8], handler: &mut H) -> usize {
        let text = self.decoder.decode(chunk);
        self.buffer.push_str(&text);
        self.drain_blocks(handler)
    }

    /// Ends the session: flushes the decoder and dispatches any block that
    /// the flush completes. An unterminated trailing block is discarded.
    pub fn finish<H: StreamHandler + ?Sized>(&mut self, handler: &mut H) -> usize {
        let tail = self.decoder.finish();
        self.buffer.push_str(&tail);
        let dispatched = self.drain_blocks(handler);
        if !self.buffer.trim().is_empty() {
            debug!(
                bytes = self.buffer.len(),
                "discarding unterminated block at end of stream"
            );
        }
        self.buffer.clear();
        dispatched
    }

    /// Text accumulated from delta frames so far.
    #[must_use]
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Frames dropped because their data was not JSON.
    #[must_use]
    pub const fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    /// Raw text waiting for its block separator.
    #[must_use]
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    #[must_use]
    pub fn into_summary(self) -> StreamSummary {
        StreamSummary {
            full_text: self.full_text,
            state: self.state,
            frames: self.frames,
            skipped_frames: self.skipped_frames,
        }
    }

    fn drain_blocks<H: StreamHandler + ?Sized>(&mut self, handler: &mut H) -> usize {
        let mut dispatched = 0;
        while let Some(end) = self.buffer.find(BLOCK_SEPARATOR) {
            let block: String = self.buffer.drain(..end + BLOCK_SEPARATOR.len()).collect();
            match parse_block(&block[..end]) {
                ParsedBlock::Frame(frame) => {
                    self.frames += 1;
                    dispatched += 1;
                    self.dispatch(&frame, handler);
                }
                ParsedBlock::Empty => {}
                ParsedBlock::Malformed => {
                    self.skipped_frames += 1;
                    counter!("sidechat_stream_frames_skipped_total").increment(1);
                    debug!(block = %block.trim_end(), "skipping malformed stream frame");
                }
            }
        }
        dispatched
    }

    fn dispatch<H: StreamHandler + ?Sized>(&mut self, frame: &StreamFrame, handler: &mut H) {
        match frame.kind() {
            FrameKind::Delta => {
                if let Some(delta) = frame.field("delta") {
                    self.full_text.push_str(delta);
                    handler.on_delta(delta);
                }
            }
            FrameKind::Final => {
                self.complete();
                match frame.field("content") {
                    Some(content) => handler.on_final(content),
                    None => handler.on_final(&self.full_text),
                }
            }
            FrameKind::Error => {
                self.state = StreamState::Errored;
                counter!("sidechat_stream_errors_total").increment(1);
                handler.on_error(frame.field("error").unwrap_or(DEFAULT_ERROR_MESSAGE));
            }
            FrameKind::Done => self.complete(),
            FrameKind::Other(name) => trace!(event = %name, "ignoring unknown stream event"),
        }
    }

    fn complete(&mut self) {
        if self.state == StreamState::Open {
            self.state = StreamState::Completed;
        }
    }
}

/// Drives an assembler over a byte stream until the stream ends.
///
/// A read failure ends the loop with [`StreamError::Transport`]; nothing is
/// retried and no final event is synthesised.
///
/// # Errors
/// Returns [`StreamError::Transport`] when the underlying stream yields an
/// error.
pub async fn consume_stream<S, B, E, H>(stream: S, handler: &mut H) -> StreamResult<StreamSummary>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
    H: StreamHandler + ?Sized,
{
    let mut assembler = StreamAssembler::new();
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(StreamError::transport)?;
        assembler.feed(chunk.as_ref(), handler);
    }
    assembler.finish(handler);
    Ok(assembler.into_summary())
}
