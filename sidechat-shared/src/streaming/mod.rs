//! # AI answer streaming
//!
//! The assistant endpoint answers with server-sent events: anonymous frames
//! carry `{"delta": ...}` fragments, and named `final`, `done` and `error`
//! frames resolve the answer. [`StreamAssembler`] turns arbitrarily chunked
//! bytes back into those frames and reports them to a [`StreamHandler`].

mod assembler;
mod decoder;
mod errors;
mod frame;

pub use assembler::{
    CallbackHandler, DEFAULT_ERROR_MESSAGE, StreamAssembler, StreamEvent, StreamHandler,
    StreamState, StreamSummary, consume_stream,
};
pub use decoder::Utf8ChunkDecoder;
pub use errors::{StreamError, StreamResult};
pub use frame::{BLOCK_SEPARATOR, FrameKind, ParsedBlock, StreamFrame, parse_block};
