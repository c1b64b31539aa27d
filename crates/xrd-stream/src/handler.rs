//! The contract a `Stream` drives a per-request handler through.
//!
//! `xrd-msghandler`'s state machine implements this trait (via a thin
//! adapter owned by whichever crate wires the two together, keeping
//! `xrd-msghandler` itself free of a dependency on the transport stack)
//! so `Stream` can stay generic over "whatever wants this SID's
//! response" without knowing anything about redirects, waits, or
//! checksums.

use xrd_wire::{Message, StatusCode};

use crate::StreamError;

/// What a handler wants to happen with the next chunk of a raw-body
/// response it's streaming directly off the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawChunkOutcome {
    /// Keep streaming; more chunks are expected.
    NeedMore,
    /// The raw body is fully consumed; resume normal framed dispatch.
    Done,
}

/// Per-request callbacks a `Stream` invokes while driving one message
/// through its lifetime.
pub trait RequestHandler: Send + Sync {
    /// Called immediately before the message is written to the socket,
    /// letting the handler stamp last-minute fields (e.g. a freshly
    /// negotiated session id).
    fn on_ready_to_send(&self, _msg: &mut Message) {}

    /// Called once this handler's message has been fully written to the
    /// socket.
    fn on_sent(&self) {}

    /// Called with a fully-framed response addressed to this handler's
    /// SID, alongside the status code its header carried.
    fn process(&self, status: StatusCode, msg: Message);

    /// Called when the stream this request was in flight on fails in a
    /// way the handler must react to directly, rather than through a
    /// reissued send (socket error after partial acknowledgment, stream
    /// torn down with this SID still outstanding).
    fn on_fatal_error(&self, err: StreamError);

    /// Whether this handler wants to read a response body directly off
    /// the socket rather than through the normal framed dispatch path.
    /// Used for `read`/`readv`/`pgread` handlers that stream large
    /// payloads straight into a caller-owned buffer.
    fn wants_raw_mode(&self) -> bool {
        false
    }

    /// Delivers one chunk of raw body bytes when [`Self::wants_raw_mode`]
    /// returns `true`.
    fn on_raw_chunk(&self, _chunk: &[u8]) -> RawChunkOutcome {
        RawChunkOutcome::Done
    }
}
