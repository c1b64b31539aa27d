//! The state/event/action shapes the handler's sum type is built from.

use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;
use xrd_wire::{RequestHeader, ResponseHeader};

use crate::error::Outcome;

/// Where a request currently stands in its response lifecycle, per the
/// state machine named in the specification: `Issued -> AwaitHdr ->
/// {Done, AwaitMore, StreamRaw, Snoozing, RunAuth, Redirecting} -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The request has been constructed but not yet handed to the
    /// transport for sending.
    Issued,
    /// The request has been sent; waiting for its first response frame.
    AwaitHdr,
    /// An `oksofar`/`PartialResult` chunk has arrived; waiting for the
    /// rest of the answer.
    AwaitMore,
    /// The handler has switched to reading a raw body directly off the
    /// socket (`read`/`readv`/`pgread`).
    StreamRaw,
    /// A `wait`/`waitresp` has been received; waiting out the server's
    /// requested delay before resuming.
    Snoozing,
    /// An `authmore` round trip is in progress.
    RunAuth,
    /// A `redirect` has been received and a new endpoint is being
    /// resolved.
    Redirecting,
    /// The request completed, successfully or not; no further events are
    /// expected.
    Done,
    /// The request failed terminally; no further events are expected.
    Failed,
}

impl State {
    /// Whether this state accepts no further events.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Something that happened to a request this handler is driving.
#[derive(Debug)]
pub enum Event {
    /// The request has been fully written to the socket.
    Sent,
    /// A fully-framed response addressed to this handler's stream id
    /// arrived.
    Response {
        /// The decoded response header.
        header: ResponseHeader,
        /// The body that followed it.
        body: BytesMut,
    },
    /// One chunk of a raw body being streamed directly off the socket,
    /// delivered only while [`State::StreamRaw`] is active.
    RawChunk(BytesMut),
    /// The raw body stream has been fully consumed; resume normal framed
    /// dispatch.
    RawDone,
    /// An in-progress `authmore` round trip produced its next leg to
    /// send.
    AuthContinuation {
        /// Header for the next `auth` request.
        header: RequestHeader,
        /// Body for the next `auth` request.
        body: BytesMut,
    },
    /// The underlying stream failed in a way this handler must react to
    /// directly.
    FatalError(String),
    /// A scheduled wake-up or a periodic deadline check fired.
    Tick(Instant),
    /// The caller cancelled this request.
    Cancel,
}

/// What the caller driving this handler must do in response to the event
/// just fed to it.
#[derive(Debug)]
pub enum Action {
    /// Nothing externally visible; keep waiting for the next event.
    Continue,
    /// Switch to reading the response body directly off the socket.
    EnterRawMode,
    /// Call back into [`crate::handler::MsgHandler::tick`] no later than
    /// `delay` from now.
    ScheduleWake(Duration),
    /// Reissue the request (after a `wait`, or at a new endpoint after a
    /// `redirect`), with a freshly assigned stream id.
    Resend {
        /// Header to send, already updated for the new endpoint/session
        /// if this is a redirect.
        header: RequestHeader,
        /// Body to send.
        body: BytesMut,
    },
    /// The request reached a terminal state; deliver this to the caller.
    Complete(Outcome),
}
