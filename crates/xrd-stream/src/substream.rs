//! Sub-stream bookkeeping: connection status and the outbound queue a
//! `Stream` drains once its socket is writable.

use std::collections::VecDeque;
use std::sync::Arc;

use xrd_wire::Message;

use crate::handler::RequestHandler;

/// Connection lifecycle of one sub-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubStreamStatus {
    /// No socket; nothing queued is being sent.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Ready to send and receive.
    Connected,
}

/// One message waiting to be written, paired with the handler that will
/// receive its eventual response.
pub struct Envelope {
    /// The request to send.
    pub msg: Message,
    /// Receives `on_ready_to_send`/`on_sent`/the eventual response.
    pub handler: Arc<dyn RequestHandler>,
}

/// Per-sub-stream state a `Stream` keeps under its lock: status and the
/// FIFO of not-yet-sent requests. The socket itself lives outside the
/// lock (see `stream.rs`) so I/O never happens while this is held.
pub struct SubStream {
    /// Connection lifecycle.
    pub status: SubStreamStatus,
    /// Requests queued to be written once connected.
    pub out_queue: VecDeque<Envelope>,
}

impl SubStream {
    /// A fresh, disconnected sub-stream with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: SubStreamStatus::Disconnected,
            out_queue: VecDeque::new(),
        }
    }
}

impl Default for SubStream {
    fn default() -> Self {
        Self::new()
    }
}
