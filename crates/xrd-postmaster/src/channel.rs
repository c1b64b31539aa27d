//! One [`Channel`] per endpoint: a ref-counted wrapper around the
//! [`Stream`] that actually owns sockets, plus the list of handlers the
//! Post Master notifies on connect/disconnect.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use xrd_stream::{RequestHandler, Stream, StreamConfig, StreamError};
use xrd_transport::TransportHandler;
use xrd_wire::{RequestHeader, StreamId};

/// Notified when a channel's control sub-stream connects or fails to,
/// matching `NotifyConnectHandler`/`NotifyConnErrHandler` in the
/// specification's Post Master contract.
pub trait ChannelEventHandler: Send + Sync {
    /// The channel's sub-stream 0 just finished a successful connect.
    fn on_connect(&self, _host_id: &str) {}

    /// A connect attempt ultimately failed (every address and retry
    /// exhausted).
    fn on_conn_err(&self, _host_id: &str, _err: &StreamError) {}
}

/// One endpoint's `Stream` plus the ref count that decides when the
/// endpoint is torn down. A sub-stream held open by a caller, or an
/// outstanding handler registered against this channel, each hold one
/// reference; the last release drops the `Stream` and fires
/// [`ChannelEventHandler::on_conn_err`]-free silent disconnect to any
/// remaining listener.
pub struct Channel<T: TransportHandler + 'static> {
    host_id: String,
    stream: Arc<Stream<T>>,
    ref_count: AtomicUsize,
    handlers: Mutex<Vec<Arc<dyn ChannelEventHandler>>>,
}

impl<T: TransportHandler + 'static> Channel<T> {
    /// Creates a channel targeting `host:port`, not yet connected. Starts
    /// with a ref count of one, representing the caller that requested
    /// its creation.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, config: StreamConfig, transport: Arc<T>) -> Self {
        let stream = Arc::new(Stream::new(host, port, config, transport));
        Self {
            host_id: stream.host_id(),
            stream,
            ref_count: AtomicUsize::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// `host:port`, the key this channel is stored under in the Post
    /// Master's map.
    #[must_use]
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// The channel's underlying stream.
    #[must_use]
    pub fn stream(&self) -> &Arc<Stream<T>> {
        &self.stream
    }

    /// Registers a handler to be notified of this channel's future
    /// connect/disconnect events.
    pub fn add_event_handler(&self, handler: Arc<dyn ChannelEventHandler>) {
        self.handlers.lock().push(handler);
    }

    /// Runs `on_connect` on every registered handler.
    pub fn notify_connect(&self) {
        for handler in self.handlers.lock().iter() {
            handler.on_connect(&self.host_id);
        }
    }

    /// Runs `on_conn_err` on every registered handler.
    pub fn notify_conn_err(&self, err: &StreamError) {
        for handler in self.handlers.lock().iter() {
            handler.on_conn_err(&self.host_id, err);
        }
    }

    /// Bumps the ref count; called whenever a new sub-stream reference or
    /// outstanding handler is created against this channel.
    pub fn acquire(&self) {
        self.ref_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Drops one reference, returning `true` if this was the last one and
    /// the channel should be removed from the Post Master's map.
    #[must_use]
    pub fn release(&self) -> bool {
        self.ref_count.fetch_sub(1, Ordering::SeqCst) == 1
    }

    /// Current reference count, for diagnostics and tests.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    /// Connects the underlying stream if it isn't already.
    ///
    /// # Errors
    ///
    /// Propagates [`StreamError`] from [`Stream::force_connect`].
    pub async fn connect(&self) -> Result<(), StreamError> {
        let result = self.stream.force_connect().await;
        match &result {
            Ok(()) => self.notify_connect(),
            Err(err) => self.notify_conn_err(err),
        }
        result
    }

    /// Submits a request through this channel's stream.
    ///
    /// # Errors
    ///
    /// Propagates [`StreamError`] from [`Stream::send`].
    pub async fn send(
        &self,
        header: RequestHeader,
        body: BytesMut,
        requested_session: u64,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<StreamId, StreamError> {
        self.stream.send(header, body, requested_session, handler).await
    }

    /// Whether this channel's stream can already reach every address in
    /// `addrs` (used to collapse a redirect that points back at a
    /// reachable peer).
    #[must_use]
    pub fn can_collapse(&self, addrs: &[SocketAddr]) -> bool {
        self.stream.can_collapse(addrs)
    }

    /// Forces every in-flight handler to fail and tears down the
    /// channel's sockets, without removing the channel from any map —
    /// that's the Post Master's job once ref counting says it's safe.
    pub fn force_error(&self, err: StreamError) {
        self.stream.force_error(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrd_transport::XrdTransport;

    fn test_channel() -> Channel<XrdTransport> {
        Channel::new(
            "example.org",
            1094,
            StreamConfig::default(),
            Arc::new(XrdTransport::default()),
        )
    }

    #[test]
    fn new_channel_starts_with_one_reference() {
        let channel = test_channel();
        assert_eq!(channel.ref_count(), 1);
    }

    #[test]
    fn acquire_and_release_round_trip() {
        let channel = test_channel();
        channel.acquire();
        assert_eq!(channel.ref_count(), 2);
        assert!(!channel.release());
        assert!(channel.release());
    }

    #[test]
    fn host_id_matches_stream() {
        let channel = test_channel();
        assert_eq!(channel.host_id(), "example.org:1094");
    }
}
