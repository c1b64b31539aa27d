//! The process-wide `hostId -> Channel` map and the global connect/
//! disconnect policies that operate on it.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info};
use xrd_stream::{RequestHandler, StreamConfig, StreamError};
use xrd_transport::TransportHandler;
use xrd_wire::{RequestHeader, StreamId};

use crate::channel::{Channel, ChannelEventHandler};

/// A fact about a channel a caller can ask the Post Master for without
/// reaching into the channel/stream internals directly, matching
/// `QueryTransport`'s field-selector shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryField {
    /// The channel's current session id.
    SessionId,
    /// Number of requests currently in flight on the channel.
    InFlightCount,
    /// The channel's reference count.
    RefCount,
}

/// A queried value, typed per [`QueryField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryValue {
    /// Answer to [`QueryField::SessionId`].
    SessionId(u64),
    /// Answer to [`QueryField::InFlightCount`].
    InFlightCount(usize),
    /// Answer to [`QueryField::RefCount`].
    RefCount(usize),
}

/// Errors raised by Post Master operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PostMasterError {
    /// No channel exists for the requested `hostId`.
    #[error("no channel for {0:?}")]
    NoSuchChannel(String),

    /// The channel's stream reported an error.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Process-wide singleton (when constructed via [`PostMaster::init`])
/// owning the `hostId -> Channel` map. Channels are created on demand by
/// [`PostMaster::send`] and torn down by [`PostMaster::force_disconnect`]
/// once the last reference is released.
///
/// Generic over the transport implementation so tests can swap in a
/// fake [`TransportHandler`] without touching connect/retry logic; the
/// production binary fixes `T = xrd_transport::XrdTransport`.
pub struct PostMaster<T: TransportHandler + 'static> {
    channels: Mutex<FxHashMap<String, Arc<Channel<T>>>>,
    transport: Arc<T>,
    default_config: StreamConfig,
}

impl<T: TransportHandler + 'static> PostMaster<T> {
    /// Creates a fresh, empty Post Master. Tests construct a private
    /// instance directly rather than sharing process-global state; a
    /// host binary instead stores this behind a `OnceLock` (see
    /// `xrd-postmaster`'s design note on deterministic init/finalize).
    #[must_use]
    pub fn init(transport: Arc<T>, default_config: StreamConfig) -> Self {
        Self {
            channels: Mutex::new(FxHashMap::default()),
            transport,
            default_config,
        }
    }

    /// Tears down every channel, forcing each one's in-flight handlers to
    /// fail. Mirrors an explicit `finalize()` call at process shutdown
    /// rather than relying on drop order.
    pub fn finalize(&self) {
        let mut channels = self.channels.lock();
        for (host_id, channel) in channels.drain() {
            debug!(%host_id, "post master finalize: tearing down channel");
            channel.force_error(StreamError::Closed);
        }
    }

    /// Number of channels currently tracked.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    fn get_or_create_channel(&self, host: &str, port: u16) -> Arc<Channel<T>> {
        let host_id = format!("{host}:{port}");
        let mut channels = self.channels.lock();
        if let Some(channel) = channels.get(&host_id) {
            channel.acquire();
            return channel.clone();
        }
        let channel = Arc::new(Channel::new(
            host,
            port,
            self.default_config.clone(),
            self.transport.clone(),
        ));
        channels.insert(host_id, channel.clone());
        channel
    }

    /// Registers `handler` to be notified of connect/disconnect events on
    /// the channel for `host:port`, creating the channel if it doesn't
    /// exist yet.
    pub fn add_event_handler(&self, host: &str, port: u16, handler: Arc<dyn ChannelEventHandler>) {
        let channel = self.get_or_create_channel(host, port);
        channel.add_event_handler(handler);
        channel.release();
    }

    /// Sends a request to `host:port`, creating and connecting its
    /// channel on demand.
    ///
    /// # Errors
    ///
    /// Returns [`PostMasterError::Stream`] if connecting or sending
    /// fails.
    pub async fn send(
        &self,
        host: &str,
        port: u16,
        header: RequestHeader,
        body: BytesMut,
        requested_session: u64,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<StreamId, PostMasterError> {
        let channel = self.get_or_create_channel(host, port);
        if channel.stream().in_flight_count() == 0 {
            // Best-effort: a stream that has never connected yet needs an
            // explicit connect before anything can be queued usefully.
            // A stream mid-reconnect just queues onto sub-stream 0, which
            // `Stream::send` already does unconditionally.
            let _ = channel.connect().await;
        }
        let result = channel.send(header, body, requested_session, handler).await;
        channel.release();
        Ok(result?)
    }

    /// Forces the channel for `host:port` to reconnect: tears down its
    /// current sockets and reconnects from scratch, without removing the
    /// channel from the map.
    ///
    /// # Errors
    ///
    /// Returns [`PostMasterError::NoSuchChannel`] if no channel is
    /// currently tracked for that endpoint.
    pub async fn force_reconnect(&self, host: &str, port: u16) -> Result<(), PostMasterError> {
        let host_id = format!("{host}:{port}");
        let channel = {
            let channels = self.channels.lock();
            channels
                .get(&host_id)
                .cloned()
                .ok_or_else(|| PostMasterError::NoSuchChannel(host_id.clone()))?
        };
        channel.force_error(StreamError::Closed);
        channel.connect().await?;
        Ok(())
    }

    /// Releases one reference on the channel for `host:port`, matching
    /// `sessionId`'s relationship with the current channel (a stale
    /// `sessionId` is accepted: disconnect is unconditional once the ref
    /// count says so). Removes and tears down the channel once its last
    /// reference is released.
    ///
    /// # Errors
    ///
    /// Returns [`PostMasterError::NoSuchChannel`] if no channel exists
    /// for that endpoint.
    pub fn force_disconnect(&self, host: &str, port: u16, _session_id: u64) -> Result<(), PostMasterError> {
        let host_id = format!("{host}:{port}");
        let mut channels = self.channels.lock();
        let Some(channel) = channels.get(&host_id).cloned() else {
            return Err(PostMasterError::NoSuchChannel(host_id));
        };
        if channel.release() {
            channels.remove(&host_id);
            drop(channels);
            info!(%host_id, "last reference released; tearing down channel");
            channel.force_error(StreamError::Closed);
        }
        Ok(())
    }

    /// Invokes every registered connect handler for `host:port`.
    pub fn notify_connect_handler(&self, host: &str, port: u16) {
        let host_id = format!("{host}:{port}");
        if let Some(channel) = self.channels.lock().get(&host_id) {
            channel.notify_connect();
        }
    }

    /// Invokes every registered connection-error handler for
    /// `host:port`.
    pub fn notify_conn_err_handler(&self, host: &str, port: u16, err: &StreamError) {
        let host_id = format!("{host}:{port}");
        if let Some(channel) = self.channels.lock().get(&host_id) {
            channel.notify_conn_err(err);
        }
    }

    /// Answers a [`QueryField`] about the channel for `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`PostMasterError::NoSuchChannel`] if no channel exists
    /// for that endpoint.
    pub fn query_transport(
        &self,
        host: &str,
        port: u16,
        field: QueryField,
    ) -> Result<QueryValue, PostMasterError> {
        let host_id = format!("{host}:{port}");
        let channels = self.channels.lock();
        let channel = channels
            .get(&host_id)
            .ok_or_else(|| PostMasterError::NoSuchChannel(host_id))?;
        Ok(match field {
            QueryField::SessionId => QueryValue::SessionId(channel.stream().session_id()),
            QueryField::InFlightCount => QueryValue::InFlightCount(channel.stream().in_flight_count()),
            QueryField::RefCount => QueryValue::RefCount(channel.ref_count()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrd_transport::XrdTransport;

    fn test_post_master() -> PostMaster<XrdTransport> {
        PostMaster::init(Arc::new(XrdTransport::default()), StreamConfig::default())
    }

    #[test]
    fn channel_count_starts_at_zero() {
        let pm = test_post_master();
        assert_eq!(pm.channel_count(), 0);
    }

    #[test]
    fn get_or_create_is_idempotent_per_host_id() {
        let pm = test_post_master();
        let a = pm.get_or_create_channel("example.org", 1094);
        a.release();
        let b = pm.get_or_create_channel("example.org", 1094);
        b.release();
        assert_eq!(pm.channel_count(), 1);
    }

    #[test]
    fn force_disconnect_without_a_channel_is_an_error() {
        let pm = test_post_master();
        assert!(matches!(
            pm.force_disconnect("nowhere.example", 1094, 0),
            Err(PostMasterError::NoSuchChannel(_))
        ));
    }

    #[test]
    fn force_disconnect_removes_channel_on_last_reference() {
        let pm = test_post_master();
        let channel = pm.get_or_create_channel("example.org", 1094);
        drop(channel);
        assert_eq!(pm.channel_count(), 1);
        pm.force_disconnect("example.org", 1094, 0).unwrap();
        assert_eq!(pm.channel_count(), 0);
    }

    #[test]
    fn query_transport_reports_ref_count() {
        let pm = test_post_master();
        let _channel = pm.get_or_create_channel("example.org", 1094);
        let value = pm
            .query_transport("example.org", 1094, QueryField::RefCount)
            .unwrap();
        assert_eq!(value, QueryValue::RefCount(2));
    }

    #[test]
    fn query_transport_without_a_channel_is_an_error() {
        let pm = test_post_master();
        assert!(matches!(
            pm.query_transport("nowhere.example", 1094, QueryField::SessionId),
            Err(PostMasterError::NoSuchChannel(_))
        ));
    }
}
