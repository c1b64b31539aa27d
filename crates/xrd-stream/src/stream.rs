//! The multiplexed per-endpoint connection.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use xrd_net::{Socket, SocketOutcome};
use xrd_transport::{ChannelData, TransportHandler};
use xrd_wire::{Message, RequestHeader, SidPool, StatusCode, StreamId};

use crate::handler::{RawChunkOutcome, RequestHandler};
use crate::lock::{SharedStreamLock, StreamLock};
use crate::resolve::{resolve_with_preference, AddressFamily, Resolver, TokioResolver};
use crate::substream::{Envelope, SubStream, SubStreamStatus};
use crate::StreamError;

/// Tunables governing connect/reconnect behavior, sourced from
/// `xrd-env` by the caller that constructs a [`Stream`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Per-address connect timeout.
    pub connection_window: Duration,
    /// Reconnect attempts allowed within one `stream_error_window`.
    pub connection_retry: u32,
    /// Window the reconnect counter resets on.
    pub stream_error_window: Duration,
    /// Sub-streams to negotiate per channel (including sub-stream 0).
    pub sub_streams_per_channel: usize,
    /// IPv4/IPv6 preference.
    pub address_family: AddressFamily,
    /// Idle time (empty queues) before the stream is torn down as
    /// TTL-expired.
    pub stream_ttl: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connection_window: Duration::from_secs(120),
            connection_retry: 5,
            stream_error_window: Duration::from_secs(1800),
            sub_streams_per_channel: 1,
            address_family: AddressFamily::Auto,
            stream_ttl: Duration::from_secs(300),
        }
    }
}

struct StreamInner {
    sub_streams: Vec<SubStream>,
    addresses: Vec<SocketAddr>,
}

/// A sub-stream's socket plus the bytes read off it that haven't yet
/// formed a complete frame. Lives behind its own async mutex, separate
/// from [`StreamLock`], so a blocking read never holds up bookkeeping
/// another task only needs briefly (queueing a send, checking status).
struct SocketSlot {
    socket: Option<Socket>,
    read_buf: BytesMut,
}

impl SocketSlot {
    fn new(socket: Socket) -> Self {
        Self {
            socket: Some(socket),
            read_buf: BytesMut::new(),
        }
    }
}

/// One per `(Channel, endpoint)` multiplexed connection: owns `N ≥ 1`
/// sub-streams, an out-queue per sub-stream, an in-queue keyed by SID,
/// and the reconnect/session-id machinery described for this layer.
pub struct Stream<T: TransportHandler + 'static> {
    host: String,
    port: u16,
    transport: Arc<T>,
    config: StreamConfig,
    resolver: Arc<dyn Resolver>,
    preferred: SyncMutex<Option<(String, u16)>>,
    session_id: Arc<AtomicU64>,
    sid_pool: SyncMutex<SidPool>,
    in_queue: Arc<DashMap<u16, Arc<dyn RequestHandler>>>,
    lock: SharedStreamLock<StreamInner>,
    sockets: DashMap<usize, Arc<AsyncMutex<SocketSlot>>>,
    last_activity: SyncMutex<Instant>,
    consecutive_failures: AtomicU64,
}

impl<T: TransportHandler + 'static> Stream<T> {
    /// Creates a stream targeting `host:port`, not yet connected.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, config: StreamConfig, transport: Arc<T>) -> Self {
        let host = host.into();
        let mut sub_streams = Vec::with_capacity(config.sub_streams_per_channel.max(1));
        sub_streams.push(SubStream::new());
        Self {
            host,
            port,
            transport,
            config,
            resolver: Arc::new(TokioResolver),
            preferred: SyncMutex::new(None),
            session_id: Arc::new(AtomicU64::new(0)),
            sid_pool: SyncMutex::new(SidPool::new()),
            in_queue: Arc::new(DashMap::new()),
            lock: Arc::new(StreamLock::new(StreamInner {
                sub_streams,
                addresses: Vec::new(),
            })),
            sockets: DashMap::new(),
            last_activity: SyncMutex::new(Instant::now()),
            consecutive_failures: AtomicU64::new(0),
        }
    }

    /// Overrides the default DNS resolver; used by tests to supply a
    /// deterministic address list.
    pub fn set_resolver(&mut self, resolver: Arc<dyn Resolver>) {
        self.resolver = resolver;
    }

    /// Records a preferred endpoint (from a TPC redirect negotiation,
    /// say) whose addresses are appended after this stream's own
    /// resolution on the next connect.
    pub fn set_preferred(&self, host: impl Into<String>, port: u16) {
        *self.preferred.lock() = Some((host.into(), port));
    }

    /// `host:port`, the key this stream's owning Channel is looked up
    /// under in the Post Master's channel map.
    #[must_use]
    pub fn host_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The current session id, bumped on every successful sub-stream-0
    /// connect.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.session_id.load(Ordering::SeqCst)
    }

    /// Whether two resolved-address sets overlap, used to detect a
    /// redirect that points back at an endpoint this stream can already
    /// reach (so a `MsgHandler` can collapse it instead of opening a
    /// fresh connection).
    #[must_use]
    pub fn can_collapse(&self, other: &[SocketAddr]) -> bool {
        let guard = self.lock.lock();
        let data = self.lock.data(&guard);
        data.addresses.iter().any(|a| other.contains(a))
    }

    /// Resolves addresses (if not already resolved) and connects
    /// sub-stream 0, then brings up the remaining negotiated
    /// sub-streams in parallel. Implements the nested address-walk ×
    /// reconnect-policy retry: each resolved address gets
    /// `connection_window`; the whole address list is retried up to
    /// `connection_retry` times before giving up, re-resolving DNS on
    /// each lap.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ConnectionError`] if every address and
    /// every retry attempt is exhausted.
    pub async fn force_connect(&self) -> Result<(), StreamError> {
        for attempt in 0..self.config.connection_retry.max(1) {
            let addresses = self.resolve_addresses().await?;
            {
                let guard = self.lock.lock();
                self.lock.data(&guard).addresses = addresses.clone();
            }
            for addr in &addresses {
                match Socket::connect(*addr, self.config.connection_window).await {
                    Ok(socket) => {
                        self.finish_control_connect(socket).await?;
                        self.bring_up_peer_sub_streams(*addr).await;
                        return Ok(());
                    }
                    Err(err) => {
                        debug!(%addr, %err, attempt, "sub-stream 0 connect attempt failed");
                    }
                }
            }
            warn!(
                attempt,
                host = %self.host_id(),
                "exhausted address list without connecting; will re-resolve"
            );
        }
        Err(StreamError::ConnectionError)
    }

    async fn resolve_addresses(&self) -> Result<Vec<SocketAddr>, StreamError> {
        let preferred = self.preferred.lock().clone();
        let preferred_ref = preferred.as_ref().map(|(h, p)| (h.as_str(), *p));
        resolve_with_preference(
            self.resolver.as_ref(),
            &self.host,
            self.port,
            self.config.address_family,
            preferred_ref,
        )
        .await
        .map_err(|_| StreamError::ConnectionError)
    }

    async fn finish_control_connect(&self, socket: Socket) -> Result<(), StreamError> {
        let session = self.session_id.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let guard = self.lock.lock();
            self.lock.data(&guard).sub_streams[0].status = SubStreamStatus::Connected;
        }
        self.sockets
            .insert(0, Arc::new(AsyncMutex::new(SocketSlot::new(socket))));
        *self.last_activity.lock() = Instant::now();
        self.consecutive_failures.store(0, Ordering::SeqCst);
        debug!(session, "control sub-stream connected");
        Ok(())
    }

    async fn bring_up_peer_sub_streams(&self, addr: SocketAddr) {
        let wanted = self.config.sub_streams_per_channel.max(1);
        {
            let guard = self.lock.lock();
            let data = self.lock.data(&guard);
            let mut data = data;
            while data.sub_streams.len() < wanted {
                data.sub_streams.push(SubStream::new());
            }
        }
        for idx in 1..wanted {
            match Socket::connect(addr, self.config.connection_window).await {
                Ok(socket) => {
                    let guard = self.lock.lock();
                    self.lock.data(&guard).sub_streams[idx].status = SubStreamStatus::Connected;
                    drop(guard);
                    self.sockets
                        .insert(idx, Arc::new(AsyncMutex::new(SocketSlot::new(socket))));
                }
                Err(err) => {
                    warn!(idx, %err, "peer sub-stream failed to connect; queued work stays on sub-stream 0");
                    let guard = self.lock.lock();
                    self.lock.data(&guard).sub_streams[idx].status = SubStreamStatus::Disconnected;
                }
            }
        }
    }

    /// Submits `header`+`body` for sending, returning the stream id
    /// allocated for it. Rejects a non-zero, stale session id outright.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidSession`] if `requested_session` is
    /// non-zero and doesn't match the current session.
    pub async fn send(
        &self,
        mut header: RequestHeader,
        body: BytesMut,
        requested_session: u64,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<StreamId, StreamError> {
        if requested_session != 0 && requested_session != self.session_id() {
            return Err(StreamError::InvalidSession);
        }

        let sid = self.sid_pool.lock().acquire();
        header.stream_id = sid;

        let mut frame = BytesMut::with_capacity(RequestHeader::LEN + body.len());
        let mut header_bytes = [0u8; RequestHeader::LEN];
        header.encode(&mut header_bytes);
        frame.extend_from_slice(&header_bytes);
        frame.extend_from_slice(&body);

        let sub_stream_count = {
            let guard = self.lock.lock();
            self.lock.data(&guard).sub_streams.len()
        };
        let route = self
            .transport
            .multiplex_sub_stream(header.opcode, sub_stream_count);

        self.in_queue.insert(sid.0, handler.clone());

        let msg = Message::from_body(sid, self.session_id(), frame);
        {
            let guard = self.lock.lock();
            let mut data = self.lock.data(&guard);
            let idx = route.up.min(data.sub_streams.len().saturating_sub(1));
            data.sub_streams[idx]
                .out_queue
                .push_back(Envelope { msg, handler });
        }
        Ok(sid)
    }

    /// Drains and writes every queued message on sub-stream `idx`,
    /// returning once the queue is empty or a write fails.
    async fn flush_sub_stream(&self, idx: usize) -> Result<(), StreamError> {
        let Some(socket_slot) = self.sockets.get(&idx).map(|s| s.clone()) else {
            return Ok(());
        };
        loop {
            let next = {
                let guard = self.lock.lock();
                let mut data = self.lock.data(&guard);
                data.sub_streams[idx].out_queue.pop_front()
            };
            let Some(Envelope { mut msg, handler }) = next else {
                return Ok(());
            };
            handler.on_ready_to_send(&mut msg);
            let mut slot = socket_slot.lock().await;
            let Some(socket) = slot.socket.as_mut() else {
                return Err(StreamError::Closed);
            };
            if let Err(err) = write_all(socket, msg.body()).await {
                drop(slot);
                self.requeue_front(idx, msg, handler.clone());
                return Err(err);
            }
            drop(slot);
            handler.on_sent();
            *self.last_activity.lock() = Instant::now();
        }
    }

    fn requeue_front(&self, idx: usize, msg: Message, handler: Arc<dyn RequestHandler>) {
        let guard = self.lock.lock();
        let mut data = self.lock.data(&guard);
        data.sub_streams[idx]
            .out_queue
            .push_front(Envelope { msg, handler });
    }

    /// Reads one round of bytes off sub-stream `idx`'s socket and
    /// dispatches as many complete frames as that leaves buffered,
    /// carrying any trailing partial frame over to the next call.
    async fn pump_reads(&self, idx: usize) -> Result<usize, StreamError> {
        let Some(socket_slot) = self.sockets.get(&idx).map(|s| s.clone()) else {
            return Ok(0);
        };
        let mut slot = socket_slot.lock().await;
        let Some(socket) = slot.socket.as_mut() else {
            return Ok(0);
        };

        let mut scratch = [0u8; 16 * 1024];
        match socket.recv(&mut scratch).await {
            Ok(SocketOutcome::Done) => return Err(StreamError::ConnectionError),
            Ok(SocketOutcome::Retry) => return Ok(0),
            Ok(SocketOutcome::Ok) => slot.read_buf.extend_from_slice(&scratch),
            Ok(SocketOutcome::Partial { transferred }) => {
                slot.read_buf.extend_from_slice(&scratch[..transferred]);
            }
            Err(err) => {
                warn!(%err, idx, "socket read error");
                return Err(StreamError::ConnectionError);
            }
        }

        let mut processed = 0usize;
        loop {
            match self.transport.get_header(&slot.read_buf) {
                Ok(xrd_transport::FrameOutcome::NeedMoreBytes { .. }) => break,
                Ok(xrd_transport::FrameOutcome::Header(frame)) => {
                    let total = xrd_wire::header::ResponseHeader::LEN + frame.body_len as usize;
                    if slot.read_buf.len() < total {
                        break;
                    }
                    let body_bytes = slot.read_buf.split_to(total);
                    let status = status_of(&frame.header);
                    self.dispatch(idx, status, body_bytes);
                    processed += 1;
                }
                Err(err) => {
                    warn!(%err, idx, "corrupted response header; closing sub-stream");
                    return Err(StreamError::CorruptedHeader(err.to_string()));
                }
            }
        }
        Ok(processed)
    }

    fn dispatch(&self, idx: usize, status: StatusCode, frame_bytes: BytesMut) {
        *self.last_activity.lock() = Instant::now();

        // The stream id is the first two bytes of any response header,
        // legacy or `status`-shaped alike.
        if frame_bytes.len() < 2 {
            return;
        }
        let sid = u16::from_be_bytes([frame_bytes[0], frame_bytes[1]]);
        let msg = Message::from_body(StreamId(sid), self.session_id(), frame_bytes);

        let disposition = self.transport.message_received(status, &msg, idx);
        if disposition.digested {
            return;
        }

        let Some(handler) = self.in_queue.get(&sid).map(|h| h.clone()) else {
            return;
        };

        if handler.wants_raw_mode() {
            let done = handler.on_raw_chunk(msg.body()) == RawChunkOutcome::Done;
            if done {
                self.release_sid(sid);
            }
            return;
        }

        handler.process(status, msg);
        if !status.is_transient() {
            self.release_sid(sid);
        }
    }

    fn release_sid(&self, sid: u16) {
        self.in_queue.remove(&sid);
        self.sid_pool.lock().release(StreamId(sid));
    }

    /// One iteration of the sub-stream 0 flush/read cycle, suitable for
    /// driving from a caller-owned loop (a dedicated task, or a test
    /// harness stepping the stream by hand).
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] if the underlying socket fails.
    pub async fn pump(&self) -> Result<(), StreamError> {
        let count = {
            let guard = self.lock.lock();
            self.lock.data(&guard).sub_streams.len()
        };
        for idx in 0..count {
            self.flush_sub_stream(idx).await?;
            self.pump_reads(idx).await?;
        }
        Ok(())
    }

    /// Sweeps TTL/broken conditions given the current idle time. Returns
    /// `true` if the caller should tear this stream down (TTL elapsed or
    /// broken).
    #[must_use]
    pub fn tick(&self, now: Instant) -> bool {
        let idle = now.duration_since(*self.last_activity.lock());
        let (out_queues_empty, sub_stream_count) = {
            let guard = self.lock.lock();
            let data = self.lock.data(&guard);
            (
                data.sub_streams.iter().all(|s| s.out_queue.is_empty()),
                data.sub_streams.len(),
            )
        };
        let channel = ChannelData {
            out_queues_empty,
            sub_stream_count,
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst) as u32,
        };
        self.transport.is_stream_broken(idle, channel)
            || self.transport.is_stream_ttl_elapsed(idle, channel)
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_queue.len()
    }

    /// Forces every in-flight handler to observe a fatal error and clears
    /// the in-queue and all out-queues, as part of tearing this stream
    /// down.
    pub fn force_error(&self, err: StreamError) {
        for entry in self.in_queue.iter() {
            entry.value().on_fatal_error(err.clone());
        }
        self.in_queue.clear();
        let guard = self.lock.lock();
        let mut data = self.lock.data(&guard);
        for sub in &mut data.sub_streams {
            sub.status = SubStreamStatus::Disconnected;
            sub.out_queue = VecDeque::new();
        }
        drop(data);
        drop(guard);
        self.sockets.clear();
    }
}

fn status_of(header: &xrd_wire::header::ResponseHeader) -> StatusCode {
    match header {
        xrd_wire::header::ResponseHeader::Legacy { status, .. } => *status,
        xrd_wire::header::ResponseHeader::Status { .. } => StatusCode::Status,
    }
}

async fn write_all(socket: &mut Socket, mut buf: &[u8]) -> Result<(), StreamError> {
    while !buf.is_empty() {
        match socket.send(buf).await {
            Ok(SocketOutcome::Ok) => return Ok(()),
            Ok(SocketOutcome::Partial { transferred }) => buf = &buf[transferred..],
            Ok(SocketOutcome::Retry) => tokio::task::yield_now().await,
            Ok(SocketOutcome::Done) => return Err(StreamError::ConnectionError),
            Err(_) => return Err(StreamError::ConnectionError),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use xrd_transport::XrdTransport;

    fn test_stream() -> Stream<XrdTransport> {
        Stream::new(
            "example.org",
            1094,
            StreamConfig::default(),
            Arc::new(XrdTransport::default()),
        )
    }

    #[test]
    fn host_id_is_host_colon_port() {
        let stream = test_stream();
        assert_eq!(stream.host_id(), "example.org:1094");
    }

    #[test]
    fn session_id_starts_at_zero() {
        let stream = test_stream();
        assert_eq!(stream.session_id(), 0);
    }

    #[tokio::test]
    async fn send_with_stale_session_is_rejected() {
        struct NullHandler;
        impl RequestHandler for NullHandler {
            fn process(&self, _status: StatusCode, _msg: Message) {}
            fn on_fatal_error(&self, _err: StreamError) {}
        }

        let stream = test_stream();
        let header = RequestHeader {
            stream_id: StreamId::ANY,
            opcode: xrd_wire::Opcode::Ping,
            opaque: [0u8; 16],
            dlen: 0,
        };
        let result = stream
            .send(header, BytesMut::new(), 7, Arc::new(NullHandler))
            .await;
        assert!(matches!(result, Err(StreamError::InvalidSession)));
    }

    #[tokio::test]
    async fn send_with_zero_session_allocates_a_sid() {
        struct CountingHandler(AtomicUsize);
        impl RequestHandler for CountingHandler {
            fn process(&self, _status: StatusCode, _msg: Message) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn on_fatal_error(&self, _err: StreamError) {}
        }

        let stream = test_stream();
        let header = RequestHeader {
            stream_id: StreamId::ANY,
            opcode: xrd_wire::Opcode::Ping,
            opaque: [0u8; 16],
            dlen: 0,
        };
        let sid = stream
            .send(
                header,
                BytesMut::new(),
                0,
                Arc::new(CountingHandler(AtomicUsize::new(0))),
            )
            .await
            .unwrap();
        assert_ne!(sid, StreamId::ANY);
        assert_eq!(stream.in_flight_count(), 1);
    }

    #[test]
    fn tick_is_not_ttl_elapsed_immediately_after_creation() {
        let stream = test_stream();
        assert!(!stream.tick(Instant::now()));
    }
}
