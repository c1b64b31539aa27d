#![deny(unsafe_code)]
#![deny(missing_docs)]

//! The multiplexed, reconnecting connection to one XRootD endpoint.
//!
//! ## Overview
//!
//! A [`stream::Stream`] owns everything the specification's Stream
//! component is responsible for: one or more sub-streams sharing a
//! session id and a pool of stream ids ([`xrd_wire::SidPool`]), an
//! out-queue per sub-stream, an in-queue that routes an incoming
//! response back to the [`handler::RequestHandler`] that sent it, lazy
//! address resolution with a preference bias ([`resolve`]), and the
//! [`lock::StreamLock`] that lets a close running on one task and a
//! socket-readiness callback running on another cooperate instead of
//! deadlocking.
//!
//! What a `Stream` is *not* is protocol-aware: login sequencing, frame
//! shape, sub-stream routing policy, and idle/health thresholds all
//! come from an injected [`xrd_transport::TransportHandler`]. That
//! split is what lets this crate depend only on `xrd-net` for sockets
//! and `xrd-transport` for protocol decisions, with no knowledge of
//! opcodes beyond what it needs to route a send.
//!
//! ## Design
//!
//! Sockets live outside the [`lock::StreamLock`]-guarded bookkeeping,
//! each behind its own `tokio::sync::Mutex`, so a blocking read or
//! write never stalls a caller that only needs the lock briefly (to
//! queue a send, to check sub-stream status). See [`substream`] for
//! the bookkeeping the lock actually guards.
//!
//! ## Errors
//!
//! All fallible operations return [`StreamError`].

pub mod handler;
pub mod lock;
pub mod resolve;
pub mod stream;
pub mod substream;

pub use handler::{RawChunkOutcome, RequestHandler};
pub use lock::{LockOutcome, SharedStreamLock, StreamLock, StreamLockGuard};
pub use resolve::{AddressFamily, Resolver, TokioResolver};
pub use stream::{Stream, StreamConfig};
pub use substream::{Envelope, SubStream, SubStreamStatus};

/// Errors a [`stream::Stream`] can fail an operation with.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// Every resolved address and every retry attempt was exhausted
    /// without completing a connection.
    #[error("failed to connect to the endpoint")]
    ConnectionError,

    /// A send named a session id that doesn't match the stream's
    /// current one.
    #[error("stale session id")]
    InvalidSession,

    /// An operation was attempted on a sub-stream with no active
    /// socket.
    #[error("sub-stream is not connected")]
    Closed,

    /// A response header failed to decode.
    #[error("corrupted response header: {0}")]
    CorruptedHeader(String),

    /// The underlying protocol layer rejected a handshake step or
    /// failed to frame a response.
    #[error(transparent)]
    Transport(#[from] xrd_transport::TransportError),
}
