#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Protocol-specific hooks consumed by the Stream layer (`xrd-stream`).
//!
//! ## Overview
//!
//! Everything a multiplexed connection needs to know about the XRootD
//! wire protocol *beyond* raw framing lives here: the login/handshake
//! sequence ([`handshake`]), how to tell a legacy response header from a
//! `status` one and how many body bytes still need reading
//! ([`framing`]), which sub-stream a request/response pair should travel
//! on ([`multiplex`]), and when a stream counts as idle-too-long or
//! health-broken ([`health`]). None of this crate owns a socket — it
//! only turns bytes and timers into protocol decisions, which is why it
//! depends on `xrd-wire` and nothing network-shaped.
//!
//! ## Design
//!
//! [`TransportHandler`] bundles the hooks the specification names for
//! component 6 (`HandShake`, `GetHeader`/`GetBody`, `MessageReceived`,
//! `MultiplexSubStream`, `IsStreamTTLElapsed`, `IsStreamBroken`) behind
//! one trait so `xrd-stream` can be generic over it; [`XrdTransport`] is
//! the one production implementation.
//!
//! ## Errors
//!
//! [`TransportError`] covers handshake and framing failures.

pub mod framing;
pub mod handshake;
pub mod health;
pub mod multiplex;

pub use framing::{FrameOutcome, ResponseFrame};
pub use handshake::{HandShakeData, HandshakeOutcome, HandshakeStep};
pub use health::ChannelHealth;
pub use multiplex::SubStreamRoute;

use xrd_wire::{Message, Opcode, StatusCode};

/// Errors raised while driving the handshake or framing a response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The handshake received bytes it couldn't interpret at its current
    /// step.
    #[error("handshake failed at step {step:?}: {reason}")]
    HandshakeFailed {
        /// The step the handshake was in when it failed.
        step: HandshakeStep,
        /// Human-readable reason, not parsed by callers.
        reason: String,
    },

    /// Wire-level decode failure surfaced while framing a response.
    #[error("framing error: {0}")]
    Wire(#[from] xrd_wire::WireError),

    /// A server-declared error arrived during the login sequence itself,
    /// before any [`crate::framing`] could report it to a `MsgHandler`.
    #[error("server rejected login/auth: {0}")]
    LoginRejected(String),
}

/// What a transport did with an incoming message after inspecting it:
/// whether it consumed the message internally (an `attn` notification
/// the caller never needs to see) and whether the sub-stream it arrived
/// on should be closed as a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageDisposition {
    /// The transport fully handled this message; the Stream must not
    /// hand it to any registered `MsgHandler`.
    pub digested: bool,
    /// The sub-stream this message arrived on should be closed.
    pub request_close: bool,
}

/// Read-only view of the state `xrd-stream` tracks per channel that the
/// health and multiplexing hooks need without this crate depending on
/// `xrd-stream` itself (which would be a cycle: `xrd-stream` depends on
/// `xrd-transport`, not the other way around).
#[derive(Debug, Clone, Copy)]
pub struct ChannelData {
    /// Every sub-stream's out-queue is currently empty.
    pub out_queues_empty: bool,
    /// Number of sub-streams this stream currently maintains (including
    /// sub-stream 0).
    pub sub_stream_count: usize,
    /// Consecutive health-check failures observed since the last
    /// successful exchange.
    pub consecutive_failures: u32,
}

/// Protocol-specific hooks a `Stream` drives its socket(s) through.
///
/// Modeled as a trait (rather than baking the XRootD wire protocol
/// directly into `xrd-stream`) so the transport layer can be swapped or
/// mocked in tests without touching connection/retry/multiplexing logic.
pub trait TransportHandler: Send + Sync {
    /// Advances the login/protocol/bind/auth handshake by one step given
    /// newly received bytes (empty on the very first call, which should
    /// produce the initial outbound bytes to send).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::HandshakeFailed`] or
    /// [`TransportError::LoginRejected`] if the exchange cannot proceed.
    fn handshake(
        &self,
        state: &mut HandShakeData,
        received: &[u8],
    ) -> Result<HandshakeOutcome, TransportError>;

    /// Attempts to parse a response header from `buf`, reporting how many
    /// more bytes are needed if it's short and, once a header is
    /// available, how many body bytes follow.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Wire`] if the header bytes present don't
    /// decode (e.g. an unrecognized status code).
    fn get_header(&self, buf: &[u8]) -> Result<FrameOutcome, TransportError>;

    /// Inspects a fully-framed message before it's handed to the Stream's
    /// in-queue lookup, letting the transport digest protocol-internal
    /// notifications (`attn`) without surfacing them to a `MsgHandler`.
    fn message_received(
        &self,
        status: StatusCode,
        msg: &Message,
        sub_stream: usize,
    ) -> MessageDisposition;

    /// Chooses which sub-stream pair a request of opcode `opcode` should
    /// be sent on (`up`) and which its response is expected on (`down`),
    /// given `sub_stream_count` available sub-streams.
    fn multiplex_sub_stream(&self, opcode: Opcode, sub_stream_count: usize) -> SubStreamRoute;

    /// Whether a stream that has been idle for `idle` should be torn down
    /// as TTL-expired (only ever true when every out-queue is empty).
    fn is_stream_ttl_elapsed(&self, idle: std::time::Duration, channel: ChannelData) -> bool;

    /// Whether a stream that has been idle for `idle` should be
    /// considered broken (health-check failures exceeded, or idle far
    /// past what a responsive server would allow).
    fn is_stream_broken(&self, idle: std::time::Duration, channel: ChannelData) -> bool;
}

/// The XRootD client protocol's [`TransportHandler`] implementation.
#[derive(Debug, Clone)]
pub struct XrdTransport {
    /// Maximum idle time (no traffic on any sub-stream, all out-queues
    /// empty) before the stream is considered TTL-expired.
    pub stream_ttl: std::time::Duration,
    /// Maximum idle time before a stream with no queued work is
    /// considered broken regardless of TTL (catches a half-open socket
    /// the OS hasn't reported as closed yet).
    pub broken_after: std::time::Duration,
    /// Consecutive health-check failures that mark a stream broken
    /// outright, independent of idle time.
    pub max_consecutive_failures: u32,
}

impl Default for XrdTransport {
    fn default() -> Self {
        Self {
            stream_ttl: std::time::Duration::from_secs(300),
            broken_after: std::time::Duration::from_secs(900),
            max_consecutive_failures: 3,
        }
    }
}

impl TransportHandler for XrdTransport {
    fn handshake(
        &self,
        state: &mut HandShakeData,
        received: &[u8],
    ) -> Result<HandshakeOutcome, TransportError> {
        handshake::drive(state, received)
    }

    fn get_header(&self, buf: &[u8]) -> Result<FrameOutcome, TransportError> {
        framing::get_header(buf)
    }

    fn message_received(
        &self,
        status: StatusCode,
        _msg: &Message,
        _sub_stream: usize,
    ) -> MessageDisposition {
        multiplex::digest_status(status)
    }

    fn multiplex_sub_stream(&self, opcode: Opcode, sub_stream_count: usize) -> SubStreamRoute {
        multiplex::route_for_opcode(opcode, sub_stream_count)
    }

    fn is_stream_ttl_elapsed(&self, idle: std::time::Duration, channel: ChannelData) -> bool {
        health::is_ttl_elapsed(idle, channel, self.stream_ttl)
    }

    fn is_stream_broken(&self, idle: std::time::Duration, channel: ChannelData) -> bool {
        health::is_broken(idle, channel, self.broken_after, self.max_consecutive_failures)
    }
}
