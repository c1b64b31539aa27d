#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Binary wire codec for the XRootD client protocol.
//!
//! ## Overview
//!
//! Every request and response on the wire is a fixed-size header followed
//! by an opcode-specific body. This crate owns that framing end to end:
//! [`opcode::Opcode`] and [`status::StatusCode`]/[`status::StatusKind`] name
//! the closed sets of operations and outcomes the protocol defines;
//! [`header::RequestHeader`] and [`header::ResponseHeader`] encode/decode
//! the eight- and twenty-four-byte headers; [`message::Message`] is the
//! owned buffer a [`header`] and its body live in once read off a socket;
//! [`sid::SidPool`] hands out the two-byte stream ids that correlate a
//! request with its eventual response; [`body`] defines the fixed-field
//! layout for each opcode's request header and the decoders for the
//! variable-length responses that matter above the transport layer
//! (`locate`, `open`, `read`, `readv`, `pgread`).
//!
//! ## Design
//!
//! Nothing here blocks or allocates eagerly beyond what a single frame
//! needs. Higher layers (`xrd-transport`, `xrd-msghandler`) own sockets,
//! retries, and state machines; this crate only turns bytes into typed
//! values and back.
//!
//! ## Errors
//!
//! All fallible decodes return [`WireError`].

pub mod body;
pub mod header;
pub mod message;
pub mod opcode;
pub mod sid;
pub mod status;

pub use header::{RequestHeader, ResponseHeader, StreamId};
pub use message::Message;
pub use opcode::Opcode;
pub use sid::SidPool;
pub use status::{StatusCode, StatusKind};

/// Errors raised while decoding or framing wire data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// A header or fixed-size body field arrived short.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the frame was supposed to contain.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// The 16-bit opcode field didn't match a known request opcode.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),

    /// The 16-bit status field didn't match a known response status.
    #[error("unknown status {0}")]
    UnknownStatus(u16),

    /// The `status`-reply sub-code didn't match a known [`StatusKind`].
    #[error("unknown status kind {0}")]
    UnknownStatusKind(u16),

    /// A declared body length exceeded the protocol's maximum frame size.
    #[error("body of {declared} bytes exceeds the {max} byte limit")]
    BodyTooLarge {
        /// The length the header declared.
        declared: u32,
        /// The configured ceiling.
        max: u32,
    },
}
