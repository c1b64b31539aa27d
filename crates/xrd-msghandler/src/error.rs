//! The client-visible error taxonomy and final outcome shape.

/// Error kinds a [`crate::handler::MsgHandler`] can terminate with,
/// matching the specification's error-handling taxonomy (configuration/
/// usage errors live entirely above this layer — a `MsgHandler` only
/// ever sees resolution, protocol, server-declared, checksum, and
/// operational failures).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Every connect attempt on the underlying stream was exhausted.
    #[error("connection error")]
    ConnectionError,

    /// A response header or body failed to decode.
    #[error("corrupted header: {0}")]
    CorruptedHeader(String),

    /// The server returned `error` with a protocol-level code and
    /// message.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Server-reported numeric error code.
        code: u32,
        /// Server-reported human-readable message.
        message: String,
    },

    /// End-to-end checksum verification failed.
    #[error("checksum verification failed: expected {expected}, got {actual}")]
    ChecksumError {
        /// Checksum the server reported.
        expected: String,
        /// Checksum this handler computed locally.
        actual: String,
    },

    /// The request's deadline elapsed before a terminal response
    /// arrived.
    #[error("operation expired")]
    OperationExpired,

    /// The caller cancelled the request (progress handler or explicit
    /// cancel), distinct from a deadline passively elapsing.
    #[error("operation interrupted")]
    OperationInterrupted,

    /// The maximum redirect count was exceeded.
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u32),

    /// The underlying stream reported a fatal, non-retryable failure.
    #[error("fatal transport error: {0}")]
    Fatal(String),
}

impl HandlerError {
    /// Whether this error is fatal — bypasses every retry policy, per
    /// the specification's propagation rule ("Fatal statuses bypass all
    /// retry policies").
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::TooManyRedirects(_))
    }
}

/// The final, client-visible result of driving one request through its
/// full lifetime: a `(status, response, host-list)` triple per the
/// specification's propagation rule, collapsed here into a `Result`-like
/// sum since "host-list" is just the sequence of URLs the request was
/// redirected across, carried by [`crate::handler::MsgHandler::redirect_trail`].
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The request completed successfully; the body is the final,
    /// fully-assembled response (partial chunks already folded in).
    Ok(bytes::BytesMut),
    /// The request failed with a retryable-in-principle error that this
    /// handler nonetheless gave up on (redirects/retries exhausted).
    Error(HandlerError),
    /// The request failed fatally; no retry would have helped.
    Fatal(HandlerError),
}

impl Outcome {
    /// Whether this outcome represents success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Maps a wire [`StatusCode::Error`] response's 4-byte code + text body
/// into a [`HandlerError::ServerError`].
#[must_use]
pub fn decode_server_error(body: &[u8]) -> HandlerError {
    if body.len() < 4 {
        return HandlerError::ServerError {
            code: 0,
            message: String::from_utf8_lossy(body).into_owned(),
        };
    }
    let code = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    let message = String::from_utf8_lossy(&body[4..]).into_owned();
    HandlerError::ServerError { code, message }
}
