//! The client-visible status/error taxonomy (error-handling section): every
//! asynchronous surface resolves to a `(status, response, host-list)`
//! triple, collapsed here into [`XrdStatus`] plus a `Result`.

use xrd_msghandler::HandlerError;
use xrd_postmaster::PostMasterError;

/// Errors this crate's public API can return.
///
/// Configuration/usage errors ([`Self::InvalidUrl`], [`Self::BadArgument`])
/// are surfaced directly and never retried. Everything else mirrors
/// [`HandlerError`] one-to-one, plus the cache and channel-lookup failure
/// cases specific to this layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The URL couldn't be parsed or was missing a required part.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A caller-supplied argument was invalid independent of any request
    /// (an empty path, a malformed checksum name, ...).
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// Every connect attempt was exhausted.
    #[error("connection error")]
    ConnectionError,

    /// A response header or body failed to decode.
    #[error("corrupted header: {0}")]
    CorruptedHeader(String),

    /// The server returned `error` with a protocol-level code and
    /// message.
    #[error("server error {code}: {message}")]
    Server {
        /// Server-reported numeric error code.
        code: u32,
        /// Server-reported human-readable message.
        message: String,
    },

    /// End-to-end checksum verification failed.
    #[error("checksum verification failed: expected {expected}, got {actual}")]
    Checksum {
        /// Checksum the server reported.
        expected: String,
        /// Checksum computed locally.
        actual: String,
    },

    /// The request's deadline elapsed before a terminal response arrived.
    #[error("operation expired")]
    Expired,

    /// The caller cancelled the request.
    #[error("operation interrupted")]
    Interrupted,

    /// The maximum redirect count was exceeded.
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u32),

    /// A non-retryable transport failure.
    #[error("fatal transport error: {0}")]
    Fatal(String),

    /// No channel could be found or created for the request's endpoint.
    #[error(transparent)]
    PostMaster(#[from] PostMasterError),

    /// The block cache backing a read/readv failed.
    #[error(transparent)]
    Cache(#[from] xrd_cache::CacheError),

    /// The completion channel for an in-flight request was dropped before
    /// it could deliver an outcome, meaning the stream or channel that
    /// owned it was torn down out from under it.
    #[error("request dropped before completion")]
    Cancelled,
}

impl From<HandlerError> for ClientError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::ConnectionError => Self::ConnectionError,
            HandlerError::CorruptedHeader(msg) => Self::CorruptedHeader(msg),
            HandlerError::ServerError { code, message } => Self::Server { code, message },
            HandlerError::ChecksumError { expected, actual } => Self::Checksum { expected, actual },
            HandlerError::OperationExpired => Self::Expired,
            HandlerError::OperationInterrupted => Self::Interrupted,
            HandlerError::TooManyRedirects(limit) => Self::TooManyRedirects(limit),
            HandlerError::Fatal(msg) => Self::Fatal(msg),
        }
    }
}

/// `status` component of the `(status, response, host-list)` propagation
/// triple every asynchronous call resolves to: one of `Ok | Error | Fatal`
/// crossed with the error-kind taxonomy above. Fatal statuses bypass all
/// retry policies by construction — they're produced only from errors
/// [`HandlerError::is_fatal`] already marked unretryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The call completed successfully.
    Ok,
    /// The call failed with a retryable-in-principle error the handler
    /// nonetheless gave up on.
    Error,
    /// The call failed fatally; no retry would have helped.
    Fatal,
}

/// The final status of an asynchronous call, alongside the redirect trail
/// (the "host-list" of the propagation rule) it accumulated along the way.
#[derive(Debug, Clone)]
pub struct XrdStatus {
    /// `Ok`, `Error`, or `Fatal`.
    pub class: StatusClass,
    /// The hosts this request was redirected across, oldest first, not
    /// including the final host the response (or failure) came from.
    pub host_list: Vec<String>,
}

impl XrdStatus {
    /// Builds the success case with no redirects recorded.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            class: StatusClass::Ok,
            host_list: Vec::new(),
        }
    }

    /// Builds a status from a terminal [`xrd_msghandler::Outcome`] and the
    /// redirect trail the handler accumulated.
    #[must_use]
    pub fn from_outcome(is_fatal: bool, host_list: Vec<String>) -> Self {
        Self {
            class: if is_fatal { StatusClass::Fatal } else { StatusClass::Error },
            host_list,
        }
    }

    /// Whether this status represents success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.class, StatusClass::Ok)
    }
}
