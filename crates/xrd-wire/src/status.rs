use crate::WireError;

/// Server response status, as named in the specification's data model and
/// external-interfaces sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StatusCode {
    /// The request completed successfully and the body is the full answer.
    Ok,
    /// A partial answer follows, with more `oksofar` or a final `ok`/`status`
    /// still to come.
    OkSoFar,
    /// An asynchronous, protocol-internal notification (`kXR_attn`).
    Attn,
    /// The server wants another `auth` round trip before the request
    /// completes.
    AuthMore,
    /// The request failed; the body carries an error code and message.
    Error,
    /// The request must be reissued at a different endpoint.
    Redirect,
    /// The server asks the client to wait `N` seconds before the request is
    /// serviced; a fresh SID is used on reissue.
    Wait,
    /// The server asks the client to keep waiting on the same SID; more
    /// time is coming, not a new opportunity to reissue.
    WaitResp,
    /// A structured partial/compound response; see [`StatusKind`] for the
    /// sub-response this header frames.
    Status,
}

impl StatusCode {
    /// Decodes a raw 16-bit status value.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownStatus`] for any value not named above.
    pub fn from_u16(value: u16) -> Result<Self, WireError> {
        Ok(match value {
            0 => Self::Ok,
            4000 => Self::OkSoFar,
            4001 => Self::Attn,
            4002 => Self::AuthMore,
            4003 => Self::Error,
            4004 => Self::Redirect,
            4005 => Self::Wait,
            4006 => Self::WaitResp,
            4007 => Self::Status,
            other => return Err(WireError::UnknownStatus(other)),
        })
    }

    /// The raw wire value for this status.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::OkSoFar => 4000,
            Self::Attn => 4001,
            Self::AuthMore => 4002,
            Self::Error => 4003,
            Self::Redirect => 4004,
            Self::Wait => 4005,
            Self::WaitResp => 4006,
            Self::Status => 4007,
        }
    }

    /// Whether this status can carry more chunks of the same logical
    /// answer (`oksofar`, or a `status` reply tagged
    /// [`StatusKind::PartialResult`]).
    #[must_use]
    pub const fn is_partial(self) -> bool {
        matches!(self, Self::OkSoFar)
    }

    /// Whether this status is one of the transient/retryable kinds the
    /// `MsgHandler` resolves internally without surfacing an event to the
    /// caller (`wait`, `waitresp`, `authmore`, `redirect`).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Wait | Self::WaitResp | Self::AuthMore | Self::Redirect
        )
    }
}

/// Sub-response kind carried inside a [`StatusCode::Status`] reply. Unlike
/// the legacy statuses, a `status` reply's header differs in shape (it
/// carries a compact body length and this sub-code instead of the regular
/// `dlen`), which is why the codec special-cases it (see the error
/// taxonomy in the specification's error-handling section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StatusKind {
    /// A chunk of a larger answer, with more to come.
    PartialResult,
    /// A checksum computation/verification result.
    ChecksumResp,
    /// A byte-count progress report (e.g. mid-`pgwrite`).
    BytesExchanged,
}

impl StatusKind {
    /// Decodes a raw 16-bit sub-code value.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownStatusKind`] for any value not named
    /// above.
    pub fn from_u16(value: u16) -> Result<Self, WireError> {
        Ok(match value {
            0 => Self::PartialResult,
            1 => Self::ChecksumResp,
            2 => Self::BytesExchanged,
            other => return Err(WireError::UnknownStatusKind(other)),
        })
    }

    /// The raw wire value for this sub-code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::PartialResult => 0,
            Self::ChecksumResp => 1,
            Self::BytesExchanged => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            StatusCode::Ok,
            StatusCode::OkSoFar,
            StatusCode::Attn,
            StatusCode::AuthMore,
            StatusCode::Error,
            StatusCode::Redirect,
            StatusCode::Wait,
            StatusCode::WaitResp,
            StatusCode::Status,
        ] {
            assert_eq!(StatusCode::from_u16(status.as_u16()).unwrap(), status);
        }
    }

    #[test]
    fn transient_classification() {
        assert!(StatusCode::Wait.is_transient());
        assert!(StatusCode::WaitResp.is_transient());
        assert!(StatusCode::AuthMore.is_transient());
        assert!(StatusCode::Redirect.is_transient());
        assert!(!StatusCode::Ok.is_transient());
        assert!(!StatusCode::Error.is_transient());
    }

    #[test]
    fn partial_classification() {
        assert!(StatusCode::OkSoFar.is_partial());
        assert!(!StatusCode::Ok.is_partial());
    }

    #[test]
    fn status_kind_round_trip() {
        for kind in [
            StatusKind::PartialResult,
            StatusKind::ChecksumResp,
            StatusKind::BytesExchanged,
        ] {
            assert_eq!(StatusKind::from_u16(kind.as_u16()).unwrap(), kind);
        }
    }
}
