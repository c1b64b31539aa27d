use crate::opcode::Opcode;
use crate::status::{StatusCode, StatusKind};
use crate::WireError;

/// A 2-byte stream id used to correlate a request with its response.
/// `0` is reserved to mean "any session" on a [`crate::message::Message`]
/// that hasn't been dispatched yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u16);

impl StreamId {
    /// The reserved "any session" id.
    pub const ANY: Self = Self(0);

    /// Big-endian wire bytes for this id.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Reads a stream id from its big-endian wire bytes.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }
}

const REQUEST_HEADER_LEN: usize = 24;
const RESPONSE_HEADER_LEN: usize = 8;

/// Request header: `(stream-id:2, opcode:2, opcode-specific:16, dlen:4)`,
/// all big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Stream id the response must echo back.
    pub stream_id: StreamId,
    /// Which operation this request performs.
    pub opcode: Opcode,
    /// Opcode-specific fixed fields (file handle, offset, flags, ...); the
    /// per-opcode layout is defined by [`crate::body`].
    pub opaque: [u8; 16],
    /// Length of the variable-length body that follows this header.
    pub dlen: u32,
}

impl RequestHeader {
    /// Size of the encoded header, in bytes.
    pub const LEN: usize = REQUEST_HEADER_LEN;

    /// Encodes the header into `out`, big-endian.
    pub fn encode(&self, out: &mut [u8; Self::LEN]) {
        out[0..2].copy_from_slice(&self.stream_id.to_be_bytes());
        out[2..4].copy_from_slice(&self.opcode.as_u16().to_be_bytes());
        out[4..20].copy_from_slice(&self.opaque);
        out[20..24].copy_from_slice(&self.dlen.to_be_bytes());
    }

    /// Decodes a header from exactly [`Self::LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownOpcode`] if the opcode field doesn't
    /// match a recognized request opcode.
    pub fn decode(bytes: &[u8; Self::LEN]) -> Result<Self, WireError> {
        let stream_id = StreamId::from_be_bytes([bytes[0], bytes[1]]);
        let opcode = Opcode::from_u16(u16::from_be_bytes([bytes[2], bytes[3]]))?;
        let mut opaque = [0u8; 16];
        opaque.copy_from_slice(&bytes[4..20]);
        let dlen = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        Ok(Self {
            stream_id,
            opcode,
            opaque,
            dlen,
        })
    }
}

/// Response header. The legacy shape is `(stream-id:2, status:2, dlen:4)`;
/// a `status`-coded reply instead carries a sub-response kind and a
/// compact length in the same eight bytes, per the error-handling
/// section's note that `status` headers differ from the legacy ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseHeader {
    /// The common case: any status other than [`StatusCode::Status`].
    Legacy {
        /// Stream id this response answers.
        stream_id: StreamId,
        /// The server-reported status.
        status: StatusCode,
        /// Length of the body that follows.
        dlen: u32,
    },
    /// A [`StatusCode::Status`] reply, framed with a sub-kind and a 16-bit
    /// length instead of the legacy 32-bit `dlen`.
    Status {
        /// Stream id this response answers.
        stream_id: StreamId,
        /// Which structured sub-response this is.
        kind: StatusKind,
        /// Length of the body that follows (status bodies are capped at
        /// 64 KiB by the wire format).
        dlen: u16,
    },
}

impl ResponseHeader {
    /// Size of the encoded header, in bytes.
    pub const LEN: usize = RESPONSE_HEADER_LEN;

    /// The stream id this response answers, regardless of variant.
    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        match self {
            Self::Legacy { stream_id, .. } | Self::Status { stream_id, .. } => *stream_id,
        }
    }

    /// Length of the body that follows this header, regardless of variant.
    #[must_use]
    pub const fn dlen(&self) -> u32 {
        match self {
            Self::Legacy { dlen, .. } => *dlen,
            Self::Status { dlen, .. } => *dlen as u32,
        }
    }

    /// Decodes a header from exactly [`Self::LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownStatus`] or [`WireError::UnknownStatusKind`]
    /// when the status/sub-code field isn't recognized.
    pub fn decode(bytes: &[u8; Self::LEN]) -> Result<Self, WireError> {
        let stream_id = StreamId::from_be_bytes([bytes[0], bytes[1]]);
        let raw_status = u16::from_be_bytes([bytes[2], bytes[3]]);
        let status = StatusCode::from_u16(raw_status)?;
        if status == StatusCode::Status {
            // kind is packed into the high byte of what would be dlen's
            // first half; the low 16 bits are the compact body length.
            let kind = StatusKind::from_u16(u16::from(bytes[4]))?;
            let dlen = u16::from_be_bytes([bytes[6], bytes[7]]);
            Ok(Self::Status {
                stream_id,
                kind,
                dlen,
            })
        } else {
            let dlen = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            Ok(Self::Legacy {
                stream_id,
                status,
                dlen,
            })
        }
    }

    /// Encodes the header into `out`, big-endian.
    pub fn encode(&self, out: &mut [u8; Self::LEN]) {
        match self {
            Self::Legacy {
                stream_id,
                status,
                dlen,
            } => {
                out[0..2].copy_from_slice(&stream_id.to_be_bytes());
                out[2..4].copy_from_slice(&status.as_u16().to_be_bytes());
                out[4..8].copy_from_slice(&dlen.to_be_bytes());
            }
            Self::Status {
                stream_id,
                kind,
                dlen,
            } => {
                out[0..2].copy_from_slice(&stream_id.to_be_bytes());
                out[2..4].copy_from_slice(&StatusCode::Status.as_u16().to_be_bytes());
                out[4] = kind.as_u16() as u8;
                out[5] = 0;
                out[6..8].copy_from_slice(&dlen.to_be_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_round_trip() {
        let header = RequestHeader {
            stream_id: StreamId(7),
            opcode: Opcode::Read,
            opaque: [9u8; 16],
            dlen: 4096,
        };
        let mut buf = [0u8; RequestHeader::LEN];
        header.encode(&mut buf);
        assert_eq!(RequestHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn legacy_response_header_round_trip() {
        let header = ResponseHeader::Legacy {
            stream_id: StreamId(3),
            status: StatusCode::Ok,
            dlen: 128,
        };
        let mut buf = [0u8; ResponseHeader::LEN];
        header.encode(&mut buf);
        assert_eq!(ResponseHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn status_response_header_round_trip() {
        let header = ResponseHeader::Status {
            stream_id: StreamId(99),
            kind: StatusKind::PartialResult,
            dlen: 64,
        };
        let mut buf = [0u8; ResponseHeader::LEN];
        header.encode(&mut buf);
        assert_eq!(ResponseHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn dlen_accessor_matches_variant() {
        let legacy = ResponseHeader::Legacy {
            stream_id: StreamId(1),
            status: StatusCode::Error,
            dlen: 50,
        };
        assert_eq!(legacy.dlen(), 50);

        let status = ResponseHeader::Status {
            stream_id: StreamId(1),
            kind: StatusKind::ChecksumResp,
            dlen: 16,
        };
        assert_eq!(status.dlen(), 16);
    }
}
