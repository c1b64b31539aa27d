//! Response framing: turning raw bytes off the wire into a
//! [`xrd_wire::ResponseHeader`] plus a declared body length.
//!
//! The specification calls out that a `status`-coded reply's header
//! differs in shape from the legacy one (§7); [`xrd_wire::ResponseHeader`]
//! already encodes that as a sum type, so this module's job is purely
//! "do we have enough bytes yet" bookkeeping on top of it.

use xrd_wire::ResponseHeader;

use crate::TransportError;

/// A successfully parsed response header plus how many more body bytes
/// the caller needs to read before the frame is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFrame {
    /// The decoded header.
    pub header: ResponseHeader,
    /// Body bytes still to read, per the header's declared length.
    pub body_len: u32,
}

/// Outcome of attempting to parse a header from the bytes accumulated so
/// far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Fewer than [`xrd_wire::ResponseHeader::LEN`] bytes are available;
    /// the caller should read more and retry.
    NeedMoreBytes {
        /// Additional bytes needed before a header can be parsed.
        additional: usize,
    },
    /// A header was parsed.
    Header(ResponseFrame),
}

/// Attempts to parse a response header from the front of `buf`.
///
/// # Errors
///
/// Returns [`TransportError::Wire`] if `buf` has enough bytes for a
/// header but they don't decode to a recognized status.
pub fn get_header(buf: &[u8]) -> Result<FrameOutcome, TransportError> {
    if buf.len() < ResponseHeader::LEN {
        return Ok(FrameOutcome::NeedMoreBytes {
            additional: ResponseHeader::LEN - buf.len(),
        });
    }
    let mut header_bytes = [0u8; ResponseHeader::LEN];
    header_bytes.copy_from_slice(&buf[..ResponseHeader::LEN]);
    let header = ResponseHeader::decode(&header_bytes)?;
    let body_len = header.dlen();
    Ok(FrameOutcome::Header(ResponseFrame { header, body_len }))
}

/// Whether `body_buf` already holds the full body declared by `frame`.
#[must_use]
pub fn has_full_body(frame: ResponseFrame, body_buf: &[u8]) -> bool {
    body_buf.len() as u64 >= u64::from(frame.body_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrd_wire::{StatusCode, StreamId};

    #[test]
    fn short_buffer_asks_for_more() {
        let outcome = get_header(&[1, 2, 3]).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::NeedMoreBytes {
                additional: ResponseHeader::LEN - 3
            }
        );
    }

    #[test]
    fn full_legacy_header_parses() {
        let header = ResponseHeader::Legacy {
            stream_id: StreamId(5),
            status: StatusCode::Ok,
            dlen: 10,
        };
        let mut buf = [0u8; ResponseHeader::LEN];
        header.encode(&mut buf);
        let outcome = get_header(&buf).unwrap();
        match outcome {
            FrameOutcome::Header(frame) => {
                assert_eq!(frame.header, header);
                assert_eq!(frame.body_len, 10);
            }
            FrameOutcome::NeedMoreBytes { .. } => panic!("expected a parsed header"),
        }
    }

    #[test]
    fn has_full_body_checks_length() {
        let header = ResponseHeader::Legacy {
            stream_id: StreamId(1),
            status: StatusCode::Ok,
            dlen: 4,
        };
        let frame = ResponseFrame {
            header,
            body_len: 4,
        };
        assert!(!has_full_body(frame, &[1, 2, 3]));
        assert!(has_full_body(frame, &[1, 2, 3, 4]));
    }
}
