use bytes::{Buf, BufMut, BytesMut};

use crate::header::StreamId;
use crate::WireError;

/// Maximum body size this codec accepts, in bytes. The real protocol
/// allows larger paged transfers, but nothing in this client ever needs a
/// single frame above 16 MiB; anything larger is almost certainly a
/// corrupted length field.
pub const MAX_BODY_LEN: u32 = 16 * 1024 * 1024;

/// An owned wire frame: a header's worth of metadata plus the raw body
/// bytes that followed it, tagged with the session id it travels under.
///
/// `Message` is deliberately dumb about the body's internal shape —
/// opcode-specific decoding lives in [`crate::body`]. What it owns is the
/// framing concerns every frame shares: which stream it's for, which
/// session it was stamped with, and a buffer that can be grown in place
/// as more bytes arrive off the socket.
#[derive(Debug, Clone)]
pub struct Message {
    stream_id: StreamId,
    session_id: u64,
    buf: BytesMut,
}

impl Message {
    /// Starts an empty message for `stream_id`, stamped with `session_id`.
    #[must_use]
    pub fn new(stream_id: StreamId, session_id: u64) -> Self {
        Self {
            stream_id,
            session_id,
            buf: BytesMut::new(),
        }
    }

    /// Builds a message from an already-assembled body buffer.
    #[must_use]
    pub fn from_body(stream_id: StreamId, session_id: u64, body: BytesMut) -> Self {
        Self {
            stream_id,
            session_id,
            buf: body,
        }
    }

    /// The stream id this frame is addressed to or was received on.
    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The session id this frame was stamped with. Sessions increase
    /// monotonically for the lifetime of a TCP connection; a frame whose
    /// session id doesn't match the stream's current session is stale and
    /// must be dropped by the caller.
    #[must_use]
    pub const fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Number of body bytes currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends bytes read off the wire to the body buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Reserves room for at least `additional` more bytes.
    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }

    /// Borrows the accumulated body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the message, returning its body buffer.
    #[must_use]
    pub fn into_body(self) -> BytesMut {
        self.buf
    }

    /// Validates a declared body length against [`MAX_BODY_LEN`] before a
    /// caller commits to reading that many bytes off the socket.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::BodyTooLarge`] if `declared` exceeds the limit.
    pub fn check_declared_len(declared: u32) -> Result<(), WireError> {
        if declared > MAX_BODY_LEN {
            return Err(WireError::BodyTooLarge {
                declared,
                max: MAX_BODY_LEN,
            });
        }
        Ok(())
    }

    /// A short, log-safe description of this message: stream id, session
    /// id, and body length, with the body content itself never included.
    /// Bodies can carry credentials (`auth` continuation blobs, signed
    /// `sigver` payloads) so this is the only representation that's safe
    /// to pass to a `tracing` call at any verbosity.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "stream={} session={} len={}",
            self.stream_id.0,
            self.session_id,
            self.buf.len()
        )
    }

    /// Splits off and returns the first `count` bytes of the body, leaving
    /// the rest in place. Used by readers that consume a fixed-size header
    /// before handing the remainder to a body decoder.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Truncated`] if fewer than `count` bytes remain.
    pub fn split_prefix(&mut self, count: usize) -> Result<BytesMut, WireError> {
        if self.buf.len() < count {
            return Err(WireError::Truncated {
                expected: count,
                actual: self.buf.len(),
            });
        }
        Ok(self.buf.split_to(count))
    }

    /// Reads a big-endian `u32` from the front of the body, advancing past
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Truncated`] if fewer than four bytes remain.
    pub fn get_u32(&mut self) -> Result<u32, WireError> {
        if self.buf.len() < 4 {
            return Err(WireError::Truncated {
                expected: 4,
                actual: self.buf.len(),
            });
        }
        Ok(self.buf.get_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_and_len() {
        let mut msg = Message::new(StreamId(1), 42);
        msg.extend(&[1, 2, 3, 4]);
        assert_eq!(msg.len(), 4);
        assert!(!msg.is_empty());
    }

    #[test]
    fn describe_omits_body_content() {
        let mut msg = Message::new(StreamId(5), 7);
        msg.extend(b"super-secret-token");
        let description = msg.describe();
        assert!(!description.contains("super-secret-token"));
        assert!(description.contains("stream=5"));
        assert!(description.contains("session=7"));
    }

    #[test]
    fn split_prefix_fails_when_short() {
        let mut msg = Message::new(StreamId(0), 0);
        msg.extend(&[1, 2]);
        assert!(matches!(
            msg.split_prefix(4),
            Err(WireError::Truncated {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn split_prefix_takes_front_bytes() {
        let mut msg = Message::new(StreamId(0), 0);
        msg.extend(&[1, 2, 3, 4, 5]);
        let prefix = msg.split_prefix(2).unwrap();
        assert_eq!(&prefix[..], &[1, 2]);
        assert_eq!(msg.body(), &[3, 4, 5]);
    }

    #[test]
    fn get_u32_reads_big_endian() {
        let mut msg = Message::new(StreamId(0), 0);
        msg.extend(&[0, 0, 1, 0]);
        assert_eq!(msg.get_u32().unwrap(), 256);
        assert!(msg.is_empty());
    }

    #[test]
    fn check_declared_len_rejects_oversized() {
        assert!(Message::check_declared_len(MAX_BODY_LEN + 1).is_err());
        assert!(Message::check_declared_len(MAX_BODY_LEN).is_ok());
    }
}
