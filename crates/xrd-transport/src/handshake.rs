//! Login/protocol/bind/auth handshake state machine.
//!
//! Mirrors the original `XrdClAsyncSocketHandler`'s `HandShakeData`: a
//! small state carried across however many partial reads/writes the
//! initial connect takes, since a non-blocking socket may need several
//! `send`/`recv` round trips before the exchange completes.

use crate::TransportError;

/// Which leg of the handshake a [`HandShakeData`] is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStep {
    /// Nothing sent yet; the next action is to emit the initial protocol
    /// negotiation request.
    Initial,
    /// The `kXR_protocol` request has been sent; awaiting its reply.
    AwaitProtocolReply,
    /// The `kXR_login` request has been sent; awaiting its reply.
    AwaitLoginReply,
    /// The server asked for more authentication; a `kXR_auth` round trip
    /// is in progress.
    AwaitAuthReply,
    /// A `kXR_bind` request (growing the stream from 1 to N sub-streams)
    /// has been sent; awaiting its reply.
    AwaitBindReply,
    /// The handshake is fully established.
    Established,
}

/// State threaded through repeated [`crate::handshake::drive`] calls for
/// one connecting sub-stream.
#[derive(Debug, Clone)]
pub struct HandShakeData {
    /// Current leg of the exchange.
    pub step: HandshakeStep,
    /// Protocol version the server reported, once known.
    pub server_protocol_version: Option<u32>,
    /// Opaque security token carried across an `authmore` round trip.
    pub sec_token: Option<Vec<u8>>,
    /// Session id this connect is establishing a bind for, when this
    /// handshake is for a peer sub-stream rather than sub-stream 0.
    pub bind_session_id: Option<u64>,
    /// Whether this handshake is for sub-stream 0 (drives the full login
    /// sequence) or a peer sub-stream (drives only the `kXR_bind` leg).
    pub is_control_stream: bool,
}

impl HandShakeData {
    /// Starts a fresh handshake for the control sub-stream (sub-stream
    /// 0), which must complete the full protocol/login/auth sequence.
    #[must_use]
    pub fn for_control_stream() -> Self {
        Self {
            step: HandshakeStep::Initial,
            server_protocol_version: None,
            sec_token: None,
            bind_session_id: None,
            is_control_stream: true,
        }
    }

    /// Starts a fresh handshake for a peer sub-stream being bound to an
    /// already-established session.
    #[must_use]
    pub fn for_bound_stream(session_id: u64) -> Self {
        Self {
            step: HandshakeStep::AwaitBindReply,
            server_protocol_version: None,
            sec_token: None,
            bind_session_id: Some(session_id),
            is_control_stream: false,
        }
    }
}

/// The result of advancing a handshake by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// More bytes must be sent before a reply can be expected.
    SendAndAwait {
        /// Bytes to write to the socket.
        to_send: Vec<u8>,
    },
    /// Not enough bytes have arrived yet to parse this step's reply;
    /// retry once more data is available.
    NeedMoreData,
    /// The server asked for another authentication round trip; `to_send`
    /// carries the next `kXR_auth` continuation.
    ContinueAuth {
        /// Bytes to write to the socket.
        to_send: Vec<u8>,
    },
    /// The handshake is fully established.
    Established {
        /// Negotiated protocol version.
        protocol_version: u32,
    },
}

/// Advances `state` given `received` bytes (empty on the very first call
/// for this sub-stream, which produces the initial outbound request).
///
/// # Errors
///
/// Returns [`TransportError::HandshakeFailed`] if `received` can't be
/// interpreted at the current step, or [`TransportError::LoginRejected`]
/// if the server explicitly rejected the login/auth exchange.
pub fn drive(
    state: &mut HandShakeData,
    received: &[u8],
) -> Result<HandshakeOutcome, TransportError> {
    match state.step {
        HandshakeStep::Initial => {
            if !state.is_control_stream {
                // Peer sub-streams skip straight to bind.
                state.step = HandshakeStep::AwaitBindReply;
                return Ok(HandshakeOutcome::SendAndAwait {
                    to_send: encode_bind_request(state.bind_session_id.unwrap_or_default()),
                });
            }
            state.step = HandshakeStep::AwaitProtocolReply;
            Ok(HandshakeOutcome::SendAndAwait {
                to_send: encode_protocol_request(),
            })
        }
        HandshakeStep::AwaitProtocolReply => {
            if received.len() < 4 {
                return Ok(HandshakeOutcome::NeedMoreData);
            }
            let version = u32::from_be_bytes([received[0], received[1], received[2], received[3]]);
            state.server_protocol_version = Some(version);
            state.step = HandshakeStep::AwaitLoginReply;
            Ok(HandshakeOutcome::SendAndAwait {
                to_send: encode_login_request(),
            })
        }
        HandshakeStep::AwaitLoginReply => {
            if received.is_empty() {
                return Ok(HandshakeOutcome::NeedMoreData);
            }
            match received[0] {
                LOGIN_REPLY_OK => {
                    state.step = HandshakeStep::Established;
                    Ok(HandshakeOutcome::Established {
                        protocol_version: state.server_protocol_version.unwrap_or_default(),
                    })
                }
                LOGIN_REPLY_AUTHMORE => {
                    state.step = HandshakeStep::AwaitAuthReply;
                    state.sec_token = Some(received[1..].to_vec());
                    Ok(HandshakeOutcome::ContinueAuth {
                        to_send: encode_auth_continuation(&received[1..]),
                    })
                }
                LOGIN_REPLY_ERROR => Err(TransportError::LoginRejected(
                    String::from_utf8_lossy(&received[1..]).into_owned(),
                )),
                other => Err(TransportError::HandshakeFailed {
                    step: state.step,
                    reason: format!("unrecognized login reply tag {other}"),
                }),
            }
        }
        HandshakeStep::AwaitAuthReply => {
            if received.is_empty() {
                return Ok(HandshakeOutcome::NeedMoreData);
            }
            match received[0] {
                LOGIN_REPLY_OK => {
                    state.step = HandshakeStep::Established;
                    state.sec_token = None;
                    Ok(HandshakeOutcome::Established {
                        protocol_version: state.server_protocol_version.unwrap_or_default(),
                    })
                }
                LOGIN_REPLY_AUTHMORE => {
                    state.sec_token = Some(received[1..].to_vec());
                    Ok(HandshakeOutcome::ContinueAuth {
                        to_send: encode_auth_continuation(&received[1..]),
                    })
                }
                LOGIN_REPLY_ERROR => Err(TransportError::LoginRejected(
                    String::from_utf8_lossy(&received[1..]).into_owned(),
                )),
                other => Err(TransportError::HandshakeFailed {
                    step: state.step,
                    reason: format!("unrecognized auth reply tag {other}"),
                }),
            }
        }
        HandshakeStep::AwaitBindReply => {
            if received.is_empty() {
                return Ok(HandshakeOutcome::NeedMoreData);
            }
            if received[0] == LOGIN_REPLY_OK {
                state.step = HandshakeStep::Established;
                Ok(HandshakeOutcome::Established {
                    protocol_version: state.server_protocol_version.unwrap_or_default(),
                })
            } else {
                Err(TransportError::HandshakeFailed {
                    step: state.step,
                    reason: "bind request rejected".to_string(),
                })
            }
        }
        HandshakeStep::Established => Ok(HandshakeOutcome::Established {
            protocol_version: state.server_protocol_version.unwrap_or_default(),
        }),
    }
}

const LOGIN_REPLY_OK: u8 = 0;
const LOGIN_REPLY_AUTHMORE: u8 = 1;
const LOGIN_REPLY_ERROR: u8 = 2;

fn encode_protocol_request() -> Vec<u8> {
    xrd_wire::Opcode::Protocol.as_u16().to_be_bytes().to_vec()
}

fn encode_login_request() -> Vec<u8> {
    xrd_wire::Opcode::Auth.as_u16().to_be_bytes().to_vec()
}

fn encode_auth_continuation(token: &[u8]) -> Vec<u8> {
    let mut out = xrd_wire::Opcode::Auth.as_u16().to_be_bytes().to_vec();
    out.extend_from_slice(token);
    out
}

fn encode_bind_request(session_id: u64) -> Vec<u8> {
    let mut out = xrd_wire::Opcode::Bind.as_u16().to_be_bytes().to_vec();
    out.extend_from_slice(&session_id.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_stream_starts_with_protocol_request() {
        let mut state = HandShakeData::for_control_stream();
        let outcome = drive(&mut state, &[]).unwrap();
        assert!(matches!(outcome, HandshakeOutcome::SendAndAwait { .. }));
        assert_eq!(state.step, HandshakeStep::AwaitProtocolReply);
    }

    #[test]
    fn full_login_sequence_without_auth() {
        let mut state = HandShakeData::for_control_stream();
        drive(&mut state, &[]).unwrap();
        drive(&mut state, &9u32.to_be_bytes()).unwrap();
        assert_eq!(state.step, HandshakeStep::AwaitLoginReply);
        let outcome = drive(&mut state, &[LOGIN_REPLY_OK]).unwrap();
        assert!(matches!(
            outcome,
            HandshakeOutcome::Established { protocol_version: 9 }
        ));
        assert_eq!(state.step, HandshakeStep::Established);
    }

    #[test]
    fn authmore_round_trip_then_established() {
        let mut state = HandShakeData::for_control_stream();
        drive(&mut state, &[]).unwrap();
        drive(&mut state, &1u32.to_be_bytes()).unwrap();
        let outcome = drive(&mut state, &[LOGIN_REPLY_AUTHMORE, b'x', b'y']).unwrap();
        assert!(matches!(outcome, HandshakeOutcome::ContinueAuth { .. }));
        assert_eq!(state.step, HandshakeStep::AwaitAuthReply);
        let outcome = drive(&mut state, &[LOGIN_REPLY_OK]).unwrap();
        assert!(matches!(outcome, HandshakeOutcome::Established { .. }));
    }

    #[test]
    fn login_rejection_surfaces_error() {
        let mut state = HandShakeData::for_control_stream();
        drive(&mut state, &[]).unwrap();
        drive(&mut state, &1u32.to_be_bytes()).unwrap();
        let err = drive(&mut state, &[LOGIN_REPLY_ERROR, b'n', b'o']).unwrap_err();
        assert!(matches!(err, TransportError::LoginRejected(msg) if msg == "no"));
    }

    #[test]
    fn short_reply_requests_more_data() {
        let mut state = HandShakeData::for_control_stream();
        drive(&mut state, &[]).unwrap();
        let outcome = drive(&mut state, &[1, 2]).unwrap();
        assert_eq!(outcome, HandshakeOutcome::NeedMoreData);
    }

    #[test]
    fn peer_sub_stream_skips_straight_to_bind() {
        let mut state = HandShakeData::for_bound_stream(42);
        state.step = HandshakeStep::Initial;
        let outcome = drive(&mut state, &[]).unwrap();
        assert!(matches!(outcome, HandshakeOutcome::SendAndAwait { .. }));
        assert_eq!(state.step, HandshakeStep::AwaitBindReply);
        let outcome = drive(&mut state, &[LOGIN_REPLY_OK]).unwrap();
        assert!(matches!(outcome, HandshakeOutcome::Established { .. }));
    }
}
