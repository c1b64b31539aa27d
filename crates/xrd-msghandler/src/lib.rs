#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Per-request state machine driving one request through every possible
//! server reply.
//!
//! ## Overview
//!
//! [`handler::MsgHandler`] implements the state machine named in the
//! specification: `Issued -> AwaitHdr -> {Done, AwaitMore, StreamRaw,
//! Snoozing, RunAuth, Redirecting} -> Failed`, encoded as a sum type with
//! an exhaustive `match` over `(state, event)` rather than a loosely
//! coupled bag of flags. [`state::Event`] is everything that can happen
//! to a request in flight; [`state::Action`] is everything the owning
//! caller must do in response — resend at a new stream id, schedule a
//! wake-up, switch to raw streaming, or deliver a terminal [`error::Outcome`].
//!
//! ## Design
//!
//! This crate depends only on [`xrd_wire`] for the frame shapes it reads
//! and writes and [`xrd_checksum`] for the end-to-end digest it can
//! optionally verify; it has no dependency on the transport stack
//! (`xrd-stream`, `xrd-transport`). Per `xrd-stream`'s own `RequestHandler`
//! trait, the thin adapter that feeds this state machine its events and
//! carries out its actions against a live socket belongs to whichever
//! crate wires the two together — in this workspace, `xrd-client` — which
//! keeps this crate testable as a pure function of `(state, event) ->
//! (state, action)` with no I/O of its own.
//!
//! Redirects resolve the specification's open question explicitly: any
//! `oksofar`/`PartialResult` chunks buffered before a redirect arrives are
//! discarded, and the full originally-requested range is re-requested at
//! the new endpoint rather than resumed mid-stream.
//!
//! ## Errors
//!
//! [`error::HandlerError`] is the closed set of ways a request can
//! terminate; [`error::Outcome`] wraps it alongside the success case.

pub mod checksum;
pub mod error;
pub mod handler;
pub mod state;

pub use error::{HandlerError, Outcome};
pub use handler::{HandlerConfig, MsgHandler};
pub use state::{Action, Event, State};
