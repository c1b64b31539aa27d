#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Channel and Post Master: the process-wide `hostId -> Channel` map and
//! the connect/disconnect policies that operate on it.
//!
//! ## Overview
//!
//! [`channel::Channel`] is a thin, ref-counted wrapper around one
//! [`xrd_stream::Stream`] plus the list of connect/disconnect handlers a
//! caller has registered against that endpoint. [`postmaster::PostMaster`]
//! is the map from `hostId` (`host:port`) to `Channel` that every public
//! API call goes through: a `Send` either finds an existing channel or
//! creates one, a `ForceDisconnect` decrements a reference and tears the
//! channel down once the last one is released.
//!
//! ## Design
//!
//! Ownership here deliberately avoids a reference-counted graph between
//! `Channel` and `Stream` — a `Channel` owns its `Stream` outright via a
//! plain `Arc`, and the only thing actually ref-counted is the `Channel`
//! itself, per the specification's design note that only the Channel
//! needs true ref counting. The map is guarded by one `parking_lot::Mutex`
//! (small critical sections: insert, lookup, remove); ref-count updates on
//! an already-looked-up `Channel` are lock-free atomics.
//!
//! ## Errors
//!
//! [`postmaster::PostMasterError`] wraps [`xrd_stream::StreamError`] and
//! adds the channel-not-found case specific to this layer.

pub mod channel;
pub mod postmaster;

pub use channel::{Channel, ChannelEventHandler};
pub use postmaster::{PostMaster, PostMasterError, QueryField, QueryValue};
