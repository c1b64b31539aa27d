#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Non-blocking, optionally-TLS socket and readiness poller for the
//! XRootD client runtime.
//!
//! ## Overview
//!
//! [`Socket`] is one TCP connection to a server endpoint, async end to
//! end and optionally wrapped in TLS. [`Poller`] is a registration table
//! that watches raw [`tokio::net::TcpStream`] handles for readiness and
//! hands events to a [`SocketHandler`] without ever running the
//! handler's work inline on its own dispatch task.
//!
//! ## Design
//!
//! Reaching for `tokio`'s reactor rather than hand-rolling `epoll` means
//! `Socket`'s `Connect`/`Send`/`Recv` already behave the way the
//! non-blocking contract wants: the `Poller` exists for the one thing
//! `tokio` can't infer on its own — which direction a TLS renegotiation
//! needs next ([`Socket::map_event`]) — and for components (like the
//! stream layer) that want one shared dispatch point across many
//! sockets rather than a `tokio::select!` per call site.
//!
//! ## Errors
//!
//! [`SocketError`] covers connect/handshake/I/O failures.

mod poller;
mod socket;
mod tls;

pub use poller::{PollEvent, Poller, SocketHandler, SocketId};
pub use socket::{Direction, Socket, SocketError, SocketOutcome};
pub use tls::default_client_config;
