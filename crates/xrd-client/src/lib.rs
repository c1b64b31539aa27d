#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Public `File`/`FileSystem` API surface for talking to an XRootD server.
//!
//! ## Overview
//!
//! [`url::Url`] parses `root://host[:port]/path?opaque` endpoints down to
//! the `host:port` key ([`url::Url::host_id`]) channels and caches are
//! indexed under. [`filesystem::FileSystem`] is the path- and
//! server-scoped half of the API (`locate`, `stat`, `dirlist`, `mkdir`,
//! `rm`, `mv`, `chmod`, metadata queries, ...); [`file::File`] is an open
//! handle on one file (`read`, `read_v`, `pgread`, `write`, `truncate`,
//! `close`). [`cache_source`] lets an open `File` stand in as the live
//! upstream a block cache falls back to on a miss, wiring this crate to
//! `xrd-cache`.
//!
//! Every operation is native `async fn`; [`sync_api`] backs the `*_sync`
//! siblings every method has for callers outside an async context.
//!
//! ## Design
//!
//! [`adapter::MsgHandlerAdapter`] is the seam: it implements
//! `xrd_stream::RequestHandler` and drives a transport-free
//! `xrd_msghandler::MsgHandler` through redirects, waits, and partial
//! responses, resubmitting through a shared `xrd_postmaster::PostMaster`
//! as each `Action` demands. [`request::submit_request`] is the one path
//! every public method funnels through to build that adapter, submit it,
//! and await its terminal outcome on a one-shot channel.
//!
//! ## Errors
//!
//! [`error::ClientError`] is the taxonomy every fallible call in this
//! crate resolves to; [`error::XrdStatus`] is the `(status, host-list)`
//! pair a successful call resolves to alongside its response body.

pub mod adapter;
pub mod cache_source;
pub mod error;
pub mod file;
pub mod filesystem;
mod request;
pub mod sync_api;
pub mod url;

pub use cache_source::XrdUpstream;
pub use error::{ClientError, StatusClass, XrdStatus};
pub use file::File;
pub use filesystem::FileSystem;
pub use url::Url;
