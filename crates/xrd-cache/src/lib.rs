#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Disk-backed block cache for file reads.
//!
//! ## Overview
//!
//! A cached file is represented on disk by a data file plus a `.cinfo`
//! sidecar ([`info::Info`]) recording which fixed-size blocks are fully
//! written. [`file::File`] owns the in-memory state for one open cache
//! file — a map of in-flight [`block::Block`]s and the `.cinfo` bitmap —
//! and implements the classify/issue/wait read algorithm that turns a
//! byte-range request into direct RAM hits, in-flight joins, and fresh
//! upstream fetches. [`cacheio::CacheIo`] is the seam between a `File`
//! and wherever its bytes actually come from, with two implementations:
//! [`cacheio::IoEntireFile`] (one upstream object per cache file) and
//! [`cacheio::IoFileBlock`] (one upstream object per fixed-size chunk,
//! named `<path>___<blocksize>_<offset>`, each with its own sidecar).
//! [`purge::Purge`] is the interval-driven background task that keeps
//! total cache usage under the configured high-water mark.
//!
//! ## Design
//!
//! One [`tokio::sync::Mutex`] guards a `File`'s block map and `.cinfo`
//! state; one [`tokio::sync::Notify`] plays the role of the download
//! condvar that C++ XRootD's cache uses to wake readers blocked on a
//! block another reader already started fetching. Sidecar I/O goes
//! through [`fs2::FileExt`] advisory locks since `.cinfo` files can be
//! shared across processes on the same host. Block indices are sparse
//! (only blocks that have been touched are ever allocated), so the block
//! map is a `rustc_hash::FxHashMap<usize, Block>` rather than a `Vec`
//! sized to the whole file.
//!
//! ## Errors
//!
//! [`CacheError`] covers sidecar corruption, advisory-lock/I/O failure,
//! and upstream fetch failure; it wraps [`std::io::Error`] directly for
//! the common filesystem-failure case rather than re-deriving every
//! `ErrorKind`.

pub mod block;
pub mod cacheio;
pub mod file;
pub mod info;
pub mod purge;

pub use block::{Block, BlockState};
pub use cacheio::{CacheIo, IoEntireFile, IoFileBlock};
pub use file::{File, ReadVChunk};
pub use info::{AStat, Info};
pub use purge::{Purge, PurgeConfig};

/// Errors raised by the cache subsystem.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem I/O failed (sidecar read/write, data file read/write,
    /// advisory lock acquisition).
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A `.cinfo` sidecar's header or body didn't parse.
    #[error("corrupt .cinfo sidecar: {0}")]
    CorruptSidecar(String),

    /// The upstream fetch that was supposed to fill a block failed.
    #[error("upstream fetch failed for block {block_index}: {message}")]
    UpstreamFailed {
        /// Index of the block that failed to fill.
        block_index: usize,
        /// Human-readable failure detail from the upstream source.
        message: String,
    },

    /// A read was requested past the end of the file.
    #[error("read range {offset}..{end} is out of bounds for a {file_size}-byte file")]
    OutOfRange {
        /// Start of the requested range.
        offset: u64,
        /// End (exclusive) of the requested range.
        end: u64,
        /// Total size of the cached file.
        file_size: u64,
    },

    /// The file was closed while a read was still in flight.
    #[error("cache file closed while a read was pending")]
    Closed,

    /// A spawned task (sidecar persistence, a `read_v` fan-out chunk)
    /// panicked or was cancelled before it could complete.
    #[error("background cache task did not complete: {0}")]
    TaskPanicked(String),
}
