//! The blocking half of the concurrency model: every `*_sync` method on
//! [`crate::filesystem::FileSystem`] and [`crate::file::File`] submits the
//! same async call its non-blocking sibling does and blocks the calling
//! thread until it resolves.
//!
//! A caller already inside a Tokio runtime is handed off to
//! `block_in_place` so it doesn't deadlock the worker it's running on; a
//! caller outside any runtime (a plain synchronous `main`) drives the call
//! on a lazily-started single-threaded fallback runtime private to this
//! crate.

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};

fn fallback_runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to start the sync-call fallback runtime")
    })
}

/// Blocks the current thread until `future` resolves.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    match Handle::try_current() {
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(future)),
        Err(_) => fallback_runtime().block_on(future),
    }
}
