#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `xrd-env` is a process-wide typed key/value store, the Rust counterpart
//! of `XrdCl::Env`. Two independent namespaces exist — strings and
//! integers — and every entry tracks whether it was imported from the
//! shell environment. A shell-imported entry wins over any later `Put`:
//! the whole point of the store is that operators can override a
//! compiled-in default without recompiling, and a later `Put` from inside
//! the process must not silently clobber that choice.
//!
//! # Design
//!
//! [`Env`] is a plain, lockable container; [`DefaultEnv`] wraps a single
//! process-wide instance behind a [`std::sync::OnceLock`], seeded with the
//! defaults named in the specification's environment table (connection
//! window, retry counts, stream error window, sub-streams per channel,
//! network stack preference, timeout resolution, copy retry policy).
//!
//! # Errors
//!
//! [`EnvError`] reports a shell value that failed to parse as the
//! requested type. Unlike the original C++ `Env::ImportInt`, which
//! silently treats an unparsable shell value as "not present", this crate
//! surfaces the failure so callers can decide whether to fall back or
//! abort.
//!
//! # Examples
//!
//! ```
//! use xrd_env::Env;
//!
//! let env = Env::new();
//! assert!(env.put_int("ConnectionWindow", 120));
//! assert_eq!(env.get_int("ConnectionWindow"), Some(120));
//! ```

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

/// Recognized environment keys, matching the shell-overridable settings in
/// the specification's external-interfaces table.
pub mod keys {
    /// `XRD_CONNECTIONWINDOW` — per-address connect timeout, in seconds.
    pub const CONNECTION_WINDOW: &str = "ConnectionWindow";
    /// `XRD_CONNECTIONRETRY` — reconnect attempts within a stream error window.
    pub const CONNECTION_RETRY: &str = "ConnectionRetry";
    /// `XRD_STREAMERRORWINDOW` — window (seconds) the reconnect policy resets on.
    pub const STREAM_ERROR_WINDOW: &str = "StreamErrorWindow";
    /// `XRD_SUBSTREAMSPERCHANNEL` — number of sub-streams negotiated per channel.
    pub const SUB_STREAMS_PER_CHANNEL: &str = "SubStreamsPerChannel";
    /// `XRD_NETWORKSTACK` — one of `IPAuto`, `IPAll`, `IPv4`, `IPv6`.
    pub const NETWORK_STACK: &str = "NetworkStack";
    /// `XRD_TIMEOUTRESOLUTION` — granularity (seconds) of the task manager's wheel.
    pub const TIMEOUT_RESOLUTION: &str = "TimeoutResolution";
    /// `XRD_CPRETRY` — copy-layer retry count.
    pub const CP_RETRY: &str = "CpRetry";
    /// `XRD_CPRETRYPOLICY` — one of `continue`, `force`.
    pub const CP_RETRY_POLICY: &str = "CpRetryPolicy";
    /// `XRD_ZIPMTLNCKSUM` — whether to checksum the mtln entry inside a zip TPC.
    pub const ZIP_MTLN_CKSUM: &str = "ZipMtlnCksum";
    /// Cache block size, in bytes. Not part of upstream `XRD_*` but needed
    /// by `xrd-cache`; kept here so the cache has one config source.
    pub const CACHE_BLOCK_SIZE: &str = "CacheBlockSize";
    /// Disk usage high water mark, in bytes, that triggers a purge.
    pub const CACHE_DISK_HWM: &str = "CacheDiskHighWaterMark";
    /// Disk usage low water mark, in bytes, a purge drops usage to.
    pub const CACHE_DISK_LWM: &str = "CacheDiskLowWaterMark";
}

/// Errors raised while importing a value from the shell environment.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// The named shell variable was present but could not be parsed as an
    /// integer.
    #[error("shell variable {shell_key:?} = {value:?} is not a valid integer")]
    ParseInt {
        /// The shell variable name that was read.
        shell_key: String,
        /// The raw value that failed to parse.
        value: String,
    },
}

#[derive(Default)]
struct Namespace<T> {
    values: HashMap<String, T>,
    shell_imported: std::collections::HashSet<String>,
}

impl<T: Clone> Namespace<T> {
    fn get(&self, key: &str) -> Option<T> {
        self.values.get(key).cloned()
    }

    /// Returns `false` without writing when `key` was previously imported
    /// from the shell; otherwise overwrites unconditionally.
    fn put(&mut self, key: &str, value: T) -> bool {
        if self.shell_imported.contains(key) {
            return false;
        }
        self.values.insert(key.to_string(), value);
        true
    }

    fn import(&mut self, key: &str, value: T) {
        self.values.insert(key.to_string(), value);
        self.shell_imported.insert(key.to_string());
    }
}

/// A typed key/value store with string and integer namespaces.
///
/// Every `Put` for a key that was previously populated via `ImportInt`/
/// `ImportString` is a no-op that returns `false`; every other collision
/// overwrites the prior value.
pub struct Env {
    strings: RwLock<Namespace<String>>,
    ints: RwLock<Namespace<i64>>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    /// Creates an empty store with no shell-imported keys.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strings: RwLock::new(Namespace::default()),
            ints: RwLock::new(Namespace::default()),
        }
    }

    /// Reads a string value, if present.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.strings.read().get(key)
    }

    /// Associates a string with `key`. Returns `false` if `key` was
    /// previously imported from the shell, in which case the store is left
    /// unchanged.
    pub fn put_string(&self, key: &str, value: impl Into<String>) -> bool {
        self.strings.write().put(key, value.into())
    }

    /// Reads an integer value, if present.
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.ints.read().get(key)
    }

    /// Associates an integer with `key`. Returns `false` if `key` was
    /// previously imported from the shell.
    pub fn put_int(&self, key: &str, value: i64) -> bool {
        self.ints.write().put(key, value)
    }

    /// Imports an integer from the shell environment variable `shell_key`,
    /// storing it under `key`. Returns `true` if the shell variable was
    /// present (regardless of whether it changed the stored value).
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::ParseInt`] if the shell variable is present but
    /// not a valid `i64`.
    pub fn import_int(&self, key: &str, shell_key: &str) -> Result<bool, EnvError> {
        let Ok(raw) = std::env::var(shell_key) else {
            return Ok(false);
        };
        let parsed: i64 = raw
            .trim()
            .parse()
            .map_err(|_| EnvError::ParseInt {
                shell_key: shell_key.to_string(),
                value: raw.clone(),
            })?;
        self.ints.write().import(key, parsed);
        Ok(true)
    }

    /// Imports a string from the shell environment variable `shell_key`.
    /// Returns `true` if the shell variable was present.
    pub fn import_string(&self, key: &str, shell_key: &str) -> bool {
        let Ok(raw) = std::env::var(shell_key) else {
            return false;
        };
        self.strings.write().import(key, raw);
        true
    }

    /// Populates the defaults named in the specification's external
    /// interfaces table, then lets any `XRD_*` shell variable override
    /// them. Parse failures for a present-but-malformed shell variable are
    /// logged at the call site by returning them; callers that don't care
    /// may discard the `Result`.
    pub fn with_xrootd_defaults() -> Result<Self, EnvError> {
        let env = Self::new();
        env.put_int(keys::CONNECTION_WINDOW, 120);
        env.put_int(keys::CONNECTION_RETRY, 5);
        env.put_int(keys::STREAM_ERROR_WINDOW, 1800);
        env.put_int(keys::SUB_STREAMS_PER_CHANNEL, 1);
        env.put_string(keys::NETWORK_STACK, "IPAuto");
        env.put_int(keys::TIMEOUT_RESOLUTION, 15);
        env.put_int(keys::CP_RETRY, 10);
        env.put_string(keys::CP_RETRY_POLICY, "continue");
        env.put_int(keys::ZIP_MTLN_CKSUM, 0);
        env.put_int(keys::CACHE_BLOCK_SIZE, 128 * 1024 * 1024);
        env.put_int(keys::CACHE_DISK_HWM, 0);
        env.put_int(keys::CACHE_DISK_LWM, 0);

        env.import_int(keys::CONNECTION_WINDOW, "XRD_CONNECTIONWINDOW")?;
        env.import_int(keys::CONNECTION_RETRY, "XRD_CONNECTIONRETRY")?;
        env.import_int(keys::STREAM_ERROR_WINDOW, "XRD_STREAMERRORWINDOW")?;
        env.import_int(keys::SUB_STREAMS_PER_CHANNEL, "XRD_SUBSTREAMSPERCHANNEL")?;
        env.import_string(keys::NETWORK_STACK, "XRD_NETWORKSTACK");
        env.import_int(keys::TIMEOUT_RESOLUTION, "XRD_TIMEOUTRESOLUTION")?;
        env.import_int(keys::CP_RETRY, "XRD_CPRETRY")?;
        env.import_string(keys::CP_RETRY_POLICY, "XRD_CPRETRYPOLICY");
        env.import_int(keys::ZIP_MTLN_CKSUM, "XRD_ZIPMTLNCKSUM")?;
        Ok(env)
    }
}

/// Process-wide singleton, analogous to `XrdCl::DefaultEnv`.
pub struct DefaultEnv;

static INSTANCE: OnceLock<Env> = OnceLock::new();

impl DefaultEnv {
    /// Returns the process-wide [`Env`], initializing it with
    /// [`Env::with_xrootd_defaults`] on first access. Malformed shell
    /// overrides are ignored on this path (defaults are kept) since a
    /// singleton accessor has nowhere to propagate a `Result`; use
    /// [`Env::with_xrootd_defaults`] directly during startup if you want to
    /// observe the error.
    pub fn instance() -> &'static Env {
        INSTANCE.get_or_init(|| Env::with_xrootd_defaults().unwrap_or_else(|_| Env::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let env = Env::new();
        assert!(env.put_string("k", "v"));
        assert_eq!(env.get_string("k").as_deref(), Some("v"));
    }

    #[test]
    fn put_overwrites_by_default() {
        let env = Env::new();
        assert!(env.put_int("k", 1));
        assert!(env.put_int("k", 2));
        assert_eq!(env.get_int("k"), Some(2));
    }

    #[test]
    fn shell_import_blocks_later_put() {
        // SAFETY-free: std::env::set_var is unsafe-free stdlib mutation for
        // the process; tests run single-threaded within this crate so
        // there's no cross-test interference.
        unsafe {
            std::env::set_var("XRD_ENV_TEST_KEY", "42");
        }
        let env = Env::new();
        assert!(env.import_int("k", "XRD_ENV_TEST_KEY").unwrap());
        assert_eq!(env.get_int("k"), Some(42));

        assert!(!env.put_int("k", 7));
        assert_eq!(env.get_int("k"), Some(42));
        unsafe {
            std::env::remove_var("XRD_ENV_TEST_KEY");
        }
    }

    #[test]
    fn import_missing_shell_key_is_noop() {
        let env = Env::new();
        assert!(!env.import_int("k", "XRD_DOES_NOT_EXIST_ANYWHERE").unwrap());
        assert_eq!(env.get_int("k"), None);
    }

    #[test]
    fn import_unparsable_shell_int_is_error() {
        unsafe {
            std::env::set_var("XRD_ENV_TEST_BAD_INT", "not-a-number");
        }
        let env = Env::new();
        let err = env.import_int("k", "XRD_ENV_TEST_BAD_INT").unwrap_err();
        assert!(matches!(err, EnvError::ParseInt { .. }));
        unsafe {
            std::env::remove_var("XRD_ENV_TEST_BAD_INT");
        }
    }

    #[test]
    fn defaults_are_populated() {
        let env = Env::with_xrootd_defaults().unwrap();
        assert_eq!(env.get_int(keys::CONNECTION_WINDOW), Some(120));
        assert_eq!(env.get_string(keys::NETWORK_STACK).as_deref(), Some("IPAuto"));
    }
}
