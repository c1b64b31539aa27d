#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Leveled, topic-masked logging for the XRootD client runtime.
//!
//! Upstream `XrdCl::Log` keeps one global level plus a per-topic bitmask
//! (`PostMasterMsg`, `StreamMsg`, `FileMsg`, ...) so a caller can turn on
//! `Dump`-level verbosity for the poller without drowning in cache chatter.
//! This crate keeps the same two-axis model but expresses it as `tracing`
//! targets rather than a hand-rolled sink: every [`Topic`] is a `tracing`
//! target string, and [`Level`] maps directly onto [`tracing::Level`].
//! Callers who want the bitmask behaviour build an [`tracing_subscriber`]
//! `EnvFilter` directive string with [`topic_filter_directives`].

use std::fmt;

use xrd_env::{DefaultEnv, Env};

/// One log topic, matching the per-subsystem masks the original
/// implementation exposes (`PostMaster`, `Stream`, `Poller`, `Exchange`,
/// `File`, `FileCache`, `TaskMgr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Channel/Post Master lifecycle.
    PostMaster,
    /// Stream connect/reconnect/multiplex activity.
    Stream,
    /// Poller readiness events.
    Poller,
    /// Wire-level request/response framing.
    Exchange,
    /// Public `File`/`FileSystem` API calls.
    File,
    /// Block cache activity.
    FileCache,
    /// Task and job manager activity.
    TaskMgr,
}

impl Topic {
    /// The `tracing` target string this topic logs under.
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::PostMaster => "xrd::postmaster",
            Self::Stream => "xrd::stream",
            Self::Poller => "xrd::poller",
            Self::Exchange => "xrd::exchange",
            Self::File => "xrd::file",
            Self::FileCache => "xrd::filecache",
            Self::TaskMgr => "xrd::taskmgr",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

/// Verbosity level, matching the original's `None < Error < Warning < Info
/// < Debug < Dump` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Logging disabled.
    None,
    /// Unrecoverable condition for the current operation.
    Error,
    /// Recoverable but noteworthy condition.
    Warning,
    /// High-level progress.
    Info,
    /// Developer-facing detail.
    Debug,
    /// Everything, including per-byte framing detail.
    Dump,
}

impl Level {
    /// Maps to the closest [`tracing::Level`]. `None` has no tracing
    /// equivalent; callers should check [`Level::is_enabled`] first.
    #[must_use]
    pub const fn to_tracing(self) -> tracing::Level {
        match self {
            Self::None | Self::Error => tracing::Level::ERROR,
            Self::Warning => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Dump => tracing::Level::TRACE,
        }
    }

    /// Whether this level permits any output at all.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Reads the configured verbosity for `topic` from the process [`Env`],
/// defaulting to [`Level::Info`] when unset. Keys follow the
/// `Log<Topic>Level` naming convention, e.g. `LogStreamLevel`.
#[must_use]
pub fn level_for(env: &Env, topic: Topic) -> Level {
    let key = format!("Log{topic:?}Level");
    match env.get_int(&key) {
        Some(0) => Level::None,
        Some(1) => Level::Error,
        Some(2) => Level::Warning,
        Some(3) => Level::Info,
        Some(4) => Level::Debug,
        Some(_) => Level::Dump,
        None => Level::Info,
    }
}

/// Convenience wrapper around [`level_for`] against [`DefaultEnv::instance`].
#[must_use]
pub fn default_level_for(topic: Topic) -> Level {
    level_for(DefaultEnv::instance(), topic)
}

/// Builds an `EnvFilter`-compatible directive string (`target=level,...`)
/// covering every [`Topic`], reading each topic's level from `env`. Feed
/// this into `tracing_subscriber::EnvFilter::new` to reproduce the
/// original per-topic bitmask as a `tracing` filter.
#[must_use]
pub fn topic_filter_directives(env: &Env) -> String {
    const TOPICS: [Topic; 7] = [
        Topic::PostMaster,
        Topic::Stream,
        Topic::Poller,
        Topic::Exchange,
        Topic::File,
        Topic::FileCache,
        Topic::TaskMgr,
    ];
    TOPICS
        .iter()
        .map(|topic| {
            let level = level_for(env, *topic);
            format!("{}={:?}", topic.target(), level.to_tracing())
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs a process-wide `tracing_subscriber` using
/// [`topic_filter_directives`] against [`DefaultEnv::instance`]. Intended
/// for host binaries (not libraries) to call once at startup; a no-op
/// (returns the already-set error) if a subscriber is already installed.
#[cfg(feature = "subscriber")]
pub fn init_default_subscriber() -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::EnvFilter;

    let directives = topic_filter_directives(DefaultEnv::instance());
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Error < Level::Warning);
        assert!(Level::Warning < Level::Info);
        assert!(Level::Info < Level::Debug);
        assert!(Level::Debug < Level::Dump);
    }

    #[test]
    fn level_for_defaults_to_info() {
        let env = Env::new();
        assert_eq!(level_for(&env, Topic::Stream), Level::Info);
    }

    #[test]
    fn level_for_reads_env_override() {
        let env = Env::new();
        env.put_int("LogStreamLevel", 4);
        assert_eq!(level_for(&env, Topic::Stream), Level::Debug);
    }

    #[test]
    fn topic_filter_directives_mentions_every_topic() {
        let env = Env::new();
        let directives = topic_filter_directives(&env);
        assert!(directives.contains("xrd::stream="));
        assert!(directives.contains("xrd::postmaster="));
        assert!(directives.contains("xrd::filecache="));
    }
}
