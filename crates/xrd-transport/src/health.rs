//! Stream TTL and health (broken-stream) detection.
//!
//! A stream that has had nothing to send and nothing arriving for a
//! while is torn down deliberately (TTL); one that has been idle *far*
//! longer than a responsive server would ever leave a request pending,
//! or that has racked up repeated health-check failures, is declared
//! broken and recovered from instead (closed, requests requeued, a fresh
//! connect attempted).

use std::time::Duration;

use crate::ChannelData;

/// Summary a caller can inspect after a TTL/health check, mostly useful
/// for logging at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelHealth {
    /// Nothing wrong; keep the stream as-is.
    Healthy,
    /// Idle time exceeded the configured TTL with no pending work; the
    /// caller should force-disconnect cleanly.
    TtlElapsed,
    /// The stream is unresponsive or has failed too many consecutive
    /// health checks; the caller should treat this as a connection error
    /// and recover.
    Broken,
}

/// Whether `idle` exceeds `ttl`, but only when every out-queue is empty —
/// a stream with queued work is never torn down for being "idle", since
/// idle specifically means "nothing to do and nothing happening".
#[must_use]
pub fn is_ttl_elapsed(idle: Duration, channel: ChannelData, ttl: Duration) -> bool {
    channel.out_queues_empty && idle >= ttl
}

/// Whether a stream counts as broken: either it has failed too many
/// consecutive health checks, or it has been idle long past
/// `broken_after` regardless of queue state (a queued request that never
/// gets a response for that long indicates a half-open socket, not a
/// legitimately slow server).
#[must_use]
pub fn is_broken(
    idle: Duration,
    channel: ChannelData,
    broken_after: Duration,
    max_consecutive_failures: u32,
) -> bool {
    channel.consecutive_failures >= max_consecutive_failures || idle >= broken_after
}

/// Combines [`is_ttl_elapsed`] and [`is_broken`] into the single
/// three-way verdict a caller typically wants to log and act on.
#[must_use]
pub fn classify(
    idle: Duration,
    channel: ChannelData,
    ttl: Duration,
    broken_after: Duration,
    max_consecutive_failures: u32,
) -> ChannelHealth {
    if is_broken(idle, channel, broken_after, max_consecutive_failures) {
        ChannelHealth::Broken
    } else if is_ttl_elapsed(idle, channel, ttl) {
        ChannelHealth::TtlElapsed
    } else {
        ChannelHealth::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(out_queues_empty: bool, consecutive_failures: u32) -> ChannelData {
        ChannelData {
            out_queues_empty,
            sub_stream_count: 1,
            consecutive_failures,
        }
    }

    #[test]
    fn ttl_only_elapses_with_empty_queues() {
        let busy = channel(false, 0);
        assert!(!is_ttl_elapsed(Duration::from_secs(600), busy, Duration::from_secs(300)));

        let idle = channel(true, 0);
        assert!(is_ttl_elapsed(Duration::from_secs(600), idle, Duration::from_secs(300)));
    }

    #[test]
    fn broken_on_consecutive_failures_regardless_of_idle() {
        let failing = channel(false, 5);
        assert!(is_broken(
            Duration::from_secs(1),
            failing,
            Duration::from_secs(900),
            3
        ));
    }

    #[test]
    fn broken_on_extreme_idle_even_with_queued_work() {
        let busy = channel(false, 0);
        assert!(is_broken(
            Duration::from_secs(1000),
            busy,
            Duration::from_secs(900),
            3
        ));
    }

    #[test]
    fn classify_prefers_broken_over_ttl() {
        let failing = channel(true, 10);
        assert_eq!(
            classify(
                Duration::from_secs(1000),
                failing,
                Duration::from_secs(300),
                Duration::from_secs(900),
                3
            ),
            ChannelHealth::Broken
        );
    }
}
