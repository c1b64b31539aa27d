//! Lazy address resolution with a family preference and a "preferred
//! URL" bias.
//!
//! A `Stream` doesn't resolve DNS until the first `Send` needs a
//! connection, and when a third-party-copy negotiation hands back a
//! "prefer this endpoint" URL, that endpoint's addresses are appended
//! *last* in the resolved list rather than replacing it outright — the
//! original target stays reachable as a fallback.

use std::net::{IpAddr, SocketAddr};

use xrd_env::Env;

/// Which IP family a `Stream` should prefer when more than one is
/// available for a host, read from the `NetworkStack` environment key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// Prefer whichever family the host's first `A`/`AAAA` record
    /// resolves to; this is the common case for a dual-stack host.
    Auto,
    /// Keep every resolved address, in resolver order.
    All,
    /// IPv4 only.
    V4,
    /// IPv6 only.
    V6,
}

impl AddressFamily {
    /// Reads the `NetworkStack` key from `env`, defaulting to
    /// [`AddressFamily::Auto`] for an unset or unrecognized value.
    #[must_use]
    pub fn from_env(env: &Env) -> Self {
        match env.get_string("NetworkStack").as_deref() {
            Some("IPAll") => Self::All,
            Some("IPv4") => Self::V4,
            Some("IPv6") => Self::V6,
            _ => Self::Auto,
        }
    }

    fn matches(self, addr: &IpAddr) -> bool {
        match self {
            Self::Auto | Self::All => true,
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

/// Resolves a `(host, port)` pair into an ordered address list. Kept as
/// a trait so tests can supply deterministic addresses instead of
/// depending on a real resolver.
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `host:port`, applying `family`'s filter.
    async fn resolve(
        &self,
        host: &str,
        port: u16,
        family: AddressFamily,
    ) -> std::io::Result<Vec<SocketAddr>>;
}

/// Production resolver built on `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioResolver;

#[async_trait::async_trait]
impl Resolver for TokioResolver {
    async fn resolve(
        &self,
        host: &str,
        port: u16,
        family: AddressFamily,
    ) -> std::io::Result<Vec<SocketAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        let mut filtered: Vec<SocketAddr> = addrs.filter(|a| family.matches(&a.ip())).collect();
        if family == AddressFamily::Auto {
            // Auto-detect: if the first address is IPv6, keep the IPv6
            // addresses ahead of any IPv4 ones (and vice versa), rather
            // than filtering the other family out entirely — a
            // dual-stack host still wants a fallback.
            if let Some(first) = filtered.first().copied() {
                let prefer_v6 = first.is_ipv6();
                filtered.sort_by_key(|a| a.is_ipv6() != prefer_v6);
            }
        }
        Ok(filtered)
    }
}

/// Resolves `host:port`, then appends `preferred_host:preferred_port`'s
/// own addresses at the end of the list (deduplicated), implementing the
/// "preferred URL addresses appended last" bias.
///
/// # Errors
///
/// Returns the primary resolution's error; a failure to resolve the
/// preferred host is ignored (it simply contributes no addresses) since
/// its whole purpose is to be a fallback, not a requirement.
pub async fn resolve_with_preference(
    resolver: &dyn Resolver,
    host: &str,
    port: u16,
    family: AddressFamily,
    preferred: Option<(&str, u16)>,
) -> std::io::Result<Vec<SocketAddr>> {
    let mut addrs = resolver.resolve(host, port, family).await?;
    if let Some((preferred_host, preferred_port)) = preferred {
        if let Ok(preferred_addrs) = resolver.resolve(preferred_host, preferred_port, family).await
        {
            for addr in preferred_addrs {
                if !addrs.contains(&addr) {
                    addrs.push(addr);
                }
            }
        }
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticResolver {
        by_host: std::collections::HashMap<String, Vec<SocketAddr>>,
    }

    #[async_trait::async_trait]
    impl Resolver for StaticResolver {
        async fn resolve(
            &self,
            host: &str,
            _port: u16,
            _family: AddressFamily,
        ) -> std::io::Result<Vec<SocketAddr>> {
            Ok(self.by_host.get(host).cloned().unwrap_or_default())
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn preferred_addresses_are_appended_last() {
        let mut by_host = std::collections::HashMap::new();
        by_host.insert(
            "primary".to_string(),
            vec![addr("10.0.0.1:1094"), addr("10.0.0.2:1094")],
        );
        by_host.insert("fallback".to_string(), vec![addr("10.0.0.9:1094")]);
        let resolver = StaticResolver { by_host };

        let addrs = resolve_with_preference(
            &resolver,
            "primary",
            1094,
            AddressFamily::Auto,
            Some(("fallback", 1094)),
        )
        .await
        .unwrap();

        assert_eq!(
            addrs,
            vec![
                addr("10.0.0.1:1094"),
                addr("10.0.0.2:1094"),
                addr("10.0.0.9:1094"),
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_preferred_addresses_are_not_repeated() {
        let mut by_host = std::collections::HashMap::new();
        let shared = addr("10.0.0.1:1094");
        by_host.insert("primary".to_string(), vec![shared]);
        by_host.insert("fallback".to_string(), vec![shared]);
        let resolver = StaticResolver { by_host };

        let addrs = resolve_with_preference(
            &resolver,
            "primary",
            1094,
            AddressFamily::Auto,
            Some(("fallback", 1094)),
        )
        .await
        .unwrap();
        assert_eq!(addrs, vec![shared]);
    }

    #[test]
    fn address_family_filters_match_correctly() {
        assert!(AddressFamily::V4.matches(&"10.0.0.1".parse().unwrap()));
        assert!(!AddressFamily::V4.matches(&"::1".parse().unwrap()));
        assert!(AddressFamily::V6.matches(&"::1".parse().unwrap()));
        assert!(AddressFamily::All.matches(&"::1".parse().unwrap()));
    }
}
