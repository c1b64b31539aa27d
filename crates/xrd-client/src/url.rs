//! XRootD URLs: `root://host[:port]/path?opaque&query`.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ClientError;

const DEFAULT_PORT: u16 = 1094;

/// A parsed XRootD URL.
///
/// Canonical string form is `host:port` plus the path and opaque info;
/// [`Url::host_id`] is exactly that `host:port` pair and is the key
/// channels and caches are indexed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    protocol: String,
    host: String,
    port: u16,
    path: String,
    opaque: BTreeMap<String, String>,
}

impl Url {
    /// Parses `raw` as an XRootD URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if `raw` isn't a valid URL, has
    /// no host, or its port doesn't fit a `u16`.
    pub fn parse(raw: &str) -> Result<Self, ClientError> {
        let parsed = url::Url::parse(raw).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ClientError::InvalidUrl(format!("{raw}: missing host")))?
            .to_string();
        let protocol = parsed.scheme().to_string();
        let port = parsed.port().unwrap_or(DEFAULT_PORT);
        let path = parsed.path().to_string();

        let mut opaque = BTreeMap::new();
        for (key, value) in parsed.query_pairs() {
            opaque.insert(key.into_owned(), value.into_owned());
        }

        Ok(Self {
            protocol,
            host,
            port,
            path,
            opaque,
        })
    }

    /// The URL scheme (`root`, `xroot`, `roots`, ...).
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// The bare hostname, without port.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, defaulting to 1094 when the URL didn't specify one.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The path component.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Looks up one opaque (CGI-style) query parameter.
    #[must_use]
    pub fn opaque_param(&self, key: &str) -> Option<&str> {
        self.opaque.get(key).map(String::as_str)
    }

    /// `host:port`, the key channels and cache entries are looked up
    /// under.
    #[must_use]
    pub fn host_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.protocol, self.host_id(), self.path)?;
        if !self.opaque.is_empty() {
            write!(f, "?")?;
            for (idx, (key, value)) in self.opaque.iter().enumerate() {
                if idx > 0 {
                    write!(f, "&")?;
                }
                write!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_id_is_host_colon_port() {
        let url = Url::parse("root://example.org:1095/foo/bar").unwrap();
        assert_eq!(url.host_id(), "example.org:1095");
        assert_eq!(url.path(), "/foo/bar");
    }

    #[test]
    fn missing_port_defaults_to_1094() {
        let url = Url::parse("root://example.org/foo").unwrap();
        assert_eq!(url.host_id(), "example.org:1094");
    }

    #[test]
    fn opaque_params_are_parsed() {
        let url = Url::parse("root://example.org/foo?cksum=adler32&hdfsbsize=4096").unwrap();
        assert_eq!(url.opaque_param("cksum"), Some("adler32"));
        assert_eq!(url.opaque_param("hdfsbsize"), Some("4096"));
        assert_eq!(url.opaque_param("missing"), None);
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(Url::parse("not a url").is_err());
    }
}
