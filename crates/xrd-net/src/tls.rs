use std::sync::Arc;

use tokio_rustls::rustls::{ClientConfig, RootCertStore};

/// Installs the process-wide default crypto backend (`aws-lc-rs`) if one
/// hasn't been installed yet. `rustls` 0.23 requires exactly one
/// `CryptoProvider` to be installed before any `ClientConfig` is built;
/// calling this more than once (e.g. once per `Socket` rather than once
/// per process) is harmless since the second install is simply ignored.
fn ensure_crypto_provider() {
    let _ = tokio_rustls::rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Builds a [`ClientConfig`] trusting the Mozilla root set shipped by
/// `webpki-roots`, with no client certificate. XRootD servers that require
/// mutual TLS configure their own trust store at the server end; adding
/// client-certificate support here is a matter of swapping
/// `with_no_client_auth` for `with_client_auth_cert` once a call site
/// needs it.
#[must_use]
pub fn default_client_config() -> Arc<ClientConfig> {
    ensure_crypto_provider();

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Arc::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_client_config_trusts_a_nonempty_root_set() {
        let config = default_client_config();
        assert!(!config.crypto_provider().cipher_suites.is_empty());
    }
}
