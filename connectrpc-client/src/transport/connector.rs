//! TLS connector setup for the hyper client.
//!
//! TLS needs both a crypto provider and root certificates:
//!
//! - **Crypto providers**: `tls-ring` (default with `tls`) or `tls-aws-lc`.
//!   Without either, a provider installed with
//!   `CryptoProvider::install_default()` is used.
//! - **Root certificates**: `tls-native-roots` (default with `tls`) or
//!   `tls-webpki-roots`.
//!
//! ```ignore
//! // With the default `tls` feature, HTTPS just works:
//! let connector = build_https_connector(None)?;
//!
//! // Trust a private CA:
//! let mut roots = rustls::RootCertStore::empty();
//! roots.add(my_ca)?;
//! let connector = build_https_connector(Some(tls_config_with_roots(roots)?))?;
//! ```

#[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::{ClientConfig, ConfigBuilder, RootCertStore, WantsVerifier};

use super::TransportError;

/// Whether both a crypto provider feature and a root certificate feature are enabled.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))
}

/// A config builder from the feature-selected provider, falling back to the
/// process-wide default.
fn crypto_provider_builder() -> Result<ConfigBuilder<ClientConfig, WantsVerifier>, TransportError> {
    #[cfg(feature = "tls-ring")]
    let provider = Some(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    let provider = Some(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    let provider = rustls::crypto::CryptoProvider::get_default().cloned();

    let provider = provider.ok_or(TransportError::NoCryptoProvider)?;
    Ok(ClientConfig::builder_with_provider(provider).with_safe_default_protocol_versions()?)
}

/// A client config trusting exactly `roots`.
pub fn tls_config_with_roots(roots: RootCertStore) -> Result<ClientConfig, TransportError> {
    Ok(crypto_provider_builder()?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// The TLS config used when none is supplied: the feature-selected roots and
/// crypto provider.
pub fn default_tls_config() -> Result<ClientConfig, TransportError> {
    tls_config_with_roots(build_root_store()?)
}

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn build_root_store() -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();

    // Native roots win when both features are on.
    #[cfg(feature = "tls-native-roots")]
    {
        let native = rustls_native_certs::load_native_certs();
        if !native.errors.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!(errors = ?native.errors, "some native certificates failed to load");
        }
        roots.add_parsable_certificates(native.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Ok(roots)
}

#[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
fn build_root_store() -> Result<RootCertStore, TransportError> {
    Err(TransportError::NoRootCertificates)
}

/// An HTTPS connector that also accepts plain `http://` URLs.
///
/// With `tls_config` unset, [`default_tls_config`] is used.
pub fn build_https_connector(tls_config: Option<ClientConfig>) -> Result<HttpsConnector<HttpConnector>, TransportError> {
    let config = match tls_config {
        Some(config) => config,
        None => default_tls_config()?,
    };

    Ok(HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http()
        .enable_all_versions()
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
    #[test]
    fn test_custom_roots() {
        let config = tls_config_with_roots(RootCertStore::empty()).unwrap();
        assert!(build_https_connector(Some(config)).is_ok());
    }

    #[cfg(all(feature = "tls-ring", any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
    #[test]
    fn test_default_connector() {
        assert!(has_tls_support());
        assert!(build_https_connector(None).is_ok());
    }

    #[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
    #[test]
    fn test_missing_roots() {
        assert!(matches!(default_tls_config(), Err(TransportError::NoRootCertificates)));
    }
}
