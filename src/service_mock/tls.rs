//! Certificates for HTTPS endpoints.
//!
//! The host never looks up certificates by itself: an endpoint either carries an already
//! resolved [`CertificateHandle`] or a selector that the configured [`CertificateResolver`]
//! turns into one during activation.
use crate::error::{ActivationError, CertificateNotFoundError};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// A server certificate chain (leaf first) and its private key.
pub struct CertificateHandle {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl CertificateHandle {
    pub fn new(chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { chain, key }
    }

    /// Build a handle from a DER-encoded certificate and a DER-encoded PKCS#8 private key.
    pub fn from_der(cert_der: Vec<u8>, pkcs8_key_der: Vec<u8>) -> Self {
        Self {
            chain: vec![CertificateDer::from(cert_der)],
            key: PrivateKeyDer::Pkcs8(pkcs8_key_der.into()),
        }
    }

    /// Build a handle from PEM-encoded certificates (leaf first) and a PEM-encoded private key.
    pub fn from_pem(chain_pem: &[u8], key_pem: &[u8]) -> Result<Self, rustls_pki_types::pem::Error> {
        let chain = CertificateDer::pem_slice_iter(chain_pem).collect::<Result<Vec<_>, _>>()?;
        let key = PrivateKeyDer::from_pem_slice(key_pem)?;
        Ok(Self { chain, key })
    }

    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }
}

impl Clone for CertificateHandle {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl Debug for CertificateHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateHandle")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Where an HTTPS endpoint gets its certificate from.
#[derive(Clone, Debug)]
pub enum CertificateSource {
    /// An already resolved certificate.
    Handle(CertificateHandle),
    /// An opaque selector (e.g. a thumbprint) handed to the [`CertificateResolver`] at activation.
    Selector(String),
}

impl From<CertificateHandle> for CertificateSource {
    fn from(handle: CertificateHandle) -> Self {
        CertificateSource::Handle(handle)
    }
}

impl From<&str> for CertificateSource {
    fn from(selector: &str) -> Self {
        CertificateSource::Selector(selector.to_string())
    }
}

impl From<String> for CertificateSource {
    fn from(selector: String) -> Self {
        CertificateSource::Selector(selector)
    }
}

/// Resolves a certificate selector into a [`CertificateHandle`], e.g. by looking it up in an
/// OS-managed certificate store.
///
/// Closures with the right signature implement this trait.
pub trait CertificateResolver: Send + Sync {
    fn resolve(&self, selector: &str) -> Result<CertificateHandle, CertificateNotFoundError>;
}

impl<F> CertificateResolver for F
where
    F: Fn(&str) -> Result<CertificateHandle, CertificateNotFoundError> + Send + Sync,
{
    fn resolve(&self, selector: &str) -> Result<CertificateHandle, CertificateNotFoundError> {
        self(selector)
    }
}

pub(crate) fn resolve(
    endpoint: &str,
    source: &CertificateSource,
    resolver: Option<&dyn CertificateResolver>,
) -> Result<CertificateHandle, ActivationError> {
    match source {
        CertificateSource::Handle(handle) => Ok(handle.clone()),
        CertificateSource::Selector(selector) => {
            let resolver =
                resolver.ok_or_else(|| ActivationError::MissingCertificateResolver {
                    endpoint: endpoint.to_string(),
                    selector: selector.clone(),
                })?;
            resolver
                .resolve(selector)
                .map_err(|source| ActivationError::CertificateNotFound {
                    endpoint: endpoint.to_string(),
                    source,
                })
        }
    }
}

/// Turn a certificate into a TLS acceptor, failing if the key is unusable or does not match.
pub(crate) fn acceptor(
    endpoint: &str,
    certificate: CertificateHandle,
) -> Result<TlsAcceptor, ActivationError> {
    let binding_error = |source| ActivationError::CertificateBinding {
        endpoint: endpoint.to_string(),
        source,
    };
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(binding_error)?
        .with_no_client_auth()
        .with_single_cert(certificate.chain, certificate.key)
        .map_err(binding_error)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls_certs::TestCertificates;

    #[test]
    fn generated_certificates_can_be_bound() {
        let certificates = TestCertificates::random();

        assert!(acceptor("test", certificates.certificate_handle()).is_ok());
    }

    #[test]
    fn garbage_keys_are_rejected() {
        let certificates = TestCertificates::random();
        let handle = CertificateHandle::from_der(
            certificates.certificate_handle().chain()[0].to_vec(),
            vec![1, 2, 3],
        );

        let err = acceptor("test", handle).err().unwrap();
        assert!(matches!(err, ActivationError::CertificateBinding { .. }));
    }

    #[test]
    fn selectors_go_through_the_resolver() {
        let certificates = TestCertificates::random();
        let handle = certificates.certificate_handle();
        let resolver = move |selector: &str| {
            if selector == "known" {
                Ok(handle.clone())
            } else {
                Err(CertificateNotFoundError::new(selector))
            }
        };

        let resolver: &dyn CertificateResolver = &resolver;

        let known = CertificateSource::Selector("known".into());
        assert!(resolve("test", &known, Some(resolver)).is_ok());

        let unknown = CertificateSource::Selector("unknown".into());
        let err = resolve("test", &unknown, Some(resolver)).unwrap_err();
        assert!(matches!(err, ActivationError::CertificateNotFound { .. }));

        let err = resolve("test", &known, None).unwrap_err();
        assert!(matches!(err, ActivationError::MissingCertificateResolver { .. }));
    }
}
