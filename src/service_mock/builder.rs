use crate::service_mock::tls::CertificateResolver;
use crate::ServiceMock;
use std::sync::Arc;
use std::time::Duration;

pub(super) const DEFAULT_SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// A builder providing a fluent API to assemble a [`ServiceMock`] step-by-step.
/// Use [`ServiceMock::builder`] to get started.
pub struct ServiceMockBuilder {
    certificate_resolver: Option<Arc<dyn CertificateResolver>>,
    shutdown_grace_period: Duration,
}

impl ServiceMockBuilder {
    pub(super) fn new() -> Self {
        Self {
            certificate_resolver: None,
            shutdown_grace_period: DEFAULT_SHUTDOWN_GRACE_PERIOD,
        }
    }

    /// HTTPS endpoints configured with a [`CertificateSource::Selector`] get their certificate
    /// from `resolver` at activation time.
    ///
    /// ### Example:
    /// ```rust
    /// use servicemock::{CertificateHandle, CertificateNotFoundError, RestMock, ServiceMock};
    /// use servicemock::tls_certs::TestCertificates;
    ///
    /// let certificates = TestCertificates::random();
    /// let handle = certificates.certificate_handle();
    /// let mut host = ServiceMock::builder()
    ///     .certificate_resolver(move |selector: &str| {
    ///         if selector == "localhost" {
    ///             Ok(handle.clone())
    ///         } else {
    ///             Err(CertificateNotFoundError::new(selector))
    ///         }
    ///     })
    ///     .build();
    ///
    /// host.register(RestMock::https(0, "localhost")).unwrap();
    /// host.activate().unwrap();
    /// ```
    ///
    /// [`CertificateSource::Selector`]: crate::CertificateSource::Selector
    pub fn certificate_resolver(mut self, resolver: impl CertificateResolver + 'static) -> Self {
        self.certificate_resolver = Some(Arc::new(resolver));
        self
    }

    /// How long disposal waits for in-flight requests before closing their connections.
    /// Defaults to 5 seconds.
    pub fn shutdown_grace_period(mut self, grace_period: Duration) -> Self {
        self.shutdown_grace_period = grace_period;
        self
    }

    pub fn build(self) -> ServiceMock {
        ServiceMock::from_parts(self.certificate_resolver, self.shutdown_grace_period)
    }
}
