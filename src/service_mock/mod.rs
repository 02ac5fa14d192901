mod builder;
mod hyper;
mod lifecycle;
mod tls;

pub use builder::ServiceMockBuilder;
pub use lifecycle::LifecycleState;
pub use tls::{CertificateHandle, CertificateResolver, CertificateSource};

use crate::error::{ActivationError, ConfigError};
use crate::rest_mock::{RestMock, Scheme};
use self::hyper::{PreparedServer, ServerHandle};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

/// Identifies a [`RestMock`] registered on a [`ServiceMock`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RestMockId(usize);

/// The owner of one or more [`RestMock`]s and of their listeners.
///
/// A `ServiceMock` starts out in [`LifecycleState::Configuring`]: endpoints can be registered
/// and their mappings changed, but nothing is listening yet. [`ServiceMock::activate`] binds one
/// listener per endpoint and freezes the mappings. [`ServiceMock::dispose`] (or dropping the
/// `ServiceMock`) stops the listeners and releases their ports.
///
/// Each `ServiceMock` owns its listeners: instances do not share any state, so they can be
/// used from tests running in parallel.
///
/// ### Example:
/// ```rust
/// use servicemock::{RestMock, ServiceMock, Times};
/// use serde_json::json;
///
/// #[async_std::main]
/// async fn main() -> Result<(), servicemock::Error> {
///     // Arrange
///     let mut host = ServiceMock::new();
///     let endpoint = host.register(RestMock::http(0))?;
///     host.rest_mock_mut(endpoint)?
///         .setup_get("/alive", &[])?
///         .returns_json(&json!({"Text": "Running"}))?;
///     host.activate()?;
///
///     // Act
///     let uri = format!("{}/alive", host.rest_mock(endpoint).uri());
///     let status = reqwest::get(uri).await.unwrap().status();
///
///     // Assert
///     assert_eq!(status, 200);
///     host.rest_mock(endpoint).verify_get("/alive", &[], Times::once())?;
///     Ok(())
/// }
/// ```
pub struct ServiceMock {
    endpoints: Vec<RestMock>,
    state: LifecycleState,
    servers: Vec<ServerHandle>,
    certificate_resolver: Option<Arc<dyn CertificateResolver>>,
    shutdown_grace_period: Duration,
}

impl ServiceMock {
    /// A host with no certificate resolver and the default shutdown grace period.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// See [`ServiceMockBuilder`] for the available options.
    pub fn builder() -> ServiceMockBuilder {
        ServiceMockBuilder::new()
    }

    pub(crate) fn from_parts(
        certificate_resolver: Option<Arc<dyn CertificateResolver>>,
        shutdown_grace_period: Duration,
    ) -> Self {
        Self {
            endpoints: vec![],
            state: LifecycleState::Configuring,
            servers: vec![],
            certificate_resolver,
            shutdown_grace_period,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Add an endpoint to this host. Only allowed while configuring.
    pub fn register(&mut self, rest_mock: RestMock) -> Result<RestMockId, ConfigError> {
        self.ensure_configuring()?;
        self.endpoints.push(rest_mock);
        Ok(RestMockId(self.endpoints.len() - 1))
    }

    /// Read access to a registered endpoint, e.g. to verify it or to get its uri.
    ///
    /// # Panics
    /// If `id` was issued by another `ServiceMock`.
    pub fn rest_mock(&self, id: RestMockId) -> &RestMock {
        &self.endpoints[id.0]
    }

    /// Mutable access to a registered endpoint, to set up its mappings.
    ///
    /// Fails with [`ConfigError::MutationAfterActivation`] once the host has been activated.
    ///
    /// # Panics
    /// If `id` was issued by another `ServiceMock`.
    pub fn rest_mock_mut(&mut self, id: RestMockId) -> Result<&mut RestMock, ConfigError> {
        self.ensure_configuring()?;
        Ok(&mut self.endpoints[id.0])
    }

    pub fn rest_mocks(&self) -> &[RestMock] {
        &self.endpoints
    }

    fn ensure_configuring(&self) -> Result<(), ConfigError> {
        if self.state.is_configuring() {
            Ok(())
        } else {
            Err(ConfigError::MutationAfterActivation { state: self.state })
        }
    }

    /// Bind a listener for every registered endpoint and start serving requests.
    ///
    /// Activation is all-or-nothing: certificates are resolved, every port is bound and every
    /// listener is prepared before any of them starts serving. If one step fails for one
    /// endpoint, everything acquired so far is released, the error is returned and the host
    /// stays in [`LifecycleState::Configuring`].
    pub fn activate(&mut self) -> Result<(), ActivationError> {
        let next_state = self
            .state
            .activate()
            .ok_or(ActivationError::InvalidState(self.state))?;

        // Bind everything first: a failure here drops the listeners bound so far.
        let mut prepared = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            prepared.push(self.prepare(endpoint)?);
        }

        let mut servers = Vec::with_capacity(prepared.len());
        let mut addresses = Vec::with_capacity(prepared.len());
        for (server, address) in prepared {
            match server.start(self.shutdown_grace_period) {
                Ok(server) => {
                    servers.push(server);
                    addresses.push(address);
                }
                Err(e) => {
                    servers.into_iter().for_each(ServerHandle::shutdown);
                    return Err(e);
                }
            }
        }

        for (endpoint, address) in self.endpoints.iter_mut().zip(addresses) {
            endpoint.set_bound_address(Some(address));
            info!("Activated endpoint `{}`", endpoint.uri());
        }
        self.servers = servers;
        self.state = next_state;
        Ok(())
    }

    fn prepare(
        &self,
        endpoint: &RestMock,
    ) -> Result<(PreparedServer, std::net::SocketAddr), ActivationError> {
        let name = endpoint.uri();
        let acceptor = match endpoint.scheme() {
            Scheme::Http => None,
            Scheme::Https(source) => {
                let certificate =
                    tls::resolve(&name, source, self.certificate_resolver.as_deref())?;
                Some(tls::acceptor(&name, certificate)?)
            }
        };

        let address = endpoint.address();
        let bind_error = |source| ActivationError::Bind {
            endpoint: name.clone(),
            address,
            source,
        };
        let listener = std::net::TcpListener::bind(address).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let bound_address = listener.local_addr().map_err(bind_error)?;
        debug!("Bound `{}` to {}", name, bound_address);

        let server = PreparedServer::new(
            name,
            listener,
            acceptor,
            endpoint.routes(),
            endpoint.log(),
        );
        Ok((server, bound_address))
    }

    /// Stop every listener and release its port.
    ///
    /// New connections are refused right away; requests already in flight get up to the
    /// shutdown grace period to complete before their connections are closed. This call
    /// blocks until every listener has stopped.
    ///
    /// Disposing is allowed in every state and disposing twice is a no-op. Dropping a
    /// `ServiceMock` disposes it.
    pub fn dispose(&mut self) {
        if self.state == LifecycleState::Disposed {
            return;
        }
        for server in self.servers.drain(..) {
            server.shutdown();
        }
        self.state = self.state.dispose();
        debug!("Disposed service mock");
    }
}

impl Default for ServiceMock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ServiceMock {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls_certs::TestCertificates;
    use std::net::TcpListener;

    #[test]
    fn endpoints_are_frozen_after_activation() {
        let mut host = ServiceMock::new();
        let id = host.register(RestMock::http(0)).unwrap();
        host.rest_mock_mut(id).unwrap().setup_get("/alive", &[]).unwrap();

        host.activate().unwrap();

        assert_eq!(host.state(), LifecycleState::Active);
        assert!(matches!(
            host.rest_mock_mut(id),
            Err(ConfigError::MutationAfterActivation {
                state: LifecycleState::Active
            })
        ));
        assert!(host.register(RestMock::http(0)).is_err());
        assert_ne!(host.rest_mock(id).address().port(), 0);
    }

    #[test]
    fn activation_is_all_or_nothing() {
        let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
        let occupied_port = occupied.local_addr().unwrap().port();
        let free_port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let mut host = ServiceMock::new();
        host.register(RestMock::http(free_port)).unwrap();
        host.register(RestMock::http(occupied_port)).unwrap();

        let err = host.activate().unwrap_err();

        assert!(matches!(err, ActivationError::Bind { address, .. } if address.port() == occupied_port));
        assert_eq!(host.state(), LifecycleState::Configuring);
        // The first endpoint's port has been released.
        TcpListener::bind(("127.0.0.1", free_port)).unwrap();
    }

    #[test]
    fn invalid_certificates_fail_activation() {
        let certificates = TestCertificates::random();
        let handle = CertificateHandle::from_der(
            certificates.certificate_handle().chain()[0].to_vec(),
            vec![0; 16],
        );
        let mut host = ServiceMock::new();
        host.register(RestMock::https(0, handle)).unwrap();

        let err = host.activate().unwrap_err();

        assert!(matches!(err, ActivationError::CertificateBinding { .. }));
        assert_eq!(host.state(), LifecycleState::Configuring);
    }

    #[test]
    fn selectors_without_resolver_fail_activation() {
        let mut host = ServiceMock::new();
        host.register(RestMock::https(0, "thumbprint")).unwrap();

        let err = host.activate().unwrap_err();

        assert!(matches!(
            err,
            ActivationError::MissingCertificateResolver { ref selector, .. } if selector == "thumbprint"
        ));
    }

    #[test]
    fn activating_twice_is_rejected() {
        let mut host = ServiceMock::new();
        host.activate().unwrap();

        assert!(matches!(
            host.activate(),
            Err(ActivationError::InvalidState(LifecycleState::Active))
        ));
    }

    #[test]
    fn dispose_is_idempotent_and_releases_ports() {
        let mut host = ServiceMock::builder()
            .shutdown_grace_period(Duration::from_millis(100))
            .build();
        let id = host.register(RestMock::http(0)).unwrap();
        host.activate().unwrap();
        let address = host.rest_mock(id).address();

        host.dispose();
        host.dispose();

        assert_eq!(host.state(), LifecycleState::Disposed);
        TcpListener::bind(address).unwrap();
        assert!(matches!(
            host.activate(),
            Err(ActivationError::InvalidState(LifecycleState::Disposed))
        ));
    }

    #[test]
    fn configuring_hosts_can_be_disposed() {
        let mut host = ServiceMock::new();
        host.register(RestMock::http(0)).unwrap();

        host.dispose();

        assert_eq!(host.state(), LifecycleState::Disposed);
    }
}
