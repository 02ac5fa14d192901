//! Everything that can go wrong while configuring, activating or verifying a [`ServiceMock`].
//!
//! Configuration errors are raised eagerly, when a mapping is registered. Activation errors are
//! raised by [`ServiceMock::activate`]. Verification errors are only ever raised by the
//! `verify*` family of methods on [`RestMock`].
//!
//! A request that does not match any mapping is *not* an error: it is answered with a `404`
//! and recorded like any other request.
//!
//! [`ServiceMock`]: crate::ServiceMock
//! [`ServiceMock::activate`]: crate::ServiceMock::activate
//! [`RestMock`]: crate::RestMock
use std::net::SocketAddr;

pub use crate::verification::VerificationError;

/// A mistake in the way mappings or endpoints have been set up.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid route template `{template}`: {reason}")]
    TemplateSyntax { template: String, reason: String },
    #[error("Placeholder `{{{name}}}` appears more than once in route template `{template}`")]
    DuplicatePlaceholder { template: String, name: String },
    #[error("Parameter matcher `{name}` does not refer to any placeholder in route template `{template}`")]
    UnknownParameter { template: String, name: String },
    #[error("Placeholder `{{{name}}}` in route template `{template}` has no parameter matcher. Use `param_any(\"{name}\")` to accept any value")]
    MissingParameterMatcher { template: String, name: String },
    #[error("More than one body matcher was supplied for route template `{template}`")]
    DuplicateBodyMatcher { template: String },
    #[error("Mappings can only be changed while the service mock is being configured (current state: {state})")]
    MutationAfterActivation { state: crate::LifecycleState },
    #[error("Invalid response header `{name}`")]
    InvalidHeader { name: String },
    #[error("Invalid response status code {0}")]
    InvalidStatusCode(u16),
    #[error("Failed to serialize the response body for {method} {template}")]
    Serialization {
        method: http::Method,
        template: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The certificate-resolution collaborator could not find a certificate for a selector.
#[derive(Debug, thiserror::Error)]
#[error("No certificate found for selector `{selector}`")]
pub struct CertificateNotFoundError {
    pub selector: String,
}

impl CertificateNotFoundError {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

/// Failure to bring a [`ServiceMock`](crate::ServiceMock) from `Configuring` to `Active`.
///
/// Activation is all-or-nothing: when one of these is returned, no listener is left bound.
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("Activation requires a service mock in the `Configuring` state (current state: {0})")]
    InvalidState(crate::LifecycleState),
    #[error("Failed to bind endpoint `{endpoint}` on {address}")]
    Bind {
        endpoint: String,
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to bind the TLS certificate of endpoint `{endpoint}`")]
    CertificateBinding {
        endpoint: String,
        #[source]
        source: rustls::Error,
    },
    #[error("Failed to resolve the TLS certificate of endpoint `{endpoint}`")]
    CertificateNotFound {
        endpoint: String,
        #[source]
        source: CertificateNotFoundError,
    },
    #[error("Endpoint `{endpoint}` refers to certificate `{selector}` but no certificate resolver was configured")]
    MissingCertificateResolver { endpoint: String, selector: String },
    #[error("Failed to start the listener of endpoint `{endpoint}`")]
    Runtime {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
}

/// Umbrella error type, convenient when a test wants to `?` its way through setup,
/// activation and verification.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
}
