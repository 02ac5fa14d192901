#![allow(clippy::needless_doctest_main)]
//! `servicemock` provides programmable HTTP(S) service doubles to perform black-box testing of
//! applications that talk to other services.
//!
//! You describe the endpoints your application depends on, tell each of them how to answer,
//! start them, exercise your application and finally check which requests they received.
//!
//! # Table of Contents
//! 1. [Getting started](#getting-started)
//! 2. [Route templates and matchers](#route-templates-and-matchers)
//! 3. [Verification](#verification)
//! 4. [HTTPS](#https)
//! 5. [Lifecycle and test isolation](#lifecycle-and-test-isolation)
//! 6. [Runtime compatibility](#runtime-compatibility)
//!
//! ## Getting started
//! ```rust
//! use servicemock::{RestMock, ServiceMock, Times};
//! use servicemock::matchers::{body_json, param_any_of};
//! use serde_json::json;
//!
//! #[async_std::main]
//! async fn main() -> Result<(), servicemock::Error> {
//!     let mut host = ServiceMock::new();
//!     // Port 0: let the OS pick a free port.
//!     let messages = host.register(RestMock::http(0).base_path("/api"))?;
//!
//!     let endpoint = host.rest_mock_mut(messages)?;
//!     endpoint
//!         .setup_get("/message/{id}", &[param_any_of::<u32>("id")])?
//!         .returns_json(&json!({"Text": "Hello"}))?;
//!     endpoint
//!         .setup_post("/message", &[body_json(json!({"Text": "Parrot"}))])?
//!         .returns_status(201, &[("X-Message-Mode", "normal")])?;
//!
//!     // Bind the listeners: from now on mappings are frozen.
//!     host.activate()?;
//!     let uri = host.rest_mock(messages).uri();
//!
//!     let response = reqwest::get(format!("{uri}/message/42")).await.unwrap();
//!     assert_eq!(response.status(), 200);
//!
//!     // Requests that do not match any mapping get a 404.
//!     let response = reqwest::get(format!("{uri}/message/not-a-number")).await.unwrap();
//!     assert_eq!(response.status(), 404);
//!
//!     host.rest_mock(messages)
//!         .verify_get("/message/{id}", &[param_any_of::<u32>("id")], Times::once())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Route templates and matchers
//!
//! Mappings are registered against a route template, e.g. `/message/{category}?msgid={id}`:
//! path segments and query values are either literals or named placeholders. Every placeholder
//! must be covered by a parameter matcher (use [`matchers::param_any`] to accept any value)
//! and at most one body matcher can be supplied. Check the [`matchers`] module for the complete
//! list.
//!
//! Mappings are tried in registration order: the first one matching a request answers it.
//!
//! ## Verification
//!
//! Every request received by an endpoint is recorded, matched or not.
//! [`RestMock::verify`] counts the recorded requests matching a signature and compares the
//! count against a [`Times`]. When the count is off, the returned [`VerificationError`] lists
//! what the endpoint actually received.
//!
//! ## HTTPS
//!
//! [`RestMock::https`] takes a [`CertificateSource`]: either a [`CertificateHandle`] or a
//! selector resolved at activation time by the [`CertificateResolver`] configured with
//! [`ServiceMockBuilder::certificate_resolver`]. [`tls_certs::TestCertificates`] generates
//! throwaway certificates for tests.
//!
//! ## Lifecycle and test isolation
//!
//! A [`ServiceMock`] goes through three states: see [`LifecycleState`]. Activation binds
//! every endpoint or none of them. Dropping a [`ServiceMock`] stops its listeners and frees
//! their ports, even when the test panicked.
//!
//! Each [`ServiceMock`] owns its listeners and shares nothing with other instances: tests
//! using them can run in parallel.
//!
//! ## Runtime compatibility
//!
//! Listeners run on their own threads: `servicemock` can be used with [`async_std`],
//! [`tokio`] or no async runtime at all.
//!
//! [`async_std`]: https://docs.rs/async-std/
//! [`tokio`]: https://docs.rs/tokio/
pub mod error;
pub mod http;
pub mod matchers;
mod request;
mod request_log;
mod response_descriptor;
mod rest_mock;
mod route_mapping;
mod route_template;
mod service_mock;
pub mod tls_certs;
mod verification;

pub use error::{ActivationError, CertificateNotFoundError, ConfigError, Error};
pub use request::{BodyPrintLimit, ReceivedRequest};
pub use response_descriptor::ResponseDescriptor;
pub use rest_mock::{RestMock, Scheme};
pub use route_mapping::{MappingHandle, RouteMapping};
pub use route_template::RouteTemplate;
pub use service_mock::{
    CertificateHandle, CertificateResolver, CertificateSource, LifecycleState, RestMockId,
    ServiceMock, ServiceMockBuilder,
};
pub use verification::{Times, VerificationError};
