use crate::error::{ConfigError, Error};
use crate::matchers::Matcher;
use crate::request::{BodyPrintLimit, ReceivedRequest};
use crate::request_log::RequestLog;
use crate::response_descriptor::ResponseDescriptor;
use crate::route_mapping::{MappingHandle, RequestView, RouteMapping};
use crate::service_mock::CertificateSource;
use crate::verification::{Times, VerificationError};
use http::{Method, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use log::debug;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// Whether an endpoint speaks plain HTTP or HTTPS.
#[derive(Clone, Debug)]
pub enum Scheme {
    Http,
    Https(CertificateSource),
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https(_) => "https",
        }
    }
}

/// A mock REST endpoint: one listener with its own base path, mappings and request log.
///
/// A `RestMock` is configured first, handed over to a [`ServiceMock`] and finally brought to
/// life by [`ServiceMock::activate`]. Incoming requests are recorded, matched against the
/// mappings in registration order and answered with the response of the first mapping that
/// matches. Requests that match nothing get a `404`.
///
/// ### Example:
/// ```rust
/// use servicemock::{RestMock, ServiceMock, Times};
/// use servicemock::matchers::param_any;
/// use serde_json::json;
///
/// # fn main() -> Result<(), servicemock::Error> {
/// let mut host = ServiceMock::new();
/// let messages = host.register(RestMock::http(0).base_path("/api"))?;
/// host.rest_mock_mut(messages)?
///     .setup_get("/message/{id}", &[param_any("id")])?
///     .returns_json(&json!({"Text": "Hello"}))?;
/// host.activate()?;
///
/// // Nothing has been sent yet.
/// host.rest_mock(messages)
///     .verify_get("/message/{id}", &[param_any("id")], Times::never())?;
/// # Ok(())
/// # }
/// ```
///
/// [`ServiceMock`]: crate::ServiceMock
/// [`ServiceMock::activate`]: crate::ServiceMock::activate
#[derive(Debug)]
pub struct RestMock {
    scheme: Scheme,
    ip: IpAddr,
    port: u16,
    body_print_limit: BodyPrintLimit,
    routes: Routes,
    log: Arc<RequestLog>,
    bound_address: Option<SocketAddr>,
}

/// The part of an endpoint the listener needs to answer requests. Frozen at activation.
#[derive(Clone, Debug)]
pub(crate) struct Routes {
    base_path: String,
    default_response_status: StatusCode,
    mappings: Vec<RouteMapping>,
}

impl RestMock {
    /// A plain HTTP endpoint listening on `port`. Use `0` to let the OS pick a free port.
    pub fn http(port: u16) -> Self {
        Self::new(Scheme::Http, port)
    }

    /// An HTTPS endpoint listening on `port`, presenting the certificate from `certificate`.
    pub fn https(port: u16, certificate: impl Into<CertificateSource>) -> Self {
        Self::new(Scheme::Https(certificate.into()), port)
    }

    fn new(scheme: Scheme, port: u16) -> Self {
        Self {
            scheme,
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            body_print_limit: BodyPrintLimit::from_env(),
            routes: Routes {
                base_path: String::new(),
                default_response_status: StatusCode::OK,
                mappings: vec![],
            },
            log: Arc::new(RequestLog::new()),
            bound_address: None,
        }
    }

    /// Serve every mapping under `base_path`, e.g. `/api`.
    /// Requests outside of it never match.
    pub fn base_path(mut self, base_path: impl AsRef<str>) -> Self {
        let trimmed = base_path.as_ref().trim_matches('/');
        self.routes.base_path = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        };
        self
    }

    /// Status code used for mappings that have no response attached. Defaults to `200 OK`.
    pub fn default_response_status(mut self, status: StatusCode) -> Self {
        self.routes.default_response_status = status;
        self
    }

    /// The IP address to bind. Defaults to `127.0.0.1`.
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    /// How much of each request body is printed in diagnostics.
    pub fn body_print_limit(mut self, limit: BodyPrintLimit) -> Self {
        self.body_print_limit = limit;
        self
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// The address the endpoint listens on: the bound one once active, the configured one before.
    pub fn address(&self) -> SocketAddr {
        self.bound_address
            .unwrap_or_else(|| SocketAddr::new(self.ip, self.port))
    }

    /// The base uri of this endpoint, e.g. `http://127.0.0.1:4372/api`.
    pub fn uri(&self) -> String {
        format!(
            "{}://{}{}",
            self.scheme.as_str(),
            self.address(),
            self.routes.base_path
        )
    }

    pub fn mappings(&self) -> &[RouteMapping] {
        &self.routes.mappings
    }

    /// Register a mapping for `method` requests on `template`.
    ///
    /// Every placeholder in `template` must be covered by a parameter matcher; at most one body
    /// matcher is allowed. The returned handle attaches the response: without one, the endpoint
    /// answers with its default response status and an empty body.
    pub fn setup(
        &mut self,
        method: Method,
        template: &str,
        matchers: &[Matcher],
    ) -> Result<MappingHandle<'_>, ConfigError> {
        let mapping = RouteMapping::new(method, template, matchers)?;
        debug!("Registering {} on {}", mapping, self.uri());
        self.routes.mappings.push(mapping);
        let mapping = self
            .routes
            .mappings
            .last_mut()
            .expect("A mapping has just been pushed");
        Ok(MappingHandle::new(mapping))
    }

    pub fn setup_get(
        &mut self,
        template: &str,
        matchers: &[Matcher],
    ) -> Result<MappingHandle<'_>, ConfigError> {
        self.setup(Method::GET, template, matchers)
    }

    pub fn setup_post(
        &mut self,
        template: &str,
        matchers: &[Matcher],
    ) -> Result<MappingHandle<'_>, ConfigError> {
        self.setup(Method::POST, template, matchers)
    }

    pub fn setup_put(
        &mut self,
        template: &str,
        matchers: &[Matcher],
    ) -> Result<MappingHandle<'_>, ConfigError> {
        self.setup(Method::PUT, template, matchers)
    }

    pub fn setup_patch(
        &mut self,
        template: &str,
        matchers: &[Matcher],
    ) -> Result<MappingHandle<'_>, ConfigError> {
        self.setup(Method::PATCH, template, matchers)
    }

    pub fn setup_delete(
        &mut self,
        template: &str,
        matchers: &[Matcher],
    ) -> Result<MappingHandle<'_>, ConfigError> {
        self.setup(Method::DELETE, template, matchers)
    }

    /// Count the logged requests matching `method`, `template` and `matchers` and check the
    /// count against `times`.
    ///
    /// Matching follows the same rules used to select a response. The log is snapshotted when
    /// the call starts: requests still in flight are not waited for.
    pub fn verify(
        &self,
        method: Method,
        template: &str,
        matchers: &[Matcher],
        times: impl Into<Times>,
    ) -> Result<(), Error> {
        let times = times.into();
        let signature = RouteMapping::new(method, template, matchers)?;
        let received_requests = self.log.snapshot();
        let actual = received_requests
            .iter()
            .filter(|request| self.routes.signature_matches(&signature, request))
            .count() as u64;
        debug!(
            "Verifying {} on {}: {} matching request(s), expected {}",
            signature,
            self.uri(),
            actual,
            times
        );

        if times.contains(actual) {
            Ok(())
        } else {
            Err(VerificationError {
                endpoint: self.uri(),
                method: signature.method().clone(),
                template: signature.template().to_string(),
                matchers: signature.describe_matchers(),
                expected: times,
                actual,
                received_requests,
                body_print_limit: self.body_print_limit,
            }
            .into())
        }
    }

    pub fn verify_get(
        &self,
        template: &str,
        matchers: &[Matcher],
        times: impl Into<Times>,
    ) -> Result<(), Error> {
        self.verify(Method::GET, template, matchers, times)
    }

    pub fn verify_post(
        &self,
        template: &str,
        matchers: &[Matcher],
        times: impl Into<Times>,
    ) -> Result<(), Error> {
        self.verify(Method::POST, template, matchers, times)
    }

    pub fn verify_put(
        &self,
        template: &str,
        matchers: &[Matcher],
        times: impl Into<Times>,
    ) -> Result<(), Error> {
        self.verify(Method::PUT, template, matchers, times)
    }

    pub fn verify_patch(
        &self,
        template: &str,
        matchers: &[Matcher],
        times: impl Into<Times>,
    ) -> Result<(), Error> {
        self.verify(Method::PATCH, template, matchers, times)
    }

    pub fn verify_delete(
        &self,
        template: &str,
        matchers: &[Matcher],
        times: impl Into<Times>,
    ) -> Result<(), Error> {
        self.verify(Method::DELETE, template, matchers, times)
    }

    /// A snapshot of every request received so far, in arrival order.
    pub fn received_requests(&self) -> Vec<ReceivedRequest> {
        self.log.snapshot()
    }

    /// Render the request log, one line per request, joining the output of `projections`
    /// with `separator`. With no projections, method, uri and body are shown.
    ///
    /// ### Example:
    /// ```rust
    /// use servicemock::{ReceivedRequest, RestMock};
    ///
    /// let endpoint = RestMock::http(0);
    /// let sequence = |r: &ReceivedRequest| r.sequence.to_string();
    /// assert_eq!(endpoint.format_received_requests(" | ", &[&sequence]), "");
    /// ```
    pub fn format_received_requests(
        &self,
        separator: &str,
        projections: &[&dyn Fn(&ReceivedRequest) -> String],
    ) -> String {
        let method = |r: &ReceivedRequest| r.method.to_string();
        let uri = |r: &ReceivedRequest| r.uri.clone();
        let body = |r: &ReceivedRequest| r.body_text();
        let defaults: [&dyn Fn(&ReceivedRequest) -> String; 3] = [&method, &uri, &body];
        let projections = if projections.is_empty() {
            &defaults[..]
        } else {
            projections
        };

        self.log
            .snapshot()
            .iter()
            .map(|request| {
                projections
                    .iter()
                    .map(|project| project(request))
                    .collect::<Vec<_>>()
                    .join(separator)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Print [`format_received_requests`](#method.format_received_requests) to stdout, where
    /// the test harness captures it.
    pub fn print_received_requests(
        &self,
        separator: &str,
        projections: &[&dyn Fn(&ReceivedRequest) -> String],
    ) {
        println!("{}", self.format_received_requests(separator, projections));
    }

    pub(crate) fn routes(&self) -> Arc<Routes> {
        Arc::new(self.routes.clone())
    }

    pub(crate) fn log(&self) -> Arc<RequestLog> {
        self.log.clone()
    }

    pub(crate) fn set_bound_address(&mut self, address: Option<SocketAddr>) {
        self.bound_address = address;
    }
}

impl Routes {
    /// The path relative to the base path, if `path` is inside it.
    fn relative_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.base_path.is_empty() {
            return Some(path);
        }
        match path.strip_prefix(self.base_path.as_str()) {
            Some("") => Some("/"),
            Some(rest) if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }

    fn signature_matches(&self, signature: &RouteMapping, request: &ReceivedRequest) -> bool {
        self.select(request, std::slice::from_ref(signature))
            .is_some()
    }

    /// The first mapping in `mappings` matching `request`, in order.
    fn select<'m>(
        &self,
        request: &ReceivedRequest,
        mappings: &'m [RouteMapping],
    ) -> Option<&'m RouteMapping> {
        let path = self.relative_path(request.url.path())?;
        let query = request.query_pairs();
        let view = RequestView {
            method: &request.method,
            path,
            query: &query,
            body: &request.body,
        };
        mappings.iter().find(|mapping| mapping.matches(&view))
    }

    /// Record `request` in `log` and compute the response for it.
    pub(crate) fn respond(&self, request: ReceivedRequest, log: &RequestLog) -> Response<Full<Bytes>> {
        let response = match self.select(&request, &self.mappings) {
            Some(mapping) => {
                debug!("{} {} matched {}", request.method, request.uri, mapping);
                mapping
                    .response()
                    .cloned()
                    .unwrap_or_else(|| ResponseDescriptor::new(self.default_response_status))
            }
            None => {
                debug!("Got unexpected request:\n{}", request);
                ResponseDescriptor::new(StatusCode::NOT_FOUND)
            }
        };
        // The request must be visible in the log before the response leaves.
        log.append(request);
        response.generate_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::{body_string, param_any_of};
    use crate::request::test_request;

    fn respond(endpoint: &RestMock, method: Method, uri: &str, body: &[u8]) -> Response<Full<Bytes>> {
        endpoint
            .routes()
            .respond(test_request(method, uri, body), &endpoint.log)
    }

    #[test]
    fn first_registered_mapping_wins() {
        let mut endpoint = RestMock::http(0);
        endpoint
            .setup_get("/item/{id}", &[param_any_of::<u32>("id")])
            .unwrap()
            .returns_status(201, &[])
            .unwrap();
        endpoint
            .setup_get("/item/42", &[])
            .unwrap()
            .returns_status(202, &[])
            .unwrap();

        assert_eq!(respond(&endpoint, Method::GET, "/item/42", b"").status(), 201);
    }

    #[test]
    fn unmatched_requests_get_a_404_and_are_logged() {
        let endpoint = RestMock::http(0);

        let response = respond(&endpoint, Method::DELETE, "/nothing?here=1", b"x");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let logged = endpoint.received_requests();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].uri, "/nothing?here=1");
        assert_eq!(logged[0].body, b"x");
    }

    #[test]
    fn mappings_without_response_use_the_default_status() {
        let mut endpoint = RestMock::http(0).default_response_status(StatusCode::NO_CONTENT);
        endpoint.setup_get("/alive", &[]).unwrap();

        let response = respond(&endpoint, Method::GET, "/alive", b"");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn base_path_is_stripped_before_matching() {
        let mut endpoint = RestMock::http(0).base_path("api/v1/");
        endpoint.setup_get("/alive", &[]).unwrap();
        endpoint.setup_get("/", &[]).unwrap().returns_status(202, &[]).unwrap();

        assert_eq!(endpoint.uri(), "http://127.0.0.1:0/api/v1");
        assert_eq!(respond(&endpoint, Method::GET, "/api/v1/alive", b"").status(), 200);
        assert_eq!(respond(&endpoint, Method::GET, "/api/v1", b"").status(), 202);
        assert_eq!(respond(&endpoint, Method::GET, "/alive", b"").status(), 404);
        assert_eq!(respond(&endpoint, Method::GET, "/api/v10/alive", b"").status(), 404);
    }

    #[test]
    fn verify_counts_matching_requests_only() {
        let endpoint = RestMock::http(0);
        respond(&endpoint, Method::POST, "/store", b"Parrot");
        respond(&endpoint, Method::POST, "/store", b"Parrot");
        respond(&endpoint, Method::POST, "/store", b"Crow");

        endpoint
            .verify_post("/store", &[body_string("Parrot")], Times::exactly(2))
            .unwrap();
        endpoint
            .verify_post("/store", &[], Times::at_least(3))
            .unwrap();
        endpoint
            .verify_post("/store", &[body_string("Eagle")], Times::never())
            .unwrap();

        let err = endpoint
            .verify_get("/store", &[], Times::once())
            .unwrap_err();
        match err {
            Error::Verification(e) => {
                assert_eq!(e.actual, 0);
                assert_eq!(e.received_requests.len(), 3);
            }
            other => panic!("Expected a verification error, got {:?}", other),
        }
    }

    #[test]
    fn verify_rejects_invalid_signatures() {
        let endpoint = RestMock::http(0);

        let err = endpoint.verify_get("/item/{id}", &[], 1).unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingParameterMatcher { .. })
        ));
    }

    #[test]
    fn received_requests_can_be_projected() {
        let endpoint = RestMock::http(0);
        respond(&endpoint, Method::GET, "/a?x=1", b"");
        respond(&endpoint, Method::PUT, "/b", b"payload");

        assert_eq!(
            endpoint.format_received_requests(" ", &[]),
            "GET /a?x=1 \nPUT /b payload"
        );
        let path = |r: &ReceivedRequest| r.url.path().to_string();
        assert_eq!(endpoint.format_received_requests(",", &[&path]), "/a\n/b");
    }
}
