use http::{HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use serde::Serialize;
use std::convert::TryInto;

/// The response returned by a [`RestMock`] when one of its mappings matches an incoming request.
///
/// Headers are kept in the order they were added; the same header name can appear more than
/// once. A descriptor without a body produces an empty body.
///
/// [`RestMock`]: crate::RestMock
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseDescriptor {
    status_code: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<Vec<u8>>,
}

// `servicemock` is a crate meant for testing - failures are most likely mistakes in the test
// itself. The builder methods below prefer panicking with a clear message to returning `Result`s,
// accepting the widest possible set of inputs and performing the fallible conversion internally.
impl ResponseDescriptor {
    /// Start building a `ResponseDescriptor` specifying the status code of the response.
    pub fn new<S>(s: S) -> Self
    where
        S: TryInto<StatusCode>,
        <S as TryInto<StatusCode>>::Error: std::fmt::Debug,
    {
        let status_code = s.try_into().expect("Failed to convert into status code.");
        Self {
            status_code,
            headers: vec![],
            body: None,
        }
    }

    pub(crate) fn from_parts(
        status_code: StatusCode,
        headers: Vec<(HeaderName, HeaderValue)>,
        body: Option<Vec<u8>>,
    ) -> Self {
        Self {
            status_code,
            headers,
            body,
        }
    }

    /// Append a header to the response.
    ///
    /// Existing headers with the same name are kept: both values are sent, in insertion order.
    pub fn append_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert into header name.");
        let value = value
            .try_into()
            .expect("Failed to convert into header value.");
        self.headers.push((key, value));
        self
    }

    /// Set a header, dropping any value previously set under the same name.
    pub fn insert_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert into header name.");
        let value = value
            .try_into()
            .expect("Failed to convert into header value.");
        self.headers.retain(|(name, _)| name != key);
        self.headers.push((key, value));
        self
    }

    /// Set the response body with bytes.
    ///
    /// No `Content-Type` is added: use [`insert_header`](#method.insert_header) if you need one.
    pub fn set_body_bytes<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the response body from a JSON-serializable value.
    ///
    /// It sets "Content-Type" to "application/json".
    pub fn set_body_json<B: Serialize>(self, body: B) -> Self {
        let body = serde_json::to_vec(&body).expect("Failed to convert into body.");
        self.set_body_bytes(body)
            .insert_header(http::header::CONTENT_TYPE, "application/json")
    }

    /// Set the response body to a string.
    ///
    /// It sets "Content-Type" to "text/plain".
    pub fn set_body_string<T: Into<String>>(self, body: T) -> Self {
        self.set_body_bytes(body.into().into_bytes())
            .insert_header(http::header::CONTENT_TYPE, "text/plain")
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Generate the wire response, emitting status, headers and body verbatim.
    pub(crate) fn generate_response(&self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(
            self.body.clone().unwrap_or_default(),
        )));
        *response.status_mut() = self.status_code;
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            headers.append(name, value.clone());
        }
        response
    }
}
