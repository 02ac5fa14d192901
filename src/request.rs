use std::fmt;
use std::time::SystemTime;

use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use url::Url;

pub const BODY_PRINT_LIMIT: usize = 10_000;

/// Specifies limitations on printing request bodies when logging requests. For some endpoints
/// the bodies may be too large to reasonably print and it may be desirable to limit them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyPrintLimit {
    /// Maximum length of a body to print in bytes.
    Limited(usize),
    /// There is no limit to the size of a body that may be printed.
    Unlimited,
}

impl BodyPrintLimit {
    /// The limit configured through `SERVICEMOCK_BODY_PRINT_LIMIT`, if any, or the default one.
    pub(crate) fn from_env() -> Self {
        match std::env::var("SERVICEMOCK_BODY_PRINT_LIMIT")
            .ok()
            .and_then(|x| x.parse::<usize>().ok())
        {
            Some(limit) => BodyPrintLimit::Limited(limit),
            None => BodyPrintLimit::Limited(BODY_PRINT_LIMIT),
        }
    }
}

/// A request received by a [`RestMock`], as stored in its request log.
///
/// `uri` is the path and query string exactly as they appeared on the request line, while `url`
/// is its parsed counterpart (with a placeholder `localhost` origin when the request did not
/// carry an absolute URI). `sequence` is the zero-based arrival position within the log and
/// `received_at` is stamped together with it, so both orders agree.
///
/// [`RestMock`]: crate::RestMock
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: Method,
    pub uri: String,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub received_at: SystemTime,
    pub sequence: u64,
}

impl ReceivedRequest {
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The body as text, replacing invalid UTF-8 sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The decoded query pairs, in the order they appear in the request.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub(crate) async fn from_hyper(
        request: hyper::Request<hyper::body::Incoming>,
    ) -> Result<ReceivedRequest, hyper::Error> {
        let (parts, body) = request.into_parts();
        let uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let body = body.collect().await?.to_bytes();

        Ok(Self {
            url: parse_url(&uri),
            uri,
            method: parts.method,
            headers: parts.headers,
            body: body.to_vec(),
            received_at: SystemTime::now(),
            sequence: 0,
        })
    }

    pub(crate) fn print_with_limit(
        &self,
        mut buffer: impl fmt::Write,
        body_print_limit: BodyPrintLimit,
    ) -> fmt::Result {
        writeln!(buffer, "{} {}", self.method, self.uri)?;
        for name in self.headers.keys() {
            let values = self
                .headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()))
                .collect::<Vec<_>>();
            let values = values.join(",");
            writeln!(buffer, "{}: {}", name, values)?;
        }

        match body_print_limit {
            BodyPrintLimit::Limited(limit) if self.body.len() > limit => {
                // Back off to the closest char boundary at or before the limit.
                let truncated = (limit.saturating_sub(3)..=limit)
                    .rev()
                    .find_map(|end| std::str::from_utf8(&self.body[..end]).ok());
                match truncated {
                    Some(truncated) => {
                        writeln!(buffer, "{}", truncated)?;
                        writeln!(
                            buffer,
                            "We truncated the body because it was too large: {} bytes (limit: {} bytes)",
                            self.body.len(),
                            limit
                        )?;
                        writeln!(
                            buffer,
                            "Increase this limit by setting `SERVICEMOCK_BODY_PRINT_LIMIT`, or calling `RestMock::body_print_limit` when configuring your endpoint"
                        )
                    }
                    None => writeln!(
                        buffer,
                        "Body is likely binary (invalid utf-8) size is {} bytes",
                        self.body.len()
                    ),
                }
            }
            _ => {
                if let Ok(body) = std::str::from_utf8(&self.body) {
                    writeln!(buffer, "{}", body)
                } else {
                    writeln!(
                        buffer,
                        "Body is likely binary (invalid utf-8) size is {} bytes",
                        self.body.len()
                    )
                }
            }
        }
    }
}

impl fmt::Display for ReceivedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print_with_limit(f, BodyPrintLimit::Limited(BODY_PRINT_LIMIT))
    }
}

fn parse_url(uri: &str) -> Url {
    let base = Url::parse("http://localhost/").expect("A static URL is always valid");
    // `join` resolves a leading "//" as a host; make sure the request target stays a path.
    let relative = if uri.starts_with("//") {
        format!("/{}", uri.trim_start_matches('/'))
    } else {
        uri.to_string()
    };
    base.join(&relative).unwrap_or(base)
}

#[cfg(test)]
pub(crate) fn test_request(method: Method, uri: &str, body: &[u8]) -> ReceivedRequest {
    ReceivedRequest {
        method,
        uri: uri.to_string(),
        url: parse_url(uri),
        headers: HeaderMap::new(),
        body: body.to_vec(),
        received_at: SystemTime::now(),
        sequence: 0,
    }
}
