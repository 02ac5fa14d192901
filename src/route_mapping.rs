use crate::error::ConfigError;
use crate::matchers::{BodyMatcher, Matcher, ParameterMatcher};
use crate::response_descriptor::ResponseDescriptor;
use crate::route_template::RouteTemplate;
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// The parts of an incoming request that mappings are matched against.
///
/// `path` is relative to the endpoint base path; `query` holds the decoded query pairs.
pub(crate) struct RequestView<'a> {
    pub(crate) method: &'a Method,
    pub(crate) path: &'a str,
    pub(crate) query: &'a [(String, String)],
    pub(crate) body: &'a [u8],
}

/// A configured rule: when a request satisfies method, template, parameter and body matchers,
/// answer with `response` (or with the endpoint default when no response has been attached).
#[derive(Clone, Debug)]
pub struct RouteMapping {
    method: Method,
    template: RouteTemplate,
    parameters: Vec<ParameterMatcher>,
    body: Option<BodyMatcher>,
    response: Option<ResponseDescriptor>,
}

impl RouteMapping {
    /// Compile `template` and check that `matchers` and placeholders agree with each other:
    /// every matcher must name a placeholder and every placeholder must have a matcher.
    pub(crate) fn new(
        method: Method,
        template: &str,
        matchers: &[Matcher],
    ) -> Result<Self, ConfigError> {
        let template = RouteTemplate::parse(template)?;
        let mut parameters = vec![];
        let mut body = None;
        for matcher in matchers {
            match matcher {
                Matcher::Parameter(p) => {
                    if !template.placeholders().any(|name| name == p.name()) {
                        return Err(ConfigError::UnknownParameter {
                            template: template.to_string(),
                            name: p.name().to_string(),
                        });
                    }
                    parameters.push(p.clone());
                }
                Matcher::Body(b) => {
                    if body.replace(b.clone()).is_some() {
                        return Err(ConfigError::DuplicateBodyMatcher {
                            template: template.to_string(),
                        });
                    }
                }
            }
        }
        if let Some(name) = template
            .placeholders()
            .find(|name| !parameters.iter().any(|p| p.name() == *name))
        {
            return Err(ConfigError::MissingParameterMatcher {
                template: template.to_string(),
                name: name.to_string(),
            });
        }

        Ok(Self {
            method,
            template,
            parameters,
            body,
            response: None,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &RouteTemplate {
        &self.template
    }

    pub fn response(&self) -> Option<&ResponseDescriptor> {
        self.response.as_ref()
    }

    /// Method, template, parameter matchers and body matcher, in this order.
    pub(crate) fn matches(&self, request: &RequestView<'_>) -> bool {
        if request.method != self.method {
            return false;
        }
        let captures = match self.template.captures(request.path, request.query) {
            Some(captures) => captures,
            None => return false,
        };
        let parameters_match = self.parameters.iter().all(|p| {
            captures
                .get(p.name())
                .map_or(false, |value| p.matches(value))
        });
        parameters_match && self.body.as_ref().map_or(true, |b| b.matches(request.body))
    }

    /// Human-readable description of every matcher, for diagnostics.
    pub(crate) fn describe_matchers(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(ToString::to_string)
            .chain(self.body.iter().map(ToString::to_string))
            .collect()
    }
}

impl Display for RouteMapping {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}

/// Returned by [`RestMock::setup`](crate::RestMock::setup) to attach a response to the
/// mapping that was just registered.
///
/// Every `returns*` call replaces the response set by the previous one.
pub struct MappingHandle<'a> {
    mapping: &'a mut RouteMapping,
}

impl<'a> MappingHandle<'a> {
    pub(crate) fn new(mapping: &'a mut RouteMapping) -> Self {
        Self { mapping }
    }

    pub fn returns(&mut self, response: ResponseDescriptor) -> &mut Self {
        self.mapping.response = Some(response);
        self
    }

    /// Respond with `200 OK`, `body` serialized as JSON and `Content-Type: application/json`.
    pub fn returns_json<T: Serialize>(&mut self, body: &T) -> Result<&mut Self, ConfigError> {
        let body = serde_json::to_vec(body).map_err(|source| ConfigError::Serialization {
            method: self.mapping.method.clone(),
            template: self.mapping.template.to_string(),
            source,
        })?;
        let content_type = HeaderValue::from_static("application/json");
        Ok(self.returns(ResponseDescriptor::from_parts(
            StatusCode::OK,
            vec![(http::header::CONTENT_TYPE, content_type)],
            Some(body),
        )))
    }

    /// Respond with `200 OK`, `body` as is and `Content-Type: text/plain`.
    pub fn returns_text(&mut self, body: impl Into<String>) -> &mut Self {
        let content_type = HeaderValue::from_static("text/plain");
        self.returns(ResponseDescriptor::from_parts(
            StatusCode::OK,
            vec![(http::header::CONTENT_TYPE, content_type)],
            Some(body.into().into_bytes()),
        ))
    }

    /// Respond with `status`, the given headers (in order, duplicates allowed) and no body.
    pub fn returns_status(
        &mut self,
        status: u16,
        headers: &[(&str, &str)],
    ) -> Result<&mut Self, ConfigError> {
        let status =
            StatusCode::from_u16(status).map_err(|_| ConfigError::InvalidStatusCode(status))?;
        let headers = headers
            .iter()
            .map(|(name, value)| {
                let invalid = || ConfigError::InvalidHeader {
                    name: name.to_string(),
                };
                Ok::<_, ConfigError>((
                    HeaderName::try_from(*name).map_err(|_| invalid())?,
                    HeaderValue::try_from(*value).map_err(|_| invalid())?,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(self.returns(ResponseDescriptor::from_parts(status, headers, None)))
    }
}
