//! A collection of predicates to constrain which requests a mapping applies to.
//!
//! There are two families:
//! - parameter matchers, evaluated against the value captured by a `{name}` placeholder in the
//!   route template (either a path segment or a query parameter);
//! - body matchers, evaluated against the raw body of the incoming request.
//!
//! Both are represented as tagged variants rather than opaque closures: the matching engine
//! treats every kind uniformly and each of them can be printed in diagnostics.
//! Closures are still supported through the `Predicate` variants.
//!
//! All constructors return a [`Matcher`], so parameter and body matchers can be mixed freely in
//! the slice passed to [`RestMock::setup`] or [`RestMock::verify`]:
//!
//! ```rust
//! use servicemock::matchers::{body_string, param_any_of};
//!
//! let matchers = [param_any_of::<u32>("id"), body_string("ping")];
//! assert_eq!(matchers.len(), 2);
//! ```
//!
//! [`RestMock::setup`]: crate::RestMock::setup
//! [`RestMock::verify`]: crate::RestMock::verify
use assert_json_diff::{assert_json_matches_no_panic, CompareMode};
use log::debug;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Either a [`ParameterMatcher`] or a [`BodyMatcher`].
#[derive(Clone, Debug)]
pub enum Matcher {
    Parameter(ParameterMatcher),
    Body(BodyMatcher),
}

impl From<ParameterMatcher> for Matcher {
    fn from(matcher: ParameterMatcher) -> Self {
        Matcher::Parameter(matcher)
    }
}

impl From<BodyMatcher> for Matcher {
    fn from(matcher: BodyMatcher) -> Self {
        Matcher::Body(matcher)
    }
}

impl Display for Matcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Parameter(p) => Display::fmt(p, f),
            Matcher::Body(b) => Display::fmt(b, f),
        }
    }
}

/// A named predicate over the string captured by a route template placeholder.
#[derive(Clone, Debug)]
pub struct ParameterMatcher {
    name: String,
    kind: ParameterMatch,
}

/// The different strategies a [`ParameterMatcher`] can use.
#[derive(Clone)]
pub enum ParameterMatch {
    /// The captured value must be equal to this one.
    Exact(String),
    /// Any value is accepted.
    Any,
    /// The captured value must parse as the type named `type_name`.
    TypedAny {
        type_name: &'static str,
        check: fn(&str) -> bool,
    },
    /// The captured value must match the regular expression.
    Regex(Regex),
    /// Arbitrary caller-supplied predicate.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Debug for ParameterMatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParameterMatch::Exact(v) => f.debug_tuple("Exact").field(v).finish(),
            ParameterMatch::Any => f.write_str("Any"),
            ParameterMatch::TypedAny { type_name, .. } => {
                f.debug_tuple("TypedAny").field(type_name).finish()
            }
            ParameterMatch::Regex(r) => f.debug_tuple("Regex").field(&r.as_str()).finish(),
            // Closures do not implement `Debug`.
            ParameterMatch::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl ParameterMatcher {
    pub fn new(name: impl Into<String>, kind: ParameterMatch) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// The placeholder this matcher is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ParameterMatch {
        &self.kind
    }

    pub fn matches(&self, value: &str) -> bool {
        match &self.kind {
            ParameterMatch::Exact(expected) => expected == value,
            ParameterMatch::Any => true,
            ParameterMatch::TypedAny { check, .. } => check(value),
            ParameterMatch::Regex(r) => r.is_match(value),
            ParameterMatch::Predicate(p) => p(value),
        }
    }
}

impl Display for ParameterMatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParameterMatch::Exact(v) => write!(f, "{{{}}} == \"{}\"", self.name, v),
            ParameterMatch::Any => write!(f, "{{{}}} is any value", self.name),
            ParameterMatch::TypedAny { type_name, .. } => {
                write!(f, "{{{}}} is any {}", self.name, type_name)
            }
            ParameterMatch::Regex(r) => write!(f, "{{{}}} matches /{}/", self.name, r.as_str()),
            ParameterMatch::Predicate(_) => write!(f, "{{{}}} satisfies a predicate", self.name),
        }
    }
}

fn parses_as<T: FromStr>(value: &str) -> bool {
    value.parse::<T>().is_ok()
}

/// Match when the placeholder `name` captured exactly `value`.
pub fn param<N, V>(name: N, value: V) -> Matcher
where
    N: Into<String>,
    V: Into<String>,
{
    ParameterMatcher::new(name, ParameterMatch::Exact(value.into())).into()
}

/// Accept any value for the placeholder `name`.
pub fn param_any<N: Into<String>>(name: N) -> Matcher {
    ParameterMatcher::new(name, ParameterMatch::Any).into()
}

/// Accept any value for the placeholder `name` that can be parsed as a `T`.
///
/// ### Example:
/// ```rust
/// use servicemock::matchers::{param_any_of, Matcher};
/// use std::net::Ipv4Addr;
///
/// let Matcher::Parameter(matcher) = param_any_of::<Ipv4Addr>("ip") else { unreachable!() };
/// assert!(matcher.matches("127.0.0.1"));
/// assert!(!matcher.matches("localhost"));
/// ```
pub fn param_any_of<T: FromStr>(name: impl Into<String>) -> Matcher {
    ParameterMatcher::new(
        name,
        ParameterMatch::TypedAny {
            type_name: std::any::type_name::<T>(),
            check: parses_as::<T>,
        },
    )
    .into()
}

/// Match when the value captured by `name` matches the regular expression `pattern`.
///
/// Panics if `pattern` is not a valid regular expression.
pub fn param_regex(name: impl Into<String>, pattern: &str) -> Matcher {
    let regex = Regex::new(pattern).expect("Failed to create regex for parameter matcher");
    ParameterMatcher::new(name, ParameterMatch::Regex(regex)).into()
}

/// Match when `predicate` returns `true` for the value captured by `name`.
pub fn param_matching<F>(name: impl Into<String>, predicate: F) -> Matcher
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    ParameterMatcher::new(name, ParameterMatch::Predicate(Arc::new(predicate))).into()
}

/// A predicate over the raw body of an incoming request.
#[derive(Clone)]
pub enum BodyMatcher {
    /// Structural JSON equality: key order and whitespace are irrelevant.
    Json(Value),
    /// The body must be exactly this UTF-8 string.
    Text(String),
    /// The body must be exactly these bytes.
    Bytes(Vec<u8>),
    Predicate(Arc<dyn Fn(&[u8]) -> bool + Send + Sync>),
}

impl Debug for BodyMatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BodyMatcher::Json(v) => f.debug_tuple("Json").field(v).finish(),
            BodyMatcher::Text(t) => f.debug_tuple("Text").field(t).finish(),
            BodyMatcher::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            BodyMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl Display for BodyMatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BodyMatcher::Json(v) => write!(f, "body is JSON {}", v),
            BodyMatcher::Text(t) => write!(f, "body == \"{}\"", t),
            BodyMatcher::Bytes(b) => write!(f, "body is {} given bytes", b.len()),
            BodyMatcher::Predicate(_) => f.write_str("body satisfies a predicate"),
        }
    }
}

impl BodyMatcher {
    pub fn matches(&self, body: &[u8]) -> bool {
        match self {
            BodyMatcher::Json(expected) => match serde_json::from_slice::<Value>(body) {
                Ok(actual) => {
                    let config = assert_json_diff::Config::new(CompareMode::Strict);
                    assert_json_matches_no_panic(&actual, expected, config).is_ok()
                }
                Err(e) => {
                    debug!("Request body is not valid JSON: {}", e);
                    false
                }
            },
            BodyMatcher::Text(expected) => body == expected.as_bytes(),
            BodyMatcher::Bytes(expected) => body == expected.as_slice(),
            BodyMatcher::Predicate(p) => p(body),
        }
    }
}

/// Match when the request body is structurally equal to the JSON serialization of `body`.
///
/// Panics if `body` cannot be serialized to JSON.
///
/// ### Example:
/// ```rust
/// use servicemock::matchers::{body_json, Matcher};
/// use serde_json::json;
///
/// let Matcher::Body(matcher) = body_json(json!({"a": 1, "b": [true]})) else { unreachable!() };
/// assert!(matcher.matches(br#"{ "b": [true], "a": 1 }"#));
/// assert!(!matcher.matches(br#"{"a": 1}"#));
/// ```
pub fn body_json<T: Serialize>(body: T) -> Matcher {
    let value = serde_json::to_value(body).expect("Failed to serialize JSON body");
    BodyMatcher::Json(value).into()
}

/// Match when the request body is exactly `body`, compared as text.
pub fn body_string<T: Into<String>>(body: T) -> Matcher {
    BodyMatcher::Text(body.into()).into()
}

pub fn body_bytes<T: Into<Vec<u8>>>(body: T) -> Matcher {
    BodyMatcher::Bytes(body.into()).into()
}

/// Match when `predicate` returns `true` for the raw request body.
pub fn body_matching<F>(predicate: F) -> Matcher
where
    F: Fn(&[u8]) -> bool + Send + Sync + 'static,
{
    BodyMatcher::Predicate(Arc::new(predicate)).into()
}
