//! Compilation of route patterns such as `/message/{category}?msgid={id}&x=y`.
//!
//! The path is split on `/` into segments, each one either a literal or a `{name}` placeholder.
//! The optional query string is split on `&` into `key=value` pairs, where the value is either a
//! literal or a `{name}` placeholder. Literal path segments are compared case-sensitively.
//! Extra query parameters in an incoming request are ignored.
//!
//! Both sides are compared in decoded form: path segments are percent-decoded, query pairs are
//! decoded as `application/x-www-form-urlencoded` (so `+` is a space). `/greet/hello%20world`
//! and `?q=hello+world` therefore capture `hello world`.
use crate::error::ConfigError;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum QueryValue {
    Literal(String),
    Placeholder(String),
}

/// The compiled, immutable form of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    source: String,
    segments: Vec<Segment>,
    query: Vec<(String, QueryValue)>,
}

/// Values extracted from an incoming request, keyed by placeholder name.
pub(crate) type Captures = HashMap<String, String>;

impl RouteTemplate {
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let syntax_error = |reason: &str| ConfigError::TemplateSyntax {
            template: template.to_string(),
            reason: reason.to_string(),
        };
        let mut seen = HashSet::new();
        let mut register = |name: &str| {
            if seen.insert(name.to_string()) {
                Ok(())
            } else {
                Err(ConfigError::DuplicatePlaceholder {
                    template: template.to_string(),
                    name: name.to_string(),
                })
            }
        };

        let (path, query) = match template.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (template, None),
        };

        let mut segments = vec![];
        for raw in split_path(path) {
            match placeholder_name(raw).map_err(syntax_error)? {
                Some(name) => {
                    register(name)?;
                    segments.push(Segment::Placeholder(name.to_string()));
                }
                None => segments.push(Segment::Literal(decode_segment(raw).into_owned())),
            }
        }

        let mut query_pairs = vec![];
        let decoded = query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()))
            .into_iter()
            .flatten();
        for (key, value) in decoded {
            if key.is_empty() {
                return Err(syntax_error("query parameters must have a name"));
            }
            if key.contains(&['{', '}'][..]) {
                return Err(syntax_error("placeholders are not allowed in query parameter names"));
            }
            let value = match placeholder_name(&value).map_err(syntax_error)? {
                Some(name) => {
                    register(name)?;
                    QueryValue::Placeholder(name.to_string())
                }
                None => QueryValue::Literal(value.to_string()),
            };
            query_pairs.push((key.into_owned(), value));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
            query: query_pairs,
        })
    }

    /// The pattern this template was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of all placeholders, path segments first, in the order they appear.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        let in_path = self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        });
        let in_query = self.query.iter().filter_map(|(_, v)| match v {
            QueryValue::Placeholder(name) => Some(name.as_str()),
            QueryValue::Literal(_) => None,
        });
        in_path.chain(in_query)
    }

    /// Match `path` and the decoded `query` pairs of a request against this template,
    /// returning the captured placeholder values on success.
    pub(crate) fn captures(&self, path: &str, query: &[(String, String)]) -> Option<Captures> {
        let incoming: Vec<&str> = split_path(path).collect();
        if incoming.len() != self.segments.len() {
            return None;
        }

        let mut captures = Captures::new();
        for (segment, raw) in self.segments.iter().zip(incoming) {
            let value = decode_segment(raw);
            match segment {
                Segment::Literal(literal) if *literal != value => return None,
                Segment::Literal(_) => {}
                Segment::Placeholder(name) => {
                    captures.insert(name.clone(), value.into_owned());
                }
            }
        }

        for (key, expected) in &self.query {
            match expected {
                QueryValue::Literal(literal) => {
                    if !query.iter().any(|(k, v)| k == key && v == literal) {
                        return None;
                    }
                }
                QueryValue::Placeholder(name) => {
                    let (_, value) = query.iter().find(|(k, _)| k == key)?;
                    captures.insert(name.clone(), value.clone());
                }
            }
        }

        Some(captures)
    }
}

impl Display for RouteTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// "/" and "" have no segments, "/a/b" has two. Only the leading slash is stripped.
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    path.split('/').filter(move |_| !path.is_empty())
}

fn decode_segment(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw).decode_utf8_lossy()
}

/// `Ok(Some(name))` for `{name}`, `Ok(None)` for a literal, `Err` for stray braces.
fn placeholder_name(raw: &str) -> Result<Option<&str>, &'static str> {
    let opens = raw.matches('{').count();
    let closes = raw.matches('}').count();
    match (opens, closes) {
        (0, 0) => Ok(None),
        (1, 1) if raw.starts_with('{') && raw.ends_with('}') => {
            let name = &raw[1..raw.len() - 1];
            if name.is_empty() {
                Err("placeholders must have a name")
            } else {
                Ok(Some(name))
            }
        }
        (1, 1) => Err("a placeholder must span a whole path segment or query value"),
        _ => Err("unbalanced braces"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn literal_path_matches_itself_only() {
        let template = RouteTemplate::parse("/alive").unwrap();

        assert!(template.captures("/alive", &[]).is_some());
        assert!(template.captures("/Alive", &[]).is_none());
        assert!(template.captures("/alive/now", &[]).is_none());
        assert!(template.captures("/", &[]).is_none());
    }

    #[test]
    fn root_template_has_no_segments() {
        let template = RouteTemplate::parse("/").unwrap();

        assert!(template.captures("/", &[]).is_some());
        assert!(template.captures("", &[]).is_some());
        assert!(template.captures("/x", &[]).is_none());
    }

    #[test]
    fn path_placeholders_are_captured() {
        let template = RouteTemplate::parse("/message/{category}/{id}").unwrap();

        let captures = template.captures("/message/news/17", &[]).unwrap();
        assert_eq!(captures["category"], "news");
        assert_eq!(captures["id"], "17");
        assert_eq!(
            template.placeholders().collect::<Vec<_>>(),
            vec!["category", "id"]
        );
    }

    #[test]
    fn query_literals_must_be_present_and_extras_are_ignored() {
        let template = RouteTemplate::parse("/message/{category}?msgid={id}&x=y").unwrap();

        let captures = template
            .captures(
                "/message/news",
                &query(&[("extra", "1"), ("x", "y"), ("msgid", "abc")]),
            )
            .unwrap();
        assert_eq!(captures["category"], "news");
        assert_eq!(captures["id"], "abc");

        assert!(template
            .captures("/message/news", &query(&[("msgid", "abc"), ("x", "z")]))
            .is_none());
        assert!(template
            .captures("/message/news", &query(&[("x", "y")]))
            .is_none());
    }

    #[test]
    fn encoded_query_literals_match_decoded_pairs() {
        let template = RouteTemplate::parse("/search?q=hello%20world&tag=a+b&list=x%2Cy").unwrap();

        assert!(template
            .captures(
                "/search",
                &query(&[("q", "hello world"), ("tag", "a b"), ("list", "x,y")]),
            )
            .is_some());
        assert!(template
            .captures(
                "/search",
                &query(&[("q", "hello%20world"), ("tag", "a+b"), ("list", "x%2Cy")]),
            )
            .is_none());
    }

    #[test]
    fn path_segments_are_percent_decoded() {
        let template = RouteTemplate::parse("/greet/{name}").unwrap();
        let captures = template.captures("/greet/hello%20world", &[]).unwrap();
        assert_eq!(captures["name"], "hello world");

        let literal = RouteTemplate::parse("/files/my%20report").unwrap();
        assert!(literal.captures("/files/my%20report", &[]).is_some());
        assert!(literal.captures("/files/my report", &[]).is_some());
        assert!(literal.captures("/files/my+report", &[]).is_none());
    }

    #[test]
    fn duplicate_placeholders_are_rejected() {
        let err = RouteTemplate::parse("/a/{id}?other={id}").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePlaceholder { ref name, .. } if name == "id"));
    }

    #[test]
    fn malformed_braces_are_rejected() {
        for template in ["/a/{id", "/a/id}", "/a/{}", "/a/x{id}", "/a?{k}=v", "/a/{{id}}"] {
            let err = RouteTemplate::parse(template).unwrap_err();
            assert!(
                matches!(err, ConfigError::TemplateSyntax { .. }),
                "{} should be rejected, got {:?}",
                template,
                err
            );
        }
    }
}
