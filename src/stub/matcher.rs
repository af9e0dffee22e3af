//! Stub matchers (spec §3.1 "StubRegistry", §4.6 "Stubber matchers").

use std::sync::Arc;

use regex::Regex;

use crate::loader::wire::WireRequest;

/// One matching predicate against a composed [`WireRequest`] plus its realized
/// body bytes. [`crate::stub::StubRule`] and
/// [`crate::stub::IgnoreRule`] both AND together a list of these.
#[derive(Clone)]
pub enum Matcher {
    Method(reqwest::Method),
    UrlExact(String),
    UrlRegex(Arc<Regex>),
    BodyEquals(Vec<u8>),
    JsonEquals(serde_json::Value),
    /// A minimal RFC 6570 "simple string expansion" matcher: `{name}` segments in
    /// the template match any non-`/` path segment. Full RFC 6570 operators
    /// (`+`, `#`, `.`, `;`, `?`) are out of scope — URI-template expansion is an
    /// external-collaborator concern (spec §1), this is just enough to let a stub
    /// match a parameterized path like `/users/{id}`.
    UriTemplate(String),
    Closure(Arc<dyn Fn(&WireRequest, &[u8]) -> bool + Send + Sync>),
}

impl Matcher {
    pub fn method(method: reqwest::Method) -> Self {
        Matcher::Method(method)
    }

    pub fn url_exact(url: impl Into<String>) -> Self {
        Matcher::UrlExact(url.into())
    }

    pub fn url_regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::UrlRegex(Arc::new(Regex::new(pattern)?)))
    }

    pub fn body_equals(bytes: impl Into<Vec<u8>>) -> Self {
        Matcher::BodyEquals(bytes.into())
    }

    pub fn json_equals(value: serde_json::Value) -> Self {
        Matcher::JsonEquals(value)
    }

    pub fn uri_template(template: impl Into<String>) -> Self {
        Matcher::UriTemplate(template.into())
    }

    pub fn matches(&self, wire: &WireRequest, body: &[u8]) -> bool {
        match self {
            Matcher::Method(method) => &wire.method == method,
            Matcher::UrlExact(url) => wire.url.as_str() == url,
            Matcher::UrlRegex(regex) => regex.is_match(wire.url.as_str()),
            Matcher::BodyEquals(expected) => body == expected.as_slice(),
            Matcher::JsonEquals(expected) => {
                serde_json::from_slice::<serde_json::Value>(body)
                    .map(|actual| &actual == expected)
                    .unwrap_or(false)
            }
            Matcher::UriTemplate(template) => uri_template_matches(template, wire.url.path()),
            Matcher::Closure(f) => f(wire, body),
        }
    }
}

fn uri_template_matches(template: &str, path: &str) -> bool {
    let template_segments: Vec<&str> = template.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    if template_segments.len() != path_segments.len() {
        return false;
    }
    template_segments.iter().zip(path_segments.iter()).all(|(t, p)| {
        (t.starts_with('{') && t.ends_with('}')) || t == p
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_template_matches_single_segment_placeholder() {
        assert!(uri_template_matches("/users/{id}", "/users/42"));
        assert!(!uri_template_matches("/users/{id}", "/users/42/posts"));
        assert!(!uri_template_matches("/users/{id}", "/teams/42"));
    }

    #[test]
    fn uri_template_matches_literal_segments_exactly() {
        assert!(uri_template_matches("/v1/users/{id}", "/v1/users/7"));
        assert!(!uri_template_matches("/v1/users/{id}", "/v2/users/7"));
    }
}
