//! Header merge helpers shared by request composition and the loader.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Merges `extra` into a clone of `base`; entries in `extra` win on name collision,
/// matching the client→request header precedence used during wire composition.
pub fn merge_headers(mut base: HeaderMap, extra: &HeaderMap) -> HeaderMap {
    apply_extra_headers(&mut base, extra);
    base
}

/// In-place version of [`merge_headers`], also used to apply a retry strategy's
/// [`crate::validator::retry_strategy::RetryStrategy::headers_to_apply`] onto the
/// next attempt's request headers.
pub fn apply_extra_headers(base: &mut HeaderMap, extra: &HeaderMap) {
    for (name, value) in extra {
        base.insert(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_headers_overrides_existing_values() {
        let mut base = HeaderMap::new();
        base.insert(
            HeaderName::from_bytes(b"x-custom").unwrap(),
            HeaderValue::from_str("a,b").unwrap(),
        );

        let mut extra = HeaderMap::new();
        extra.insert(
            HeaderName::from_bytes(b"x-custom").unwrap(),
            HeaderValue::from_str("c").unwrap(),
        );

        let merged = merge_headers(base, &extra);
        assert_eq!(merged.get("x-custom").unwrap(), "c");
    }

    #[test]
    fn apply_extra_headers_mutates_in_place() {
        let mut base = HeaderMap::new();
        let mut extra = HeaderMap::new();
        extra.insert(reqwest::header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        apply_extra_headers(&mut base, &extra);
        assert_eq!(base.get(reqwest::header::AUTHORIZATION).unwrap(), "Bearer xyz");
    }
}
