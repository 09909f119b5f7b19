//! Cache key derivation: a *base* key from
//! (method, scheme, host, port, path, query, fragment) — fragments and
//! queries are NOT stripped — and a *content* key that additionally mixes
//! in the values of the headers named by the current `VaryIndex`, each a
//! case-insensitive lookup against the request with an explicit
//! absent-sentinel (`headers::ABSENT`).

use url::Url;

use crate::headers::HeaderMap;

pub fn base_key(method: &str, url: &Url) -> String {
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    let port = url.port_or_known_default().unwrap_or(0);
    format!(
        "{method}:{scheme}://{host}:{port}{path}?{query}#{fragment}",
        method = method,
        scheme = url.scheme(),
        host = host,
        port = port,
        path = url.path(),
        query = url.query().unwrap_or(""),
        fragment = url.fragment().unwrap_or(""),
    )
}

/// Content key for a base key given the ordered `Vary` header names seen on
/// the most recent cacheable response, looked up against `headers`.
pub fn content_key(base: &str, vary_names: &[String], headers: &HeaderMap) -> String {
    if vary_names.is_empty() {
        return base.to_owned();
    }
    let mut key = String::from(base);
    for name in vary_names {
        key.push('\u{1}');
        key.push_str(&name.to_ascii_lowercase());
        key.push('=');
        key.push_str(&headers.get_or_absent(name));
    }
    key
}

/// Splits a `Vary` (or any comma-separated header-name list) header value
/// into trimmed, non-empty names, preserving order.
pub fn split_header_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn different_queries_produce_different_keys() {
        let a = base_key("GET", &url("http://x.com/p?a=1"));
        let b = base_key("GET", &url("http://x.com/p?a=2"));
        assert_ne!(a, b);
    }

    #[test]
    fn different_fragments_produce_different_keys() {
        let a = base_key("GET", &url("http://x.com/p#a"));
        let b = base_key("GET", &url("http://x.com/p#b"));
        assert_ne!(a, b);
    }

    #[test]
    fn host_is_lowercased() {
        let a = base_key("GET", &url("http://X.com/p"));
        let b = base_key("GET", &url("http://x.com/p"));
        assert_eq!(a, b);
    }

    #[test]
    fn content_key_distinguishes_present_and_absent_vary_header() {
        let base = "k";
        let names = vec!["Accept".to_owned()];
        let mut with_header = HeaderMap::new();
        with_header.insert("Accept", "application/json");
        let without_header = HeaderMap::new();
        assert_ne!(
            content_key(base, &names, &with_header),
            content_key(base, &names, &without_header)
        );
    }

    #[test]
    fn split_header_list_trims_and_skips_empty() {
        assert_eq!(
            split_header_list(" Accept ,  X-Foo ,,Bar"),
            vec!["Accept".to_owned(), "X-Foo".to_owned(), "Bar".to_owned()]
        );
    }
}
