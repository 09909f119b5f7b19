use std::collections::BTreeMap;

use url::Url;

use crate::headers::HeaderMap;

/// An in-flight request, mutated in place as it passes through the
/// pipeline: rewritten URL from `RedirectManager`, injected cookies from
/// `CookieManager`, synthesized conditional headers from `CacheManager`.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub headers: HeaderMap,
    pub cookies: BTreeMap<String, String>,
    /// Set by `CacheManager::lookup` to tell the pipeline whether a fresh
    /// response may later be stored — `Cache-Control: no-cache` on the
    /// request disables lookup but still permits storage.
    pub(crate) update_cache_allowed: bool,
}

impl Request {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url,
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
            update_cache_allowed: true,
        }
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}
