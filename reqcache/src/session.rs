//! `Session`: composes the three managers around one [`Transport`] call.
//!
//! Grounded in `examples/original_source/dogbutler/sessions.py`'s
//! `Session.request` (redirect → cookie → cache-lookup → transport →
//! redirect-record → 304-handling → cookie-ingest → cache-store), expressed
//! here as a `Session<T: Transport>` generic over the underlying HTTP
//! client rather than a subclass of a concrete one (`requests.Session` in
//! the original) — matching `HttpCache<T: CacheManager>`'s
//! generic-over-collaborator shape.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;
use url::Url;

use crate::cache::CacheManager;
use crate::clock::{Clock, SystemClock};
use crate::cookie::CookieManager;
use crate::headers::HeaderMap;
use crate::redirect::RedirectManager;
use crate::request::Request;
use crate::response::Response;
use crate::store::KeyValueStore;
use crate::Result;

/// The single capability this crate consumes from an HTTP client: execute
/// one request and report the response, including whatever transport-level
/// redirects it already followed.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    async fn execute(&self, request: &Request) -> Result<Response>;
}

/// An external fan-out sink for the final response of every request
/// (`examples/original_source/dogbutler/sessions.py`:
/// `if queue: queue.put(response)`). Has no effect on cache/cookie/redirect
/// semantics.
pub trait ResponseSink: std::fmt::Debug + Send + Sync {
    fn push(&self, response: &Response);
}

/// Extra per-call inputs recognized by the pipeline: `headers`, `cookies`,
/// and a `queue` sink. Anything transport-specific beyond these
/// passes through the `T: Transport` type's own request-building surface.
#[derive(Debug, Default)]
pub struct RequestOpts<'a> {
    pub headers: HeaderMap,
    pub cookies: std::collections::BTreeMap<String, String>,
    pub queue: Option<&'a dyn ResponseSink>,
}

/// Composes `CacheManager`, `CookieManager`, and `RedirectManager` around
/// one [`Transport`], scoped by a session-unique key-prefix: every
/// persisted key is `<prefix>.<manager-tag>.<content-key>`.
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: T,
    cache: CacheManager,
    cookies: CookieManager,
    redirects: RedirectManager,
}

/// Builds a [`Session`], defaulting every store to disabled and the clock
/// to the real wall clock.
pub struct SessionBuilder<T: Transport> {
    transport: T,
    prefix: String,
    clock: Arc<dyn Clock>,
    cache_store: Option<Arc<dyn KeyValueStore>>,
    cookie_store: Option<Arc<dyn KeyValueStore>>,
    redirect_store: Option<Arc<dyn KeyValueStore>>,
}

impl<T: Transport> SessionBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            prefix: random_prefix(),
            clock: Arc::new(SystemClock),
            cache_store: None,
            cookie_store: None,
            redirect_store: None,
        }
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn cookie_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.cookie_store = Some(store);
        self
    }

    pub fn redirect_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.redirect_store = Some(store);
        self
    }

    pub fn build(self) -> Session<T> {
        let cache = match self.cache_store {
            Some(store) => CacheManager::new(store, self.clock.clone(), self.prefix.clone()),
            None => CacheManager::new(Arc::new(NullStore), self.clock.clone(), self.prefix.clone()),
        };
        Session {
            transport: self.transport,
            cache,
            cookies: CookieManager::new(self.cookie_store, self.clock.clone(), self.prefix.clone()),
            redirects: RedirectManager::new(self.redirect_store, self.prefix),
        }
    }
}

fn random_prefix() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..32).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

impl<T: Transport> Session<T> {
    pub fn builder(transport: T) -> SessionBuilder<T> {
        SessionBuilder::new(transport)
    }

    /// Runs the full redirect/cookie/cache pipeline for non-GET-bypass
    /// requests, falling straight through to the transport otherwise.
    pub async fn request(
        &self,
        method: &str,
        url: Url,
        opts: RequestOpts<'_>,
    ) -> Result<Response> {
        let method = method.to_ascii_uppercase();
        if method != "GET" {
            let mut request = Request::new(method, url);
            request.headers = opts.headers;
            request.cookies = opts.cookies;
            let response = self.transport.execute(&request).await?;
            if let Some(queue) = opts.queue {
                queue.push(&response);
            }
            return Ok(response);
        }

        let mut request = Request::new(method, url);
        request.headers = opts.headers;
        request.cookies = opts.cookies;
        let user_supplied_headers = request.headers.clone();

        self.redirects.rewrite(&mut request).await?;
        self.cookies.inject(&mut request).await?;

        if let Some(hit) = self.cache.lookup(&mut request).await? {
            debug!(url = %request.url, "serving from cache");
            if let Some(queue) = opts.queue {
                queue.push(&hit);
            }
            return Ok(hit);
        }

        let mut response = self.transport.execute(&request).await?;
        self.redirects.record(&mut request, &response).await?;

        if response.is_not_modified() {
            match self.cache.merge_304(&request, &response).await? {
                Some(merged) => response = merged,
                None => {
                    crate::cache::strip_injected_conditionals(&mut request, &user_supplied_headers);
                    response = self.transport.execute(&request).await?;
                    self.redirects.record(&mut request, &response).await?;
                }
            }
        }

        self.cookies.ingest(&request, &response).await?;
        if request.update_cache_allowed {
            self.cache.store(&request, &response).await?;
        }

        if let Some(queue) = opts.queue {
            queue.push(&response);
        }
        Ok(response)
    }

    pub async fn get(&self, url: Url, opts: RequestOpts<'_>) -> Result<Response> {
        self.request("GET", url, opts).await
    }
    pub async fn head(&self, url: Url, opts: RequestOpts<'_>) -> Result<Response> {
        self.request("HEAD", url, opts).await
    }
    pub async fn post(&self, url: Url, opts: RequestOpts<'_>) -> Result<Response> {
        self.request("POST", url, opts).await
    }
    pub async fn put(&self, url: Url, opts: RequestOpts<'_>) -> Result<Response> {
        self.request("PUT", url, opts).await
    }
    pub async fn patch(&self, url: Url, opts: RequestOpts<'_>) -> Result<Response> {
        self.request("PATCH", url, opts).await
    }
    pub async fn delete(&self, url: Url, opts: RequestOpts<'_>) -> Result<Response> {
        self.request("DELETE", url, opts).await
    }
    pub async fn options(&self, url: Url, opts: RequestOpts<'_>) -> Result<Response> {
        self.request("OPTIONS", url, opts).await
    }
}

/// A [`KeyValueStore`] that stores nothing, used when the cache store is
/// left unset — distinct from an explicit `Disabled` default, but
/// behaviorally the same: every `lookup` misses, every `store` is dropped.
#[derive(Debug, Clone, Copy, Default)]
struct NullStore;

#[async_trait]
impl KeyValueStore for NullStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: std::time::Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}
